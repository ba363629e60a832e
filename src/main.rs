use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod state;
mod store;
mod utils;

use config::{Config, StorageBackend};
use db::init_db;

use crate::docs::ApiDoc;
use crate::model::permission::PermissionCatalog;
use crate::service::shift_calendar::ShiftCalendar;
use crate::state::AppState;
use crate::store::Store;
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "RFID attendance service"
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.storage_backend {
        StorageBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when STORAGE_BACKEND is mysql")?;
            let pool = init_db(url).await?;
            Ok(Arc::new(MySqlStore::new(pool)))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let store = open_store(&config).await?;
    info!(backend = store.backend_name(), "Store ready");
    store
        .ensure_permission_catalog(PermissionCatalog::global().entries())
        .await
        .context("Failed to install permission catalog")?;

    let calendar = ShiftCalendar::standard().context("Invalid shift calendar")?;
    let state = Data::new(AppState::new(store, calendar));
    let admin = state
        .roles
        .ensure_admin_role()
        .await
        .context("Failed to bootstrap ADMIN role")?;
    info!(role_id = admin.id, "ADMIN role ready");

    // Scans are rejected by the filter until it knows the registered codes.
    let codes = state.warm_up().await.context("Failed to warm up RFID filter")?;
    info!(codes, "RFID filter ready");

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(state.clone())
            .app_data(Data::new(config.clone()))
            .service(index)
            // Admin scope behind JWT + limiter, device scope behind its own limiter
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
