use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StorageBackend {
    #[strum(serialize = "mysql")]
    MySql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub jwt_secret: String,
    pub storage_backend: StorageBackend,
    /// Required when `storage_backend` is MySQL
    pub database_url: Option<String>,
    pub api_prefix: String,

    // Rate limiting
    pub rate_admin_per_min: u32,
    pub rate_scan_per_min: u32,

    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let storage_backend = match get("STORAGE_BACKEND") {
            Some(raw) => StorageBackend::from_str(raw.trim())
                .map_err(|_| anyhow!("STORAGE_BACKEND must be 'mysql' or 'memory', got '{raw}'"))?,
            None => StorageBackend::MySql,
        };

        let database_url = get("DATABASE_URL");
        if storage_backend == StorageBackend::MySql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_BACKEND is mysql");
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            jwt_secret: required("JWT_SECRET")?,
            storage_backend,
            database_url,
            api_prefix: get("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            rate_admin_per_min: parse_or(get("RATE_ADMIN_PER_MIN"), "RATE_ADMIN_PER_MIN", 1000)?,
            rate_scan_per_min: parse_or(get("RATE_SCAN_PER_MIN"), "RATE_SCAN_PER_MIN", 600)?,
            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got '{v}'")),
        None => Ok(default),
    }
}
