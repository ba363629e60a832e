use crate::{
    api::{attendance, directory, role},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

// Helper to build per-scope limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish();

    let cfg = cfg.unwrap_or_else(|| {
        warn!(requests_per_min, "Invalid rate limit, using governor defaults");
        GovernorConfig::default()
    });
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let admin_limiter = Arc::new(build_limiter(config.rate_admin_per_min));
    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));

    // Device routes: reader firmware, no bearer token
    cfg.service(
        web::scope("/device")
            .wrap(scan_limiter)
            .service(web::resource("/scan").route(web::post().to(attendance::record_scan))),
    );

    // Administrative routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(admin_limiter) // rate limiting
            .service(
                web::scope("/role")
                    // /role/assignment/{permission_ids}?role_id=
                    .service(
                        web::resource("/assignment/{permission_ids}")
                            .route(web::patch().to(role::assign_permissions)),
                    )
                    // /role/unassignment/{permission_ids}?role_id=
                    .service(
                        web::resource("/unassignment/{permission_ids}")
                            .route(web::delete().to(role::unassign_permissions)),
                    )
                    // /role
                    .service(
                        web::resource("")
                            .route(web::get().to(role::list_roles))
                            .route(web::post().to(role::create_role)),
                    )
                    // /role/{id}, DELETE takes a comma separated list
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(role::get_role))
                            .route(web::patch().to(role::update_role))
                            .route(web::delete().to(role::delete_roles)),
                    ),
            )
            .service(web::resource("/permission").route(web::get().to(role::list_permissions)))
            .service(web::resource("/user").route(web::post().to(directory::create_user)))
            .service(
                web::resource("/user/{id}/role").route(web::patch().to(directory::assign_user_role)),
            )
            .service(web::resource("/device").route(web::post().to(directory::create_device)))
            .service(
                web::resource("/attendance").route(web::get().to(attendance::filter_attendance)),
            ),
    );
}
