// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                // Session lifecycle
                .route("/session", web::get().to(handlers::session_status))
                .route("/session/open", web::post().to(handlers::open_session))
                .route("/session/close", web::post().to(handlers::close_session))
                .route("/session/refresh", web::post().to(handlers::refresh_session))
                .route("/session/reset", web::post().to(handlers::reset_filters))
                // View state
                .route("/session/facet", web::post().to(handlers::change_facet))
                .route("/session/search", web::post().to(handlers::change_search))
                .route("/session/page", web::post().to(handlers::change_page))
                .route(
                    "/session/rows/{product_code}",
                    web::post().to(handlers::select_row),
                )
                // Read-only helpers
                .route("/facets/{field}", web::get().to(handlers::facet_values))
                .route("/weight", web::get().to(handlers::estimate)),
        );
}
