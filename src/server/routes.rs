//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        // Source management (admin)
        .route("/api/sources", post(handlers::upsert_source))
        .route(
            "/api/tenants/:tenant_id/sources",
            get(handlers::list_sources),
        )
        .route("/api/sources/:source_id/status", get(handlers::source_status))
        .route(
            "/api/sources/:source_id/credentials",
            post(handlers::set_credentials),
        )
        .route(
            "/api/sources/:source_id/disconnect",
            post(handlers::disconnect_source),
        )
        // Interactive sync (admin)
        .route("/api/sources/:source_id/test", post(handlers::test_source))
        .route("/api/sources/:source_id/import", post(handlers::import_source))
        // OAuth round trip (admin)
        .route("/oauth/:provider/start", get(handlers::oauth_start))
        .route("/oauth/callback", get(handlers::oauth_callback))
        // Automation (cron-authenticated)
        .route("/api/cron/status", get(handlers::cron_status))
        .route("/api/cron/run", post(handlers::cron_run))
        .route(
            "/api/tenants/:tenant_id/cron/rotate",
            post(handlers::rotate_cron_secret),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
