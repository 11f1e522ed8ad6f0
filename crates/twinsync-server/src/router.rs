use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all twinsync endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/events", post(handler::event_handler))
        .route("/v1/reconciliation/:entity", post(handler::reconcile_handler))
        .route(
            "/v1/reconciliation/:entity/:source_id",
            get(handler::check_one_handler),
        )
        .route("/v1/repair/:entity/:source_id", post(handler::repair_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if config.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
