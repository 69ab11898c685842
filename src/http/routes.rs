use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Discovery
        .route("/live-streams", get(handlers::list_live_streams))
        .route("/recordings", get(handlers::list_recordings))
        .route("/recordings/:filename", get(handlers::get_recording))
        // Viewers are served from other origins
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
