//! API routes.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::generate::generate;
use crate::handlers::health;
use crate::handlers::history::{delete_history_item, get_history_item, list_history};
use crate::handlers::status::get_status;
use crate::middleware::cors_layer;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let video_routes = Router::new()
        .route("/generate", post(generate))
        .route("/status/:task_id", get(get_status))
        .route("/history", get(list_history))
        .route("/history/:task_id", get(get_history_item))
        .route("/history/:task_id", delete(delete_history_item));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    Router::new()
        .nest("/api/v1/video", video_routes)
        .merge(health_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
