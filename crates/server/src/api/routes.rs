use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{metrics_middleware, shutdown_gate};
use super::{handlers, image, tracker};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tracker
        .route("/search", get(tracker::search))
        .route("/download", get(tracker::download))
        // Image cache
        .route("/image", get(image::get_image))
        .layer(middleware::from_fn_with_state(state.clone(), shutdown_gate))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
