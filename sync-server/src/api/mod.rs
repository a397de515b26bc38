//! HTTP routes

pub mod health;
pub mod orders;
pub mod sync;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/sync/batch", post(sync::handle_batch))
        .route("/api/sync/logs/{id}", get(orders::get_sync_log))
        .route("/api/orders/{id}", get(orders::get_order))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
