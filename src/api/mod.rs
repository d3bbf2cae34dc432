// HTTP and WebSocket APIs

pub mod dashboard;
pub mod websocket;

pub use dashboard::{create_dashboard_router, AppError};
pub use websocket::{create_ws_router, ws_handler};

use crate::scheduler::ChargingScheduler;
use crate::service::ChargingService;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for all handlers
pub struct AppState {
    pub service: Arc<ChargingService>,
    pub scheduler: Arc<ChargingScheduler>,
}

/// Full application router: dashboard API, WebSocket, permissive CORS.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .merge(create_dashboard_router(Arc::clone(&state)))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive())
}
