use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Settings;
use crate::connections::ConnectionManager;
use crate::monitoring::ServiceMonitor;
use crate::tts::Backend;

pub struct AppState {
    pub settings: Settings,
    pub backend: Arc<dyn Backend>,
    pub connections: Arc<ConnectionManager>,
    pub monitor: Arc<ServiceMonitor>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::ws_handler))
        .route("/ws", get(handlers::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
