use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use monitor_core::config::MonitorConfig;
use monitor_engine::MonitorEngine;

/// Central shared state handed to every Axum handler.
pub struct AppState {
    pub config: MonitorConfig,
    pub engine: Arc<MonitorEngine>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/webhooks/slack", post(crate::http::webhooks::slack_webhook_handler))
        .route("/webhooks/{provider}", post(crate::http::webhooks::generic_webhook_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
