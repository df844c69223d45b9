// src/routes/mod.rs
pub mod chat;

use crate::state::SharedState;
use axum::{
    Router,
    routing::get,
};
use chat::{chat_handler, health_handler};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// `/api/chat` doubles as the health endpoint: GET probes, POST sends.
pub fn create_router(static_dir: &str) -> Router<SharedState> {
    Router::new()
        .route("/api/chat", get(health_handler).post(chat_handler))
        .route("/health", get(|| async { "OK" }))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}
