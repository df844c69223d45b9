use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header::{CONTENT_TYPE, TRANSFER_ENCODING},
    response::Response,
};
use serde_json::{Value, json};
use tracing::info;

use crate::{error::AppError, message::ChatMessage, state::SharedState};

pub async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatMessage>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    payload.validate()?;
    info!(
        session_id = %payload.session_id,
        chars = payload.message.chars().count(),
        "forwarding chat message"
    );

    let upstream = state.webhook.forward(&payload).await?;
    relay(upstream).await
}

// Streaming bodies are passed through as they arrive; everything else is buffered.
async fn relay(upstream: reqwest::Response) -> Result<Response, AppError> {
    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let streaming = content_type
        .as_ref()
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            let chunked = upstream
                .headers()
                .get(TRANSFER_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|te| te.contains("chunked"));
            ct.starts_with("text/event-stream") || (ct.starts_with("text/plain") && chunked)
        });

    let body = if streaming {
        Body::from_stream(upstream.bytes_stream())
    } else {
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| AppError::UpstreamUnreachable(e.to_string()))?;
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    Ok(response)
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "webhookConfigured": state.webhook.is_configured(),
    }))
}
