// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy surfaced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    NetworkError,
    Timeout,
    RateLimit,
    InvalidResponse,
    ServiceUnavailable,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::RateLimit => "RATE_LIMIT",
            ErrorType::InvalidResponse => "INVALID_RESPONSE",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorType::Unknown => "UNKNOWN",
        }
    }

    /// Only client-side mistakes are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorType::InvalidResponse)
    }

    /// The fixed sentence every error of this kind carries.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorType::NetworkError => {
                "Unable to connect to the chat service. Please check your network connection."
            }
            ErrorType::Timeout => "Request timeout: the chat service took too long to respond.",
            ErrorType::RateLimit => {
                "Rate limit exceeded. Please wait a moment before sending another message."
            }
            ErrorType::InvalidResponse => {
                "The message could not be processed. Please try rephrasing your message."
            }
            ErrorType::ServiceUnavailable => {
                "The chat service is temporarily unavailable. Please try again later."
            }
            ErrorType::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct ChatError {
    #[serde(rename = "type")]
    pub kind: ErrorType,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ChatError {
    pub fn new(kind: ErrorType) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            retryable: kind.is_retryable(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// The call was superseded or explicitly cancelled. Never retried.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorType::Timeout,
            message: "Request was cancelled".to_string(),
            retryable: false,
            status_code: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self == Self::cancelled()
    }
}

/// Local guard failures for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Message is too long ({len} characters, maximum {max})")]
    MessageTooLong { len: usize, max: usize },
    #[error("Session id must be between {min} and {max} characters")]
    InvalidSessionId { min: usize, max: usize },
}

/// Errors returned by the proxy routes as `{ "error", "code" }` JSON.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Chat webhook is not configured")]
    WebhookNotConfigured,
    #[error("RATE_LIMIT: upstream is throttling requests")]
    RateLimited,
    #[error("Upstream webhook returned HTTP {0}")]
    Upstream(u16),
    #[error("Upstream webhook timed out")]
    UpstreamTimeout,
    #[error("Upstream webhook unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::WebhookNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) | AppError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => "INVALID_REQUEST",
            AppError::WebhookNotConfigured => "WEBHOOK_NOT_CONFIGURED",
            AppError::RateLimited => "RATE_LIMIT",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            AppError::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_response_is_final() {
        for kind in [
            ErrorType::NetworkError,
            ErrorType::Timeout,
            ErrorType::RateLimit,
            ErrorType::ServiceUnavailable,
            ErrorType::Unknown,
        ] {
            assert!(ChatError::new(kind).retryable, "{kind} should be retryable");
        }
        assert!(!ChatError::new(ErrorType::InvalidResponse).retryable);
    }

    #[test]
    fn chat_error_serializes_with_wire_names() {
        let err = ChatError::new(ErrorType::ServiceUnavailable).with_status(503);
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["type"], "SERVICE_UNAVAILABLE");
        assert_eq!(value["statusCode"], 503);
        assert_eq!(value["retryable"], true);
    }
}
