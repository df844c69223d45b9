// src/services/dispatcher.rs
//! Sends one chat message at a time to the backend proxy.
//!
//! Each call goes `Preparing -> Attempting(n) -> {Success | RetryWait -> Attempting(n+1) | Failed}`.
//! A newer call supersedes an older one: the older call's token is cancelled
//! and its generation stops being current, so callers can drop its outcome.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{
    Client, Response,
    header::{CONTENT_TYPE, HeaderName, TRANSFER_ENCODING},
};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ChatError, ErrorType};
use crate::message::{ChatMessage, ChatResponse, ReplyStream};

use super::event_log::{EventLog, LogCategory};

pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(10);

/// Wait before attempt number `attempt` (1-based): `base * 2^(attempt - 2)`, capped at 10s.
pub fn calculate_backoff_delay(attempt: u32, base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let exponent = attempt.saturating_sub(2);
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(MAX_BACKOFF_DELAY)
        .min(MAX_BACKOFF_DELAY)
}

/// Raw outcome of a single failed attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("fetch failed: {0}")]
    Network(String),
    #[error("request timed out")]
    TimedOut,
    #[error("request aborted")]
    Cancelled,
    #[error("HTTP {status}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Failure::TimedOut
        } else if e.is_connect() || e.is_request() {
            Failure::Network(e.to_string())
        } else {
            Failure::Other(e.to_string())
        }
    }
}

pub fn categorize_error(failure: &Failure) -> ChatError {
    match failure {
        Failure::Network(_) => ChatError::new(ErrorType::NetworkError),
        Failure::TimedOut | Failure::Cancelled => ChatError::new(ErrorType::Timeout),
        Failure::Status { status, body } => {
            let kind = match *status {
                429 => Some(ErrorType::RateLimit),
                500.. => Some(ErrorType::ServiceUnavailable),
                400..=499 => Some(ErrorType::InvalidResponse),
                _ => None,
            };
            kind.map(ChatError::new)
                .unwrap_or_else(|| categorize_text(body))
                .with_status(*status)
        }
        Failure::Other(message) => categorize_text(message),
    }
}

fn categorize_text(text: &str) -> ChatError {
    if text.contains("RATE_LIMIT") {
        ChatError::new(ErrorType::RateLimit)
    } else {
        ChatError::new(ErrorType::Unknown)
    }
}

/// Resolution of one `send_message` call, tagged with the generation it ran under.
#[derive(Debug)]
pub struct Dispatch {
    pub generation: u64,
    pub result: Result<ChatResponse, ChatError>,
}

pub struct Dispatcher {
    client: Client,
    config: ClientConfig,
    url: String,
    log: Arc<EventLog>,
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("url", &self.url)
            .field("generation", &self.current_generation())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(client: Client, config: ClientConfig, log: Arc<EventLog>) -> Self {
        let url = config.api_url();
        Self {
            client,
            config,
            url,
            log,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `generation` belongs to the most recently started call.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Abort the in-flight call, if any. No-op otherwise.
    pub fn cancel_request(&self) {
        if let Some(token) = self.in_flight.lock().take() {
            debug!("cancelling in-flight chat request");
            token.cancel();
        }
    }

    pub async fn send_message(&self, message: &ChatMessage) -> Dispatch {
        let (generation, token) = self.begin();
        let result = self.deliver(message, &token).await;
        self.finish(generation);
        Dispatch { generation, result }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.replace(token.clone()) {
            debug!("superseding previous chat request");
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, token)
    }

    fn finish(&self, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if self.is_current(generation) {
            in_flight.take();
        }
    }

    async fn deliver(
        &self,
        message: &ChatMessage,
        token: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = calculate_backoff_delay(attempt, self.config.retry_base_delay);
                self.log.record(
                    LogCategory::Retry,
                    format!("attempt {attempt}/{max_attempts} in {}ms", delay.as_millis()),
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        self.log.record(LogCategory::RequestError, "request cancelled during backoff");
                        return Err(ChatError::cancelled());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.log.record(
                LogCategory::SendMessage,
                format!(
                    "attempt {attempt}/{max_attempts} to {} (session {}, {} chars)",
                    self.url,
                    message.session_id,
                    message.message.chars().count()
                ),
            );

            let failure = match self.attempt(message, token).await {
                Ok(response) => {
                    self.log
                        .record(LogCategory::Success, format!("delivered on attempt {attempt}"));
                    return Ok(response);
                }
                Err(Failure::Cancelled) => {
                    self.log.record(LogCategory::RequestError, "request cancelled");
                    return Err(ChatError::cancelled());
                }
                Err(failure) => failure,
            };

            let error = categorize_error(&failure);
            if !error.retryable {
                self.log.record(
                    LogCategory::NonRetryable,
                    format!("{} ({failure}): not retrying", error.kind),
                );
                return Err(error);
            }
            self.log.record(
                LogCategory::RetryableError,
                format!("{} ({failure}) on attempt {attempt}/{max_attempts}", error.kind),
            );
            last_error = Some(error);
        }

        let error = last_error.unwrap_or_else(|| ChatError::new(ErrorType::Unknown));
        self.log.record(
            LogCategory::FinalFailure,
            format!("giving up after {max_attempts} attempts: {}", error.kind),
        );
        Err(error)
    }

    async fn attempt(
        &self,
        message: &ChatMessage,
        token: &CancellationToken,
    ) -> Result<ChatResponse, Failure> {
        let deadline = Instant::now() + self.config.timeout;
        let request = self.client.post(&self.url).json(message).send();

        let response = match guarded(token, deadline, request).await {
            Ok(response) => response,
            Err(failure) => {
                if failure != Failure::Cancelled {
                    self.log.record(LogCategory::RequestError, failure.to_string());
                }
                return Err(failure);
            }
        };

        let status = response.status();
        self.log
            .record(LogCategory::Response, format!("HTTP {}", status.as_u16()));

        if !status.is_success() {
            let body = match guarded(token, deadline, response.text()).await {
                Err(Failure::Cancelled) => return Err(Failure::Cancelled),
                other => other.unwrap_or_default(),
            };
            return Err(Failure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = header_value(&response, CONTENT_TYPE).to_ascii_lowercase();
        let chunked = header_value(&response, TRANSFER_ENCODING).contains("chunked");

        if content_type.starts_with("text/event-stream") {
            return Ok(ChatResponse::Stream(ReplyStream::from_response(response, true)));
        }
        if content_type.starts_with("text/plain") && chunked {
            return Ok(ChatResponse::Stream(ReplyStream::from_response(response, false)));
        }

        let text = guarded(token, deadline, response.text()).await?;
        if content_type.contains("application/json") {
            if text.trim().is_empty() {
                return Ok(ChatResponse::Body(Value::Null));
            }
            serde_json::from_str::<Value>(&text)
                .map(ChatResponse::Body)
                .map_err(|e| Failure::Other(format!("invalid JSON body: {e}")))
        } else {
            Ok(ChatResponse::Body(json!({ "reply": text })))
        }
    }
}

fn header_value(response: &Response, name: HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Race `fut` against cancellation and the attempt deadline.
async fn guarded<T, F>(token: &CancellationToken, deadline: Instant, fut: F) -> Result<T, Failure>
where
    F: Future<Output = Result<T, reqwest::Error>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(Failure::Cancelled),
        outcome = tokio::time::timeout_at(deadline, fut) => match outcome {
            Ok(result) => result.map_err(Failure::from),
            Err(_) => Err(Failure::TimedOut),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_millis(1000);
        assert_eq!(calculate_backoff_delay(2, base), Duration::from_millis(1000));
        assert_eq!(calculate_backoff_delay(3, base), Duration::from_millis(2000));
        assert_eq!(calculate_backoff_delay(4, base), Duration::from_millis(4000));
        assert_eq!(calculate_backoff_delay(5, base), Duration::from_millis(8000));
        assert_eq!(calculate_backoff_delay(6, base), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        for base_ms in [0u64, 1, 250, 1000, 9_999, 60_000, u64::MAX / 2] {
            let base = Duration::from_millis(base_ms);
            let mut previous = Duration::ZERO;
            for attempt in 0..200 {
                let delay = calculate_backoff_delay(attempt, base);
                assert!(delay >= previous, "base {base_ms} attempt {attempt}");
                assert!(delay <= MAX_BACKOFF_DELAY);
                previous = delay;
            }
        }
        assert_eq!(calculate_backoff_delay(u32::MAX, Duration::MAX), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(
            categorize_error(&Failure::Network("connection refused".into())).kind,
            ErrorType::NetworkError
        );
        assert_eq!(categorize_error(&Failure::TimedOut).kind, ErrorType::Timeout);

        let rate = categorize_error(&Failure::Status { status: 429, body: String::new() });
        assert_eq!((rate.kind, rate.retryable, rate.status_code), (ErrorType::RateLimit, true, Some(429)));

        let unavailable = categorize_error(&Failure::Status { status: 502, body: String::new() });
        assert_eq!(unavailable.kind, ErrorType::ServiceUnavailable);
        assert!(unavailable.retryable);

        let invalid = categorize_error(&Failure::Status { status: 404, body: "RATE_LIMIT".into() });
        assert_eq!(invalid.kind, ErrorType::InvalidResponse);
        assert!(!invalid.retryable);

        let redirect = categorize_error(&Failure::Status { status: 304, body: "RATE_LIMIT hit".into() });
        assert_eq!(redirect.kind, ErrorType::RateLimit);

        assert_eq!(
            categorize_error(&Failure::Other("upstream said RATE_LIMIT".into())).kind,
            ErrorType::RateLimit
        );
        let unknown = categorize_error(&Failure::Other("boom".into()));
        assert_eq!(unknown.kind, ErrorType::Unknown);
        assert!(unknown.retryable);
    }

    #[test]
    fn cancel_without_in_flight_is_noop() {
        let dispatcher = Dispatcher::new(
            Client::new(),
            ClientConfig::default(),
            Arc::new(EventLog::default()),
        );
        dispatcher.cancel_request();
        dispatcher.cancel_request();
        assert!(!dispatcher.has_in_flight());
        assert_eq!(dispatcher.current_generation(), 0);
    }
}
