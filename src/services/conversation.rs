// src/services/conversation.rs
//! Conversation state driven by dispatcher and health prober outcomes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ChatError, ErrorType, ValidationError};
use crate::message::{ChatMessage, ChatResponse, ReplyStream};

use super::dispatcher::{Dispatch, Dispatcher};
use super::extractor::{extract_text, fallback_text};
use super::health::{HealthCheckResult, HealthProber};
use super::stream::StreamDecoder;

pub const FALLBACK_REPLY: &str =
    "Sorry, I could not generate a response at the moment. Please try again or rephrase your question.";
pub const STREAM_FAILURE_REPLY: &str =
    "Sorry, the response was interrupted while streaming. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Checking,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub text: String,
    pub is_error: bool,
    pub error_code: Option<String>,
}

impl ConversationMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            is_error: false,
            error_code: None,
        }
    }

    fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            is_error: false,
            error_code: None,
        }
    }

    fn bot_error(text: impl Into<String>, code: String) -> Self {
        Self {
            is_error: true,
            error_code: Some(code),
            ..Self::bot(text)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryState {
    pub can_retry: bool,
    pub last_message: Option<String>,
    pub retrying: bool,
}

/// Display text for a successful, non-streamed reply body.
///
/// Never empty: anything that yields no text becomes [`FALLBACK_REPLY`].
pub fn render_reply(body: &Value) -> String {
    if is_null_output(body) {
        return FALLBACK_REPLY.to_string();
    }
    let text = match extract_text(body) {
        Some(text) if looks_like_json(&text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner) => extract_text(&inner).or_else(|| fallback_text(&inner)),
            Err(_) => Some(text),
        },
        Some(text) => Some(text),
        None => fallback_text(body),
    };
    text.unwrap_or_else(|| FALLBACK_REPLY.to_string())
}

/// User-facing sentence for a failure and whether it means the service is down.
pub fn failure_reply(error: &ChatError) -> (&'static str, bool) {
    match error.kind {
        ErrorType::NetworkError => (
            "I'm having trouble connecting to the server. Please check your internet connection and try again.",
            true,
        ),
        ErrorType::Timeout => (
            "The server is taking too long to respond, it may be under heavy load. Please try again in a moment.",
            false,
        ),
        ErrorType::RateLimit => (
            "You're sending messages too quickly. Please wait a moment before trying again.",
            false,
        ),
        ErrorType::ServiceUnavailable => (
            "The chat service is temporarily unavailable. Please try again shortly.",
            true,
        ),
        ErrorType::InvalidResponse => (
            "I couldn't process that message. Please try rephrasing it.",
            false,
        ),
        ErrorType::Unknown => (
            "Something went wrong while sending your message. Please try again.",
            false,
        ),
    }
}

fn is_null_output(body: &Value) -> bool {
    match body {
        Value::Object(map) => map.len() == 1 && map.get("output").is_some_and(Value::is_null),
        Value::Array(items) => items.len() == 1 && is_null_output(&items[0]),
        _ => false,
    }
}

fn looks_like_json(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

pub struct ChatController {
    session_id: String,
    metadata: Option<Map<String, Value>>,
    dispatcher: Arc<Dispatcher>,
    prober: Arc<HealthProber>,
    messages: Vec<ConversationMessage>,
    typing: bool,
    status: ServiceStatus,
    last_health: Option<HealthCheckResult>,
    retry: RetryState,
    last_payload: Option<ChatMessage>,
}

impl ChatController {
    pub fn new(
        session_id: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        prober: Arc<HealthProber>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            metadata: None,
            dispatcher,
            prober,
            messages: Vec::new(),
            typing: false,
            status: ServiceStatus::Checking,
            last_health: None,
            retry: RetryState::default(),
            last_payload: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn last_health(&self) -> Option<&HealthCheckResult> {
        self.last_health.as_ref()
    }

    pub fn retry_state(&self) -> &RetryState {
        &self.retry
    }

    pub async fn mount(&mut self) -> ServiceStatus {
        self.status = ServiceStatus::Checking;
        let result = self.prober.check_health().await;
        self.apply_health(result)
    }

    /// Manual re-check from the offline banner; bypasses the cache.
    pub async fn recheck(&mut self) -> ServiceStatus {
        self.status = ServiceStatus::Checking;
        let result = self.prober.force_check().await;
        self.apply_health(result)
    }

    fn apply_health(&mut self, result: HealthCheckResult) -> ServiceStatus {
        self.status = if result.healthy {
            ServiceStatus::Online
        } else {
            ServiceStatus::Offline
        };
        self.last_health = Some(result);
        self.status
    }

    /// Guard, record the user message, then dispatch it.
    pub async fn send(&mut self, text: &str) -> Result<(), ValidationError> {
        let message = ChatMessage::new(self.session_id.clone(), text, self.metadata.clone())?;
        self.messages.push(ConversationMessage::user(message.message.clone()));
        self.retry = RetryState {
            can_retry: false,
            last_message: Some(message.message.clone()),
            retrying: false,
        };
        self.last_payload = Some(message.clone());
        self.dispatch(message).await;
        Ok(())
    }

    /// Resend the exact payload of the last failed message. Returns false if
    /// there is nothing retryable.
    pub async fn retry_last(&mut self) -> bool {
        if !self.retry.can_retry {
            return false;
        }
        let Some(message) = self.last_payload.clone() else {
            return false;
        };
        self.retry.retrying = true;
        self.dispatch(message).await;
        self.retry.retrying = false;
        true
    }

    async fn dispatch(&mut self, message: ChatMessage) {
        self.typing = true;
        let Dispatch { generation, result } = self.dispatcher.send_message(&message).await;
        if !self.dispatcher.is_current(generation) {
            debug!(generation, "dropping superseded chat result");
            return;
        }

        match result {
            Ok(ChatResponse::Body(body)) => {
                self.messages.push(ConversationMessage::bot(render_reply(&body)));
                self.succeeded();
            }
            Ok(ChatResponse::Stream(stream)) => self.consume_stream(stream).await,
            Err(error) if error.is_cancelled() => {
                debug!("chat request cancelled");
            }
            Err(error) => self.failed(error),
        }
        self.typing = false;
    }

    fn succeeded(&mut self) {
        self.status = ServiceStatus::Online;
        self.retry = RetryState::default();
        self.last_payload = None;
    }

    fn failed(&mut self, error: ChatError) {
        let (text, offline) = failure_reply(&error);
        let code = self.dispatcher.event_log().error_code();
        warn!(kind = %error.kind, code = %code, "chat message failed: {}", error.message);
        self.messages.push(ConversationMessage::bot_error(text, code));
        if offline {
            self.status = ServiceStatus::Offline;
        }
        self.retry.can_retry = error.retryable;
        self.retry.retrying = false;
    }

    async fn consume_stream(&mut self, mut stream: ReplyStream) {
        let mut decoder = StreamDecoder::new(stream.is_server_sent_events());
        self.messages.push(ConversationMessage::bot(String::new()));
        let index = self.messages.len() - 1;

        while let Some(chunk) = stream.next_chunk().await {
            match chunk {
                Ok(bytes) => {
                    for piece in decoder.feed(&bytes) {
                        self.messages[index].text.push_str(&piece);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("reply stream failed: {e}");
                    let code = self.dispatcher.event_log().error_code();
                    self.messages.push(ConversationMessage::bot_error(STREAM_FAILURE_REPLY, code));
                    self.retry.can_retry = true;
                    return;
                }
            }
        }
        for piece in decoder.finish() {
            self.messages[index].text.push_str(&piece);
        }
        if self.messages[index].text.trim().is_empty() {
            self.messages[index].text = FALLBACK_REPLY.to_string();
        }
        self.succeeded();
    }
}
