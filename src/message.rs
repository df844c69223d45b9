// src/message.rs
use futures_util::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

pub const SESSION_ID_MIN_LEN: usize = 8;
pub const SESSION_ID_MAX_LEN: usize = 100;
pub const MESSAGE_MAX_LEN: usize = 1000;

/// Body of `POST {apiEndpoint}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ChatMessage {
    /// Trim and validate. No message that fails here ever reaches the network.
    pub fn new(
        session_id: impl Into<String>,
        message: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Self, ValidationError> {
        let msg = Self {
            session_id: session_id.into(),
            message: message.trim().to_string(),
            metadata,
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let sid_len = self.session_id.trim().chars().count();
        if !(SESSION_ID_MIN_LEN..=SESSION_ID_MAX_LEN).contains(&sid_len) {
            return Err(ValidationError::InvalidSessionId {
                min: SESSION_ID_MIN_LEN,
                max: SESSION_ID_MAX_LEN,
            });
        }

        let trimmed = self.message.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        let len = trimmed.chars().count();
        if len > MESSAGE_MAX_LEN {
            return Err(ValidationError::MessageTooLong {
                len,
                max: MESSAGE_MAX_LEN,
            });
        }
        Ok(())
    }
}

/// Incremental body of a streamed reply.
pub struct ReplyStream {
    inner: BoxStream<'static, Result<Vec<u8>, String>>,
    server_sent_events: bool,
}

impl ReplyStream {
    pub fn new<S>(chunks: S, server_sent_events: bool) -> Self
    where
        S: futures_util::Stream<Item = Result<Vec<u8>, String>> + Send + 'static,
    {
        Self {
            inner: chunks.boxed(),
            server_sent_events,
        }
    }

    pub fn from_response(response: reqwest::Response, server_sent_events: bool) -> Self {
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|e| e.to_string()));
        Self::new(chunks, server_sent_events)
    }

    pub fn is_server_sent_events(&self) -> bool {
        self.server_sent_events
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, String>> {
        self.inner.next().await
    }
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream")
            .field("server_sent_events", &self.server_sent_events)
            .finish()
    }
}

/// What a successful dispatch hands back.
///
/// `Body` is the parsed JSON (or `{"reply": text}` for non-JSON bodies); the
/// dispatcher never looks inside it.
#[derive(Debug)]
pub enum ChatResponse {
    Body(Value),
    Stream(ReplyStream),
}

impl ChatResponse {
    pub fn body(&self) -> Option<&Value> {
        match self {
            ChatResponse::Body(value) => Some(value),
            ChatResponse::Stream(_) => None,
        }
    }
}
