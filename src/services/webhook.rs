// src/services/webhook.rs
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{info, warn};

use crate::error::AppError;
use crate::message::ChatMessage;

/// Proxy-side forwarder: posts the chat body, unchanged, to the workflow webhook.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: Option<String>,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(client: Client, url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Returns the upstream response only when it is a success.
    pub async fn forward(&self, message: &ChatMessage) -> Result<Response, AppError> {
        let url = self.url.as_deref().ok_or(AppError::WebhookNotConfigured)?;

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                warn!("webhook request failed: {e}");
                if e.is_timeout() {
                    AppError::UpstreamTimeout
                } else {
                    AppError::UpstreamUnreachable(e.to_string())
                }
            })?;

        let status = response.status();
        info!(status = status.as_u16(), "webhook responded");
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(status.as_u16()));
        }
        Ok(response)
    }
}
