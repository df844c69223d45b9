// src/state.rs
use std::sync::Arc;

use reqwest::Client;

use crate::config::ProxyConfig;
use crate::services::webhook::WebhookClient;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ProxyConfig,
    pub webhook: WebhookClient,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        let webhook = WebhookClient::new(
            Client::new(),
            config.webhook_url.clone(),
            config.webhook_timeout,
        );
        Self { config, webhook }
    }
}
