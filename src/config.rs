// src/config.rs
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_API_ENDPOINT: &str = "/api/chat";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Somewhere string-valued settings can be looked up.
///
/// The process environment is the server-side source; a map injected at
/// startup plays the same role for embedded clients.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `std::env`. Call `dotenvy::dotenv()` first if a `.env` file should count.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

fn non_empty(source: &impl ConfigSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(source: &impl ConfigSource, key: &str) -> Option<T> {
    non_empty(source, key).and_then(|v| v.parse::<T>().ok())
}

// Proxy settings: zero is as meaningless as garbage and falls back.
fn positive<T>(source: &impl ConfigSource, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    non_empty(source, key)
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
}

/// Tunables for the client side of the pipeline (dispatcher + health prober).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_endpoint: String,
    pub timeout: Duration,
    /// Total number of attempts per message, including the first one.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub health_check_endpoint: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            health_check_endpoint: DEFAULT_API_ENDPOINT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Resolve every field independently. Never fails.
    ///
    /// Absent or unparsable values fall back to the defaults. A parsed zero
    /// timeout or attempt count is clamped up to 1 (ms / attempt).
    pub fn resolve(source: &impl ConfigSource) -> Self {
        let api_endpoint =
            non_empty(source, "CHAT_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        let health_check_endpoint =
            non_empty(source, "CHAT_HEALTH_ENDPOINT").unwrap_or_else(|| api_endpoint.clone());

        Self {
            base_url: non_empty(source, "CHAT_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_endpoint,
            timeout: Duration::from_millis(
                parsed::<u64>(source, "CHAT_TIMEOUT_MS").map_or(DEFAULT_TIMEOUT_MS, |ms| ms.max(1)),
            ),
            max_retries: parsed::<u32>(source, "CHAT_MAX_RETRIES")
                .map_or(DEFAULT_MAX_RETRIES, |n| n.max(1)),
            retry_base_delay: Duration::from_millis(
                parsed(source, "CHAT_RETRY_BASE_DELAY_MS").unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
            health_check_endpoint,
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(&EnvSource)
    }

    /// Absolute URL for an endpoint; relative paths are joined onto `base_url`.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    pub fn api_url(&self) -> String {
        self.url_for(&self.api_endpoint)
    }

    pub fn health_url(&self) -> String {
        self.url_for(&self.health_check_endpoint)
    }
}

/// Settings for the proxy server binary.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub webhook_url: Option<String>,
    pub port: u16,
    pub static_dir: String,
    pub webhook_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            port: 3000,
            static_dir: "public".to_string(),
            webhook_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ProxyConfig {
    pub fn resolve(source: &impl ConfigSource) -> Self {
        let defaults = Self::default();
        Self {
            webhook_url: non_empty(source, "N8N_WEBHOOK_URL"),
            port: positive(source, "PORT").unwrap_or(defaults.port),
            static_dir: non_empty(source, "STATIC_DIR").unwrap_or(defaults.static_dir),
            webhook_timeout: positive(source, "WEBHOOK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.webhook_timeout),
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(&EnvSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_source_yields_defaults() {
        let config = ClientConfig::resolve(&source(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.health_check_endpoint, "/api/chat");
    }

    #[test]
    fn fields_resolve_independently() {
        let config = ClientConfig::resolve(&source(&[
            ("CHAT_API_ENDPOINT", "/webhook/chat"),
            ("CHAT_TIMEOUT_MS", "not-a-number"),
            ("CHAT_MAX_RETRIES", "5"),
            ("CHAT_RETRY_BASE_DELAY_MS", "250"),
        ]));
        assert_eq!(config.api_endpoint, "/webhook/chat");
        assert_eq!(config.health_check_endpoint, "/webhook/chat");
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let config = ClientConfig::resolve(&source(&[("CHAT_MAX_RETRIES", "0"), ("CHAT_TIMEOUT_MS", "0")]));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.timeout, Duration::from_millis(1));

        let config = ClientConfig::resolve(&source(&[("CHAT_MAX_RETRIES", "-2")]));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn url_joining() {
        let config = ClientConfig::resolve(&source(&[("CHAT_BASE_URL", "http://example.test/")]));
        assert_eq!(config.api_url(), "http://example.test/api/chat");
        assert_eq!(config.url_for("status"), "http://example.test/status");
        assert_eq!(config.url_for("https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn proxy_config_reads_webhook() {
        let config = ProxyConfig::resolve(&source(&[
            ("N8N_WEBHOOK_URL", "https://n8n.example/webhook/abc"),
            ("PORT", "8080"),
        ]));
        assert_eq!(config.webhook_url.as_deref(), Some("https://n8n.example/webhook/abc"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.static_dir, "public");
    }
}
