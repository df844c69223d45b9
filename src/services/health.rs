// src/services/health.rs
use std::fmt::Debug;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

pub const HEALTH_CACHE_TTL: Duration = Duration::from_secs(30);
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedHealth {
    result: HealthCheckResult,
    timestamp: Instant,
}

/// Probes the backend status endpoint and caches the outcome for a short TTL.
///
/// Failed probes are cached too, so a flapping backend is probed at most once
/// per TTL window.
pub struct HealthProber {
    client: Client,
    url: String,
    ttl: Duration,
    timeout: Duration,
    cache: Mutex<Option<CachedHealth>>,
}

impl Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HealthProber {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            ttl: HEALTH_CACHE_TTL,
            timeout: HEALTH_PROBE_TIMEOUT,
            cache: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The cached result, if it is still fresh.
    pub fn cached(&self) -> Option<HealthCheckResult> {
        self.cache
            .lock()
            .as_ref()
            .filter(|entry| entry.timestamp.elapsed() < self.ttl)
            .map(|entry| entry.result.clone())
    }

    pub async fn check_health(&self) -> HealthCheckResult {
        if let Some(result) = self.cached() {
            debug!(healthy = result.healthy, "health check served from cache");
            return result;
        }

        let result = self.probe().await;
        *self.cache.lock() = Some(CachedHealth {
            result: result.clone(),
            timestamp: Instant::now(),
        });
        result
    }

    /// Drop the cache and probe again (the manual re-check action).
    pub async fn force_check(&self) -> HealthCheckResult {
        self.cache.lock().take();
        self.check_health().await
    }

    async fn probe(&self) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.client.get(&self.url).send()).await;
        let latency_ms = Some(started.elapsed().as_millis() as u64);

        match outcome {
            Ok(Ok(response)) if response.status().is_success() => HealthCheckResult {
                healthy: true,
                error: None,
                latency_ms,
            },
            Ok(Ok(response)) => {
                let status = response.status();
                let error = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                );
                warn!(url = %self.url, "health probe failed: {error}");
                HealthCheckResult {
                    healthy: false,
                    error: Some(error),
                    latency_ms,
                }
            }
            Ok(Err(e)) => {
                warn!(url = %self.url, "health probe failed: {e}");
                HealthCheckResult {
                    healthy: false,
                    error: Some(e.to_string()),
                    latency_ms,
                }
            }
            Err(_) => {
                warn!(url = %self.url, "health probe timed out after {:?}", self.timeout);
                HealthCheckResult {
                    healthy: false,
                    error: Some(format!(
                        "Health check timed out after {}ms",
                        self.timeout.as_millis()
                    )),
                    latency_ms,
                }
            }
        }
    }
}
