// src/services/event_log.rs
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    SendMessage,
    Retry,
    Response,
    NonRetryable,
    RetryableError,
    RequestError,
    Success,
    FinalFailure,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::SendMessage => "SEND_MESSAGE",
            LogCategory::Retry => "RETRY",
            LogCategory::Response => "RESPONSE",
            LogCategory::NonRetryable => "NON_RETRYABLE",
            LogCategory::RetryableError => "RETRYABLE_ERROR",
            LogCategory::RequestError => "REQUEST_ERROR",
            LogCategory::Success => "SUCCESS",
            LogCategory::FinalFailure => "FINAL_FAILURE",
        }
    }

    fn abbreviation(&self) -> &'static str {
        match self {
            LogCategory::SendMessage => "SM",
            LogCategory::Retry => "RT",
            LogCategory::Response => "RS",
            LogCategory::NonRetryable => "NR",
            LogCategory::RetryableError => "RE",
            LogCategory::RequestError => "QE",
            LogCategory::Success => "OK",
            LogCategory::FinalFailure => "FF",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub seq: u64,
    pub category: LogCategory,
    pub message: String,
    pub at: SystemTime,
}

/// Bounded ring of recent pipeline events.
///
/// Owned per pipeline instance and shared by `Arc`; every record is also
/// forwarded to `tracing`.
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    seq: AtomicU64,
}

impl Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            seq: AtomicU64::new(0),
        }
    }

    pub fn record(&self, category: LogCategory, message: impl Into<String>) {
        let message = message.into();
        match category {
            LogCategory::FinalFailure | LogCategory::NonRetryable => {
                warn!(category = category.as_str(), "{message}")
            }
            LogCategory::RetryableError | LogCategory::RequestError | LogCategory::Retry => {
                info!(category = category.as_str(), "{message}")
            }
            _ => debug!(category = category.as_str(), "{message}"),
        }

        let mut entries = self.entries.lock();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            seq,
            category,
            message,
            at: SystemTime::now(),
        });
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Short opaque code a user can quote in a report, e.g. `ERR-000C-RERTFF`.
    pub fn error_code(&self) -> String {
        let recent = self.recent(3);
        let seq = recent.last().map(|e| e.seq).unwrap_or(0);
        let tags: String = recent.iter().map(|e| e.category.abbreviation()).collect();
        format!("ERR-{:04X}-{}", seq & 0xFFFF, if tags.is_empty() { "NA" } else { &tags })
    }
}
