// src/services/stream.rs
//! Turns raw reply chunks into text fragments to append to a bot message.

use serde_json::Value;

use super::extractor::extract_text;

pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct StreamDecoder {
    server_sent_events: bool,
    pending: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new(server_sent_events: bool) -> Self {
        Self {
            server_sent_events,
            ..Default::default()
        }
    }

    /// True once a `[DONE]` event has been seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);
        if self.server_sent_events {
            self.drain_lines()
        } else {
            self.drain_text().into_iter().collect()
        }
    }

    /// Flush whatever is buffered at end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        if self.done || self.pending.is_empty() {
            return Vec::new();
        }
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        if self.server_sent_events {
            self.handle_line(&rest).into_iter().collect()
        } else {
            vec![rest]
        }
    }

    // Emit the longest valid UTF-8 prefix and keep a split code point for the next chunk.
    fn drain_text(&mut self) -> Option<String> {
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Some(text);
            }
        };
        if valid == 0 {
            return None;
        }
        let tail = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        Some(text)
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).into_owned();
            out.extend(self.handle_line(&line));
            if self.done {
                self.pending.clear();
                break;
            }
        }
        out
    }

    fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim() == DONE_MARKER {
            self.done = true;
            return None;
        }
        if data.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => extract_text(&value),
            Ok(Value::String(s)) => Some(s),
            _ => Some(data.to_string()),
        }
    }
}
