// src/services/extractor.rs
//! Finds the human-readable reply inside an arbitrarily shaped JSON payload.
//!
//! Objects are searched in three phases, first hit wins:
//! preferred keys, then container keys, then every remaining value in
//! insertion order. The phase order is part of the contract: upstream
//! workflows often return several candidate fields and the most specific
//! one must win.

use std::collections::HashSet;

use serde_json::{Map, Value};

pub const PREFERRED_KEYS: [&str; 8] = [
    "reply", "response", "message", "text", "content", "output", "result", "answer",
];

pub const CONTAINER_KEYS: [&str; 5] = ["data", "json", "body", "payload", "choices"];

/// Upper bound on the joined output of [`fallback_text`], in characters.
pub const FALLBACK_MAX_CHARS: usize = 4000;

/// Identity set of objects already entered during a traversal.
pub type Visited = HashSet<*const Map<String, Value>>;

pub fn extract_text(value: &Value) -> Option<String> {
    extract_text_with(value, &mut Visited::new())
}

pub fn extract_text_with(value: &Value, visited: &mut Visited) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_empty(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|item| extract_text_with(item, visited)),
        Value::Object(map) => {
            if !visited.insert(map as *const _) {
                return None;
            }
            let found = PREFERRED_KEYS
                .iter()
                .chain(CONTAINER_KEYS.iter())
                .filter_map(|key| map.get(*key))
                .find_map(|v| extract_text_with(v, visited));
            found.or_else(|| {
                remaining(map).find_map(|v| extract_text_with(v, visited))
            })
        }
    }
}

pub fn collect_strings(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_strings_with(value, &mut out, &mut Visited::new());
    out
}

/// Depth-first, same order as [`extract_text_with`], but never stops early.
pub fn collect_strings_with(value: &Value, out: &mut Vec<String>, visited: &mut Visited) {
    match value {
        Value::Null => {}
        Value::String(s) => out.extend(non_empty(s)),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_strings_with(item, out, visited);
            }
        }
        Value::Object(map) => {
            if !visited.insert(map as *const _) {
                return;
            }
            let ordered = PREFERRED_KEYS
                .iter()
                .chain(CONTAINER_KEYS.iter())
                .filter_map(|key| map.get(*key))
                .chain(remaining(map));
            for v in ordered {
                collect_strings_with(v, out, visited);
            }
        }
    }
}

/// Every string in `value` joined by single spaces, capped at [`FALLBACK_MAX_CHARS`].
pub fn fallback_text(value: &Value) -> Option<String> {
    let joined = collect_strings(value).join(" ");
    if joined.is_empty() {
        return None;
    }
    Some(joined.chars().take(FALLBACK_MAX_CHARS).collect())
}

fn remaining(map: &Map<String, Value>) -> impl Iterator<Item = &Value> {
    map.iter()
        .filter(|(key, _)| {
            !PREFERRED_KEYS.contains(&key.as_str()) && !CONTAINER_KEYS.contains(&key.as_str())
        })
        .map(|(_, v)| v)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
