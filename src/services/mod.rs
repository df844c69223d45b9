// src/services/mod.rs
pub mod conversation;
pub mod dispatcher;
pub mod event_log;
pub mod extractor;
pub mod health;
pub mod stream;
pub mod webhook;
