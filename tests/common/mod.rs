#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use tokio::net::TcpListener;

use webhook_chat::config::ClientConfig;
use webhook_chat::message::ChatMessage;
use webhook_chat::services::dispatcher::Dispatcher;
use webhook_chat::services::event_log::EventLog;
use webhook_chat::services::health::HealthProber;

pub const SESSION_ID: &str = "abcdefgh12345678";

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Backend answering `/api/chat` (GET and POST) from a script; the last reply repeats.
#[derive(Clone)]
pub struct Script {
    pub hits: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<String>>>,
    replies: Arc<Vec<Reply>>,
}

impl Script {
    pub fn new(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty());
        Self {
            hits: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(replies),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/chat", get(scripted).post(scripted))
            .with_state(self.clone())
    }

    pub async fn serve(&self) -> String {
        spawn(self.router()).await
    }
}

async fn scripted(State(script): State<Script>, body: String) -> Response {
    let n = script.hits.fetch_add(1, Ordering::SeqCst);
    script.requests.lock().push(body);
    let reply = script
        .replies
        .get(n)
        .or(script.replies.last())
        .cloned()
        .unwrap();
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (
        StatusCode::from_u16(reply.status).unwrap(),
        [(CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
        .into_response()
}

pub fn config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(20),
        ..ClientConfig::default()
    }
}

pub fn dispatcher(config: ClientConfig) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        Client::new(),
        config,
        Arc::new(EventLog::default()),
    ))
}

pub fn prober(config: &ClientConfig) -> Arc<HealthProber> {
    Arc::new(HealthProber::new(Client::new(), config.health_url()))
}

pub fn message(text: &str) -> ChatMessage {
    ChatMessage::new(SESSION_ID, text, None).unwrap()
}
