mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use webhook_chat::config::ProxyConfig;
use webhook_chat::routes::create_router;
use webhook_chat::services::conversation::{ChatController, Sender};
use webhook_chat::state::AppState;

use common::{Reply, SESSION_ID, Script};

fn app(webhook_url: Option<String>) -> Router {
    let config = ProxyConfig {
        webhook_url,
        ..ProxyConfig::default()
    };
    let router = create_router(&config.static_dir);
    router.with_state(Arc::new(AppState::new(config)))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let response = app(None)
        .oneshot(Request::builder().uri("/api/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "status": "ok", "webhookConfigured": false })
    );
}

#[tokio::test]
async fn invalid_message_is_rejected() {
    let response = app(Some("http://127.0.0.1:9/unused".into()))
        .oneshot(chat_request(json!({ "sessionId": "short", "message": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    let app = app(Some("http://127.0.0.1:9/unused".into()));

    let response = app
        .clone()
        .oneshot(chat_request(json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["error"].as_str().unwrap().contains("sessionId"));

    let not_json = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.oneshot(not_json).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn missing_webhook_is_service_unavailable() {
    let response = app(None)
        .oneshot(chat_request(json!({ "sessionId": SESSION_ID, "message": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "WEBHOOK_NOT_CONFIGURED");
}

#[tokio::test]
async fn forwards_body_and_relays_raw_reply() {
    let webhook = Script::new(vec![Reply::json(200, json!({ "output": { "text": "Hello there" } }))]);
    let base = webhook.serve().await;

    let payload = json!({ "sessionId": SESSION_ID, "message": "hi", "metadata": { "page": "/pricing" } });
    let response = app(Some(format!("{base}/api/chat")))
        .oneshot(chat_request(payload.clone()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(json_body(response).await, json!({ "output": { "text": "Hello there" } }));

    let forwarded: Value = serde_json::from_str(&webhook.requests.lock()[0]).unwrap();
    assert_eq!(forwarded, payload);
}

#[tokio::test]
async fn upstream_failures_are_mapped() {
    let webhook = Script::new(vec![Reply::text(500, "boom"), Reply::text(429, "slow down")]);
    let base = webhook.serve().await;
    let app = app(Some(format!("{base}/api/chat")));

    let request = || chat_request(json!({ "sessionId": SESSION_ID, "message": "hi" }));

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["code"], "UPSTREAM_ERROR");

    let response = app.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(response).await["code"], "RATE_LIMIT");
}

#[tokio::test]
async fn controller_through_proxy_end_to_end() {
    let webhook = Script::new(vec![Reply::json(200, json!({ "output": { "text": "Hello there" } }))]);
    let webhook_base = webhook.serve().await;
    let proxy_base = common::spawn(app(Some(format!("{webhook_base}/api/chat")))).await;

    let cfg = common::config(&proxy_base);
    let prober = common::prober(&cfg);
    let mut chat = ChatController::new(SESSION_ID, common::dispatcher(cfg), prober);
    chat.mount().await;
    chat.send("hi").await.unwrap();

    let reply = chat.messages().last().unwrap();
    assert_eq!(reply.sender, Sender::Bot);
    assert_eq!(reply.text, "Hello there");
    // The health probe stays on the proxy.
    assert_eq!(webhook.hits(), 1);
}
