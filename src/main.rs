use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webhook_chat::config::ProxyConfig;
use webhook_chat::routes;
use webhook_chat::state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("webhook_chat=info,tower_http=info")),
        )
        .init();

    let config = ProxyConfig::from_env();
    if config.webhook_url.is_none() {
        warn!("N8N_WEBHOOK_URL is not set, chat requests will be rejected");
    }

    let port = config.port;
    let static_dir = config.static_dir.clone();
    let state: SharedState = Arc::new(AppState::new(config));

    let cors = CorsLayer::very_permissive();

    let app = routes::create_router(&static_dir)
        .with_state(state)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!("chat proxy running at http://localhost:{port}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
