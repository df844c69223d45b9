//! Terminal client for the chat proxy.
//!
//! Lines are sent as messages. `/retry` resends the last failed message,
//! `/status` re-checks the backend, `/quit` exits.

use std::sync::Arc;

use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use webhook_chat::config::ClientConfig;
use webhook_chat::services::conversation::{ChatController, ConversationMessage, Sender, ServiceStatus};
use webhook_chat::services::dispatcher::Dispatcher;
use webhook_chat::services::event_log::EventLog;
use webhook_chat::services::health::HealthProber;

fn print_message(message: &ConversationMessage) {
    match (message.sender, &message.error_code) {
        (Sender::User, _) => {}
        (Sender::Bot, Some(code)) => println!("bot ! {} [{}]", message.text, code),
        (Sender::Bot, None) => println!("bot > {}", message.text),
    }
}

fn print_status(status: ServiceStatus) {
    match status {
        ServiceStatus::Checking => println!("-- checking service..."),
        ServiceStatus::Online => println!("-- service online"),
        ServiceStatus::Offline => println!("-- service offline, type /status to re-check"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webhook_chat=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env();
    let client = Client::new();
    let log = Arc::new(EventLog::default());
    let prober = Arc::new(HealthProber::new(client.clone(), config.health_url()));
    let dispatcher = Arc::new(Dispatcher::new(client, config, log));

    let session_id = Uuid::new_v4().to_string();
    let mut controller = ChatController::new(session_id, dispatcher, prober);
    print_status(controller.mount().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let seen = controller.messages().len();
        match line.trim() {
            "/quit" => break,
            "/status" => {
                print_status(controller.recheck().await);
                continue;
            }
            "/retry" => {
                if !controller.retry_last().await {
                    println!("-- nothing to retry");
                }
            }
            text => {
                if let Err(e) = controller.send(text).await {
                    println!("-- {e}");
                }
            }
        }
        for message in &controller.messages()[seen..] {
            print_message(message);
        }
        if controller.retry_state().can_retry {
            println!("-- type /retry to resend");
        }
    }
    Ok(())
}
