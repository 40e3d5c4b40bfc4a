use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wayfarer_client::config::Config;
use wayfarer_client::error::Result;
use wayfarer_client::realtime::message::validate_room_id;
use wayfarer_client::realtime::ChatMessage;
use wayfarer_client::session::{Credentials, SessionStatus};
use wayfarer_client::Client;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        api = %config.api_base_url,
        ws = %config.channel.ws_url,
        "wayfarer configured"
    );

    let client = Client::from_config(config)?;
    let _teardown = client.spawn_channel_teardown();

    client.session.auto_resume().await;

    let username = std::env::var("WAYFARER_USERNAME").ok();
    let password = std::env::var("WAYFARER_PASSWORD").ok();
    if let (Some(username), Some(password)) = (username, password) {
        if let Err(err) = client
            .session
            .login(&Credentials::new(username, password))
            .await
        {
            tracing::error!(%err, "login failed");
        }
    } else if client.session.status() == SessionStatus::Authenticated {
        if let Err(err) = client.session.check_login_status().await {
            tracing::warn!(%err, "stored session is no longer valid");
        }
    }

    let room = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WAYFARER_ROOM").ok())
        .filter(|r| !r.is_empty());
    let Some(room) = room else {
        tracing::info!(status = ?client.session.status(), "no room given; exiting");
        return Ok(());
    };

    chat(&client, &room).await;
    Ok(())
}

/// Print the room's messages and publish every stdin line until EOF or Ctrl-C.
/// The room is re-joined whenever the channel reconnects.
async fn chat(client: &Client, room: &str) {
    if let Err(err) = validate_room_id(room) {
        tracing::error!(%err, room, "could not join room");
        return;
    }
    let sender_id = client
        .session
        .state()
        .user
        .map(|u| u.username)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    let printer = client.chat.stay_joined(room, |msg| {
        let at = msg
            .timestamp
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        println!("[{at}] {}: {}", msg.sender_id, msg.body);
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let message = ChatMessage::new(room, sender_id.as_str(), line);
                    if let Err(err) = client.chat.publish(&message) {
                        tracing::warn!(%err, "message not sent");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(%err, "stdin read failed");
                    break;
                }
            }
        }
    }

    client.chat.disconnect().await;
    let _ = printer.await;
}
