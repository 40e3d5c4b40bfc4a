use std::path::PathBuf;
use std::time::Duration;

/// Default reconnect delay after a transport disruption (ms).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
/// Default heartbeat interval requested from the broker (ms).
pub const DEFAULT_HEARTBEAT_INCOMING_MS: u64 = 4000;
/// Default heartbeat interval offered to the broker (ms).
pub const DEFAULT_HEARTBEAT_OUTGOING_MS: u64 = 4000;

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the reservation service (e.g. `http://localhost:8080`).
    pub api_base_url: String,
    /// Path of the file backing the persistent token store.
    pub token_store_path: PathBuf,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Realtime chat channel settings.
    pub channel: ChannelConfig,
}

/// Settings for the realtime chat channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Broker WebSocket endpoint (e.g. `ws://localhost:8080/ws`).
    pub ws_url: String,
    /// Delay before reconnecting after a disruption. Zero disables reconnects.
    pub reconnect_delay: Duration,
    /// Heartbeat interval we want to receive at. Zero means none.
    pub heartbeat_incoming: Duration,
    /// Heartbeat interval we can send at. Zero means none.
    pub heartbeat_outgoing: Duration,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            heartbeat_incoming: Duration::from_millis(DEFAULT_HEARTBEAT_INCOMING_MS),
            heartbeat_outgoing: Duration::from_millis(DEFAULT_HEARTBEAT_OUTGOING_MS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset or unparsable values fall back to
    /// their defaults.
    pub fn from_env() -> Self {
        let api_base_url = std::env::var("API_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let ws_url = std::env::var("WS_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| derive_ws_url(&api_base_url));

        Self {
            token_store_path: std::env::var("TOKEN_STORE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".wayfarer/token.json")),
            request_timeout: Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECS", 30)),
            channel: ChannelConfig {
                ws_url,
                reconnect_delay: Duration::from_millis(env_u64(
                    "CHAT_RECONNECT_DELAY_MS",
                    DEFAULT_RECONNECT_DELAY_MS,
                )),
                heartbeat_incoming: Duration::from_millis(env_u64(
                    "CHAT_HEARTBEAT_INCOMING_MS",
                    DEFAULT_HEARTBEAT_INCOMING_MS,
                )),
                heartbeat_outgoing: Duration::from_millis(env_u64(
                    "CHAT_HEARTBEAT_OUTGOING_MS",
                    DEFAULT_HEARTBEAT_OUTGOING_MS,
                )),
            },
            api_base_url,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `http://host:port` → `ws://host:port/ws`, `https` → `wss`.
pub fn derive_ws_url(api_base_url: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/ws")
}
