//! Fan-out of non-fatal channel problems.
//!
//! Broker errors and undecodable frames never change the connection state.
//! They are logged and broadcast here so callers can surface them if they
//! care. Receivers that fall behind skip entries (`RecvError::Lagged`).

use tokio::sync::broadcast;

const DIAGNOSTICS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDiagnostic {
    /// The broker sent an ERROR frame (malformed frame, rejected subscription…).
    BrokerError { message: String, details: String },
    /// Inbound text that does not parse as STOMP.
    MalformedFrame(String),
    /// A MESSAGE whose body is not a chat message.
    UndecodableMessage { destination: String, error: String },
    /// Nothing heard from the broker within the heart-beat deadline.
    HeartbeatTimeout,
    /// Opening the socket or the STOMP session failed.
    ConnectFailed(String),
}

#[derive(Clone)]
pub struct Diagnostics {
    sender: broadcast::Sender<ChannelDiagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelDiagnostic> {
        self.sender.subscribe()
    }

    pub fn report(&self, diagnostic: ChannelDiagnostic) {
        match &diagnostic {
            ChannelDiagnostic::BrokerError { message, details } => {
                tracing::error!(%message, %details, "broker reported error");
            }
            ChannelDiagnostic::MalformedFrame(err) => {
                tracing::warn!(%err, "malformed frame from broker");
            }
            ChannelDiagnostic::UndecodableMessage { destination, error } => {
                tracing::warn!(%destination, %error, "undecodable chat message");
            }
            ChannelDiagnostic::HeartbeatTimeout => {
                tracing::warn!("broker heart-beat timed out");
            }
            ChannelDiagnostic::ConnectFailed(reason) => {
                tracing::warn!(%reason, "chat connection attempt failed");
            }
        }
        // send() only fails when nobody is listening.
        let _ = self.sender.send(diagnostic);
    }
}
