use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a credential exchange. Local to the caller: never changes
/// global session state.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("login rejected: {0}")]
    Rejected(String),
    /// The session was invalidated while the call was in flight, so its
    /// result was discarded.
    #[error("session was invalidated while the request was in flight")]
    Superseded,
}

/// Client-level error type shared by the HTTP gateway, the session store and
/// the realtime channel.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// 401 on a bearer-eligible request. The gateway has already cleared the
    /// token store, signed the session out and triggered navigation by the time
    /// the caller sees this.
    #[error("authorization failure")]
    AuthorizationFailure,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("request failed with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("realtime channel is not connected")]
    NotConnected,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether the failure happened below HTTP: the request never produced a
    /// response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Socket(_))
    }

    /// The HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthorizationFailure => Some(StatusCode::UNAUTHORIZED),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        tracing::debug!(?err, "websocket error");
        Self::Socket(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!(?err, "storage i/o error");
        Self::Storage(err.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
