//! Authentication state shared by the session store and the HTTP gateway.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::AuthError;

/// The signed-in user's profile. Replaced wholesale on every successful
/// login or status check, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Empty when the backend's user object does not carry one.
    #[serde(default)]
    pub username: String,
    /// Any other profile fields the backend sends.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl UserIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            profile: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub is_logged_in: bool,
    pub user: Option<UserIdentity>,
    pub token: Option<String>,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        if self.is_logged_in {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
}

struct Inner {
    state: SessionState,
    /// Bumped on every clear. Responses issued under an older generation must
    /// not be applied.
    generation: u64,
    /// Set by the first invalidation since the last successful login.
    redirect_pending: bool,
}

/// Owner of [`SessionState`].
///
/// Every mutation happens under one short write lock, so readers never see a
/// half-applied update. Each mutation is published on a `watch` channel so
/// other components (the realtime channel) can follow the session.
pub struct AuthState {
    inner: RwLock<Inner>,
    status_tx: watch::Sender<SessionStatus>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Anonymous);
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::default(),
                generation: 0,
                redirect_pending: false,
            }),
            status_tx,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.read().state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().state.status()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Receiver notified after every session mutation, including repeated
    /// sign-outs.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Apply a successful login or status check that was issued under
    /// `generation`. `token` of `None` keeps whatever token is already held.
    pub fn authenticate(
        &self,
        generation: u64,
        user: UserIdentity,
        token: Option<String>,
    ) -> Result<SessionState, AuthError> {
        let snapshot = {
            let mut inner = self.inner.write();
            if inner.generation != generation {
                return Err(AuthError::Superseded);
            }
            inner.state.is_logged_in = true;
            inner.state.user = Some(user);
            if token.is_some() {
                inner.state.token = token;
            }
            inner.redirect_pending = false;
            inner.state.clone()
        };
        self.status_tx.send_replace(SessionStatus::Authenticated);
        Ok(snapshot)
    }

    /// Optimistically mark the session as signed in with a stored token. The
    /// token is not validated; the first 401 corrects the state.
    pub fn resume(&self, token: String) {
        {
            let mut inner = self.inner.write();
            inner.state.is_logged_in = true;
            inner.state.token = Some(token);
        }
        self.status_tx.send_replace(SessionStatus::Authenticated);
    }

    /// Reset to the signed-out default.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.state = SessionState::default();
            inner.generation += 1;
        }
        self.status_tx.send_replace(SessionStatus::Anonymous);
    }

    /// Clear the session after an authorization failure.
    ///
    /// Returns `true` only for the first invalidation since the last
    /// successful login, which is the one that should navigate.
    pub fn invalidate(&self) -> bool {
        let first = {
            let mut inner = self.inner.write();
            inner.state = SessionState::default();
            inner.generation += 1;
            !std::mem::replace(&mut inner.redirect_pending, true)
        };
        self.status_tx.send_replace(SessionStatus::Anonymous);
        first
    }
}
