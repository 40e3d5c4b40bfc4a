use std::sync::Arc;

use crate::api;
use crate::error::Result;
use crate::http::ApiClient;
use crate::store::TokenStore;

use super::models::{CheckResponse, Credentials, SessionUpdate};
use super::state::{AuthState, SessionState, SessionStatus};

/// Session lifecycle operations: login, logout, status check and resume.
///
/// The store is the only writer of session state besides the gateway's
/// invalidation stage.
#[derive(Clone)]
pub struct SessionStore {
    api: ApiClient,
    tokens: TokenStore,
    auth: Arc<AuthState>,
}

impl SessionStore {
    pub fn new(api: ApiClient, tokens: TokenStore, auth: Arc<AuthState>) -> Self {
        Self { api, tokens, auth }
    }

    pub fn state(&self) -> SessionState {
        self.auth.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.auth.status()
    }

    /// Exchange credentials for a session.
    ///
    /// On any failure the session is left exactly as it was.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionUpdate> {
        let generation = self.auth.generation();

        let response = api::auth::login(&self.api, credentials)
            .await
            .inspect_err(|err| tracing::warn!(%err, username = %credentials.username, "login failed"))?;
        let (user, token) = response.into_session()?;

        // Persist first so a storage failure cannot leave a half-applied login.
        if let Some(token) = &token {
            self.tokens.set(token).await?;
        }

        match self.auth.authenticate(generation, user, token.clone()) {
            Ok(state) => {
                tracing::info!(
                    username = state.user.as_ref().map(|u| u.username.as_str()).unwrap_or_default(),
                    token_issued = token.is_some(),
                    "signed in"
                );
                Ok(SessionUpdate::SignedIn(state))
            }
            Err(err) => {
                // Signed out while the request was in flight; the sign-out wins.
                if token.is_some() {
                    if let Err(err) = self.tokens.clear().await {
                        tracing::error!(?err, "failed to roll back the stored token");
                    }
                }
                tracing::warn!("discarding login response for an invalidated session");
                Err(err.into())
            }
        }
    }

    /// Sign out. Best effort on the server, authoritative locally: the session
    /// and token store are cleared whatever the server says. Only a transport
    /// failure is reported back.
    pub async fn logout(&self) -> Result<()> {
        let state = self.auth.snapshot();
        let stored = self.tokens.get().await.ok().flatten();
        if !state.is_logged_in && state.token.is_none() && stored.is_none() {
            tracing::debug!("logout while already signed out");
            return Ok(());
        }

        let outcome = api::auth::logout(&self.api).await;

        self.auth.clear();
        let cleared = self.tokens.clear().await;
        tracing::info!("signed out");

        match outcome {
            Err(err) if err.is_transport() => Err(err),
            Err(err) => {
                tracing::warn!(%err, "server-side logout failed");
                cleared
            }
            Ok(_) => cleared,
        }
    }

    /// Ask the server who we are. Fails closed: any error signs the session
    /// out before being returned.
    pub async fn check_login_status(&self) -> Result<SessionUpdate> {
        let generation = self.auth.generation();

        match api::auth::check(&self.api).await {
            Ok(CheckResponse { user: Some(user) }) => {
                let state = self.auth.authenticate(generation, user, None)?;
                Ok(SessionUpdate::SignedIn(state))
            }
            Ok(CheckResponse { user: None }) => {
                self.auth.clear();
                Ok(SessionUpdate::SignedOut)
            }
            Err(err) => {
                tracing::warn!(%err, "status check failed, signing out");
                self.auth.clear();
                Err(err)
            }
        }
    }

    /// Trust-on-read resume at startup: a stored token marks the session as
    /// signed in without asking the server.
    pub async fn auto_resume(&self) {
        match self.tokens.get().await {
            Ok(Some(token)) => {
                tracing::info!("resuming session from stored token");
                self.auth.resume(token);
            }
            Ok(None) => tracing::debug!("no stored token to resume"),
            Err(err) => tracing::warn!(%err, "could not read the stored token"),
        }
    }
}
