//! HTTP gateway: every domain call goes through [`ApiClient`].
//!
//! Outbound, the stored token is attached as `Authorization: Bearer <token>`
//! (omitted entirely when there is no token). Inbound, a 401 on any
//! bearer-eligible request clears the token store, signs the session out and
//! triggers navigation before the error reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AuthError, ClientError, Result};
use crate::nav::NavigationCapability;
use crate::session::AuthState;
use crate::store::TokenStore;

/// Whether a request presents the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// Attach the stored token if there is one. A 401 invalidates the session.
    Bearer,
    /// Credential exchange (login, register): never sends a token, and a 401
    /// means the submitted credentials were wrong.
    Anonymous,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    http: reqwest::Client,
    tokens: TokenStore,
    auth: Arc<AuthState>,
    navigator: Arc<dyn NavigationCapability>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: TokenStore,
        auth: Arc<AuthState>,
        navigator: Arc<dyn NavigationCapability>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                base_url: base_url.trim_end_matches('/').to_string(),
                http,
                tokens,
                auth,
                navigator,
            }),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::GET, path), Credential::Bearer)
            .await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let req = self.request(Method::GET, path).query(query);
        self.execute(req, Credential::Bearer).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.request(Method::POST, path).json(body);
        self.execute(req, Credential::Bearer).await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::POST, path), Credential::Bearer)
            .await
    }

    /// POST a credential exchange (see [`Credential::Anonymous`]).
    pub async fn post_anonymous<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.request(Method::POST, path).json(body);
        self.execute(req, Credential::Anonymous).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::DELETE, path), Credential::Bearer)
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        self.inner.http.request(method, url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        mut req: RequestBuilder,
        credential: Credential,
    ) -> Result<T> {
        // Outbound stage.
        if credential == Credential::Bearer {
            if let Some(token) = self.inner.tokens.get().await? {
                req = req.bearer_auth(token);
            }
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(error = %e, "request failed before a response arrived");
            ClientError::Transport(e)
        })?;

        // Inbound stage.
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(match credential {
                Credential::Bearer => {
                    tracing::warn!(url = %resp.url(), "authorization failure");
                    self.invalidate().await;
                    ClientError::AuthorizationFailure
                }
                Credential::Anonymous => AuthError::InvalidCredentials.into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%status, "request returned an error status");
            return Err(ClientError::Status { status, body });
        }

        let bytes = resp.bytes().await?;
        // Empty bodies (204, bare 200) decode as JSON `null`.
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(?e, "response body did not match the expected shape");
            ClientError::protocol(format!("unexpected response body: {e}"))
        })
    }

    /// Global sign-out after an authorization failure. Safe to run any number
    /// of times; only the first run since the last login navigates.
    async fn invalidate(&self) {
        // Bump the generation before touching storage, so a login racing
        // this sees itself superseded and rolls back its own token.
        let navigate = self.inner.auth.invalidate();
        if let Err(err) = self.inner.tokens.clear().await {
            tracing::error!(?err, "failed to clear the stored token");
        }
        if navigate {
            self.inner.navigator.redirect_to_login();
        }
    }
}
