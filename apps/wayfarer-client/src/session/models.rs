//! Request and response bodies of the auth endpoints.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

use super::state::{SessionState, UserIdentity};

/// Message the legacy backend sends alongside a successful login
/// ("login success").
pub const LEGACY_LOGIN_SUCCESS: &str = "로그인 성공";

/// Username given to a legacy login that did not name its user.
const LEGACY_FALLBACK_USERNAME: &str = "user";

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Body of `POST /api/auth/login`.
///
/// Two backends are in service: the current one answers `{user, token?}`, the
/// legacy one `{message, user?}`. Variant order matters: a body with a usable
/// `user` object is always read as `Current`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Current {
        user: UserIdentity,
        #[serde(default)]
        token: Option<String>,
    },
    Legacy {
        message: String,
        #[serde(default)]
        user: Option<LegacyUser>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyUser {
    #[serde(default)]
    pub username: Option<String>,
}

impl LoginResponse {
    /// Normalize either shape into the identity and (optional) token to store.
    pub fn into_session(self) -> Result<(UserIdentity, Option<String>), AuthError> {
        match self {
            Self::Current { user, token } => Ok((user, token.filter(|t| !t.is_empty()))),
            Self::Legacy { message, user } if message == LEGACY_LOGIN_SUCCESS => {
                let username = user
                    .and_then(|u| u.username)
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| LEGACY_FALLBACK_USERNAME.to_string());
                Ok((UserIdentity::new(username), None))
            }
            Self::Legacy { message, .. } => Err(AuthError::Rejected(message)),
        }
    }
}

/// Body of `GET /api/auth/check`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub user: Option<UserIdentity>,
}

/// Outcome of a session operation that talks to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    SignedIn(SessionState),
    SignedOut,
}
