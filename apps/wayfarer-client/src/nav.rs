//! Navigation seam and route access rules.

use crate::session::SessionStatus;

/// Path of the sign-in entry point.
pub const LOGIN_PATH: &str = "/login";

/// Capability to move the user to the sign-in entry point.
///
/// Handed to the HTTP gateway at construction so invalidation never reaches
/// for an ambient navigation object.
pub trait NavigationCapability: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator for headless use: records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl NavigationCapability for LogNavigator {
    fn redirect_to_login(&self) {
        tracing::warn!(path = LOGIN_PATH, "session invalidated, sign in again");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    Search,
    AttractionDetail(String),
    MyReservations,
    NotFound,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Self::Home,
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/search" => Self::Search,
            "/my-reservations" => Self::MyReservations,
            other => match other.strip_prefix("/attraction/") {
                Some(id) if !id.is_empty() && !id.contains('/') => {
                    Self::AttractionDetail(id.to_string())
                }
                _ => Self::NotFound,
            },
        }
    }

    fn requires_auth(&self) -> bool {
        matches!(self, Self::MyReservations)
    }

    fn requires_guest(&self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }
}

/// Result of checking a navigation against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    /// Send the user to sign in, then back to `redirect`.
    Login { redirect: String },
    Home,
}

/// Decide whether `requested_path` may be entered in the current session.
pub fn guard(requested_path: &str, status: SessionStatus) -> Guard {
    let route = Route::parse(requested_path);
    match status {
        SessionStatus::Anonymous if route.requires_auth() => Guard::Login {
            redirect: requested_path.to_string(),
        },
        SessionStatus::Authenticated if route.requires_guest() => Guard::Home,
        _ => Guard::Proceed,
    }
}
