use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::http::ApiClient;
use crate::session::{CheckResponse, Credentials, LoginResponse};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const CHECK_PATH: &str = "/api/auth/check";

pub async fn login(api: &ApiClient, credentials: &Credentials) -> Result<LoginResponse> {
    api.post_anonymous(LOGIN_PATH, credentials).await
}

/// `POST /api/auth/register`. Sent without a bearer token, like login.
pub async fn register<B: Serialize + ?Sized>(api: &ApiClient, user_data: &B) -> Result<Value> {
    api.post_anonymous(REGISTER_PATH, user_data).await
}

pub async fn logout(api: &ApiClient) -> Result<Value> {
    api.post_empty(LOGOUT_PATH).await
}

pub async fn check(api: &ApiClient) -> Result<CheckResponse> {
    api.get(CHECK_PATH).await
}
