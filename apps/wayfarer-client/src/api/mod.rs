//! Thin wrappers, one per backend endpoint. No retries, paging or reshaping:
//! a call goes through the [`ApiClient`](crate::http::ApiClient) and its
//! result or error comes straight back.

pub mod attractions;
pub mod auth;
pub mod chat;
pub mod reservations;

use crate::error::{ClientError, Result};

/// Check a caller-supplied value before interpolating it into a path.
pub(crate) fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::validation(format!("{field} must not be empty")));
    }
    if value.contains(['/', '?', '#']) {
        return Err(ClientError::validation(format!(
            "{field} contains a reserved character"
        )));
    }
    Ok(value)
}
