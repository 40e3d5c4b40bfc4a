//! Persistent Token Store: a single bearer token under a fixed key.

use std::sync::Arc;

use crate::error::ClientError;

use super::kv::KeyValueStore;

/// Storage key the credential token lives under.
pub const TOKEN_KEY: &str = "token";

/// Get/set/clear facade over a [`KeyValueStore`]. No logic beyond that.
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self) -> Result<Option<String>, ClientError> {
        Ok(self.kv.get(TOKEN_KEY).await?.filter(|t| !t.is_empty()))
    }

    pub async fn set(&self, token: &str) -> Result<(), ClientError> {
        self.kv.set(TOKEN_KEY, token).await
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        self.kv.del(TOKEN_KEY).await
    }
}
