pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod nav;
pub mod realtime;
pub mod session;
pub mod store;

use std::sync::Arc;

use config::Config;
use error::Result;
use http::ApiClient;
use nav::{LogNavigator, NavigationCapability};
use realtime::ChannelManager;
use session::{AuthState, SessionStore};
use store::{FileStore, KeyValueStore, TokenStore};
use tokio::task::JoinHandle;

/// Explicitly owned client context: one of each component, wired together.
#[derive(Clone)]
pub struct Client {
    pub config: Arc<Config>,
    pub api: ApiClient,
    pub session: SessionStore,
    pub auth: Arc<AuthState>,
    pub tokens: TokenStore,
    pub chat: ChannelManager,
}

impl Client {
    pub fn new(
        config: Config,
        kv: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn NavigationCapability>,
    ) -> Result<Self> {
        let tokens = TokenStore::new(kv);
        let auth = Arc::new(AuthState::new());
        let api = ApiClient::new(
            &config.api_base_url,
            config.request_timeout,
            tokens.clone(),
            Arc::clone(&auth),
            navigator,
        )?;
        let session = SessionStore::new(api.clone(), tokens.clone(), Arc::clone(&auth));
        let chat = ChannelManager::new(config.channel.clone());

        Ok(Self {
            config: Arc::new(config),
            api,
            session,
            auth,
            tokens,
            chat,
        })
    }

    /// File-backed token store and a navigator that only logs.
    pub fn from_config(config: Config) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.token_store_path.clone()));
        Self::new(config, kv, Arc::new(LogNavigator))
    }

    /// Close the chat channel whenever the session signs out. Must be called
    /// from within a Tokio runtime.
    pub fn spawn_channel_teardown(&self) -> JoinHandle<()> {
        realtime::disconnect_on_sign_out(self.chat.clone(), self.auth.subscribe())
    }
}
