use std::sync::Arc;

use common::backup::KeyBackup;
use common::key_store::KeyStore;
use common::storage::{KvStore, MemoryKvStore, SessionStore};
use common::vault::Vault;
use store::{SqliteKvStore, StoreError};

use crate::api::ApiClient;
use crate::config::{Config, ConfigError};
use crate::error::ApiError;
use crate::remote::{HttpBackupRemote, HttpDistribution};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
}

/// Everything a client session needs, wired from one [`Config`]
#[derive(Debug, Clone)]
pub struct KeyContext {
    pub key_store: KeyStore,
    pub backup: KeyBackup<HttpBackupRemote>,
    pub distribution: HttpDistribution,
}

impl KeyContext {
    /// Open the durable store, build the vault with the configured cost and
    /// throttle, and point the remotes at `api_url`.
    ///
    /// `session` is the current session's store; `token` authenticates the
    /// backup and room endpoints.
    pub async fn from_config(
        config: &Config,
        session: Arc<dyn SessionStore>,
        token: Option<&str>,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        let params = config.pbkdf2_params()?;

        let kv: Arc<dyn KvStore> = match &config.sqlite_path {
            Some(path) => Arc::new(SqliteKvStore::new(path).await?),
            None => {
                tracing::warn!("no sqlite_path configured, keys will not outlive this process");
                Arc::new(MemoryKvStore::new())
            }
        };

        let vault = Vault::with_config(kv.clone(), session.clone(), params, config.unlock_policy());
        let key_store = KeyStore::new(kv, session, vault);

        let api = match token {
            Some(token) => ApiClient::with_bearer_token(&config.api_url, token)?,
            None => ApiClient::new(&config.api_url)?,
        };

        Ok(Self {
            backup: KeyBackup::with_params(
                HttpBackupRemote::new(api.clone()),
                key_store.clone(),
                params,
            ),
            distribution: HttpDistribution::new(api),
            key_store,
        })
    }
}
