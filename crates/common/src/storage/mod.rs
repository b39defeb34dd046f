//! Persistence seams
//!
//! Two stores are injected into the vault and the key store:
//!
//! - a durable [`KvStore`] of JSON values, partitioned into named stores
//!   with a full scan per partition
//! - a tab/session-scoped [`SessionStore`] of plain strings that never
//!   outlives the session
//!
//! In-memory implementations live in [`memory`]; the SQLite backed durable
//! store lives in the `store` crate.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde_json::Value;

pub mod memory;
pub mod record;

pub use memory::{MemoryKvStore, MemorySessionStore};
pub use record::{is_vault_wrapped, StoredValue, VaultEnvelope};

/// Named partitions of the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreName {
    LinkKeys,
    RoomKeys,
    ReplyCache,
    VaultMeta,
    BroadcastKeys,
}

impl StoreName {
    pub const ALL: [StoreName; 5] = [
        StoreName::LinkKeys,
        StoreName::RoomKeys,
        StoreName::ReplyCache,
        StoreName::VaultMeta,
        StoreName::BroadcastKeys,
    ];

    /// Partitions that hold key material and may need vault migration
    pub const KEY_STORES: [StoreName; 3] = [
        StoreName::LinkKeys,
        StoreName::RoomKeys,
        StoreName::BroadcastKeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::LinkKeys => "link-keys",
            StoreName::RoomKeys => "room-keys",
            StoreName::ReplyCache => "reply-cache",
            StoreName::VaultMeta => "vault-meta",
            StoreName::BroadcastKeys => "broadcast-keys",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreName {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| StorageError::UnknownStore(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown store: {0}")]
    UnknownStore(String),
}

/// Durable key-value store of JSON values
///
/// Writes are idempotent overwrites. Nothing is transactional across keys.
#[async_trait]
pub trait KvStore: Send + Sync + Debug {
    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>, StorageError>;

    async fn put(&self, store: StoreName, key: &str, value: Value) -> Result<(), StorageError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StorageError>;

    /// Every entry of a partition, ordered by key
    async fn scan(&self, store: StoreName) -> Result<Vec<(String, Value)>, StorageError>;
}

/// Session-scoped string store
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
