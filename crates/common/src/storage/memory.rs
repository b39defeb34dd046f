use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{KvStore, SessionStore, StorageError, StoreName};

/// In-memory durable store, one ordered map per partition
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<RwLock<HashMap<StoreName, BTreeMap<String, Value>>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(anyhow::anyhow!("failed to acquire lock: {}", e))
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>, StorageError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner.get(&store).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, store: StoreName, key: &str, value: Value) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.entry(store).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        if let Some(entries) = inner.get_mut(&store) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, store: StoreName) -> Result<Vec<(String, Value)>, StorageError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner
            .get(&store)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory session store
///
/// Cloning shares the underlying map, the way two handles to the same tab's
/// storage would. A fresh instance stands in for a new tab.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, as closing the tab would
    pub fn clear(&self) -> Result<(), StorageError> {
        self.inner.write().map_err(lock_error)?.clear();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read().map_err(lock_error)?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.inner
            .write()
            .map_err(lock_error)?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.write().map_err(lock_error)?.remove(key);
        Ok(())
    }
}
