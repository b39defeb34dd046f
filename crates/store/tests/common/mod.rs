//! Shared test utilities for durable store integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use common::key_store::KeyStore;
use common::storage::MemorySessionStore;
use common::vault::Vault;
use store::SqliteKvStore;
use tempfile::TempDir;

/// Open a key store over a database file inside `dir`, with a fresh session
pub async fn open_key_store(dir: &Path) -> (KeyStore, SqliteKvStore) {
    let kv = SqliteKvStore::new(&dir.join("keys.db")).await.unwrap();
    let session = Arc::new(MemorySessionStore::new());
    let vault = Vault::new(Arc::new(kv.clone()), session.clone());
    (KeyStore::new(Arc::new(kv.clone()), session, vault), kv)
}

pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}
