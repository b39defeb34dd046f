//! SQLite backed durable store
//!
//! Implements [`common::storage::KvStore`] on a single `kv_entries` table.
//! Use [`SqliteKvStore::new`] for a file on disk and
//! [`SqliteKvStore::in_memory`] for tests.

mod database;
mod error;

pub use database::SqliteKvStore;
pub use error::{Result, StoreError};
