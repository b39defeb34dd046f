//! SQLite database for durable key-value entries.

use std::path::Path;

use async_trait::async_trait;
use common::storage::{KvStore, StorageError, StoreName};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};

use crate::error::{Result, StoreError};

/// SQLite connection pool over the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (or create) a database file.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::debug!(path = %path.display(), "opened key store database");
        Ok(db)
    }

    /// Create an in-memory database.
    ///
    /// Every pooled connection to `:memory:` is its own database, so the pool
    /// is pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn get_entry(&self, store: StoreName, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM kv_entries
            WHERE store = ? AND key = ?
            "#,
        )
        .bind(store.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| parse_value(store, key, r.get("value")))
            .transpose()
    }

    async fn put_entry(&self, store: StoreName, key: &str, value: &Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO kv_entries (store, key, value, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(store, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(store.as_str())
        .bind(key)
        .bind(value.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_entry(&self, store: StoreName, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries WHERE store = ? AND key = ?
            "#,
        )
        .bind(store.as_str())
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan_entries(&self, store: StoreName) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query(
            r#"
            SELECT key, value FROM kv_entries
            WHERE store = ?
            ORDER BY key ASC
            "#,
        )
        .bind(store.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let key: String = r.get("key");
                let value = parse_value(store, &key, r.get("value"))?;
                Ok((key, value))
            })
            .collect()
    }

    /// Number of entries in a partition.
    pub async fn count(&self, store: StoreName) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM kv_entries WHERE store = ?
            "#,
        )
        .bind(store.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}

fn parse_value(store: StoreName, key: &str, raw: String) -> Result<Value> {
    serde_json::from_str(&raw).map_err(|source| StoreError::InvalidValue {
        store: store.to_string(),
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, store: StoreName, key: &str) -> std::result::Result<Option<Value>, StorageError> {
        Ok(self.get_entry(store, key).await?)
    }

    async fn put(
        &self,
        store: StoreName,
        key: &str,
        value: Value,
    ) -> std::result::Result<(), StorageError> {
        Ok(self.put_entry(store, key, &value).await?)
    }

    async fn delete(&self, store: StoreName, key: &str) -> std::result::Result<(), StorageError> {
        self.delete_entry(store, key).await?;
        Ok(())
    }

    async fn scan(&self, store: StoreName) -> std::result::Result<Vec<(String, Value)>, StorageError> {
        Ok(self.scan_entries(store).await?)
    }
}
