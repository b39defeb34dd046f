//! Error types for the durable store.

use common::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value is not valid JSON
    #[error("invalid stored value in {store}/{key}: {source}")]
    InvalidValue {
        store: String,
        key: String,
        source: serde_json::Error,
    },
}

impl From<StoreError> for StorageError {
    fn from(e: StoreError) -> Self {
        StorageError::Backend(anyhow::Error::new(e))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
