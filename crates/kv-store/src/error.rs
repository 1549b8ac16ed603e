use thiserror::Error;

use crate::ItemKey;

/// Errors that can occur when interacting with a key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional put found a live item already stored under the key.
    #[error("Condition failed in table {table}: item {key} already exists")]
    ConditionFailed { table: String, key: ItemKey },

    /// The item or key cannot be stored.
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A managed store SDK call failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for key-value store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
