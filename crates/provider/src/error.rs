//! Provider error types.

use common::KeyError;
use kv_store::StoreError;
use thiserror::Error;

/// Errors that can occur in provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An error occurred in the key-value store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Failed to serialize or deserialize a stored document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An identifier cannot be turned into an unambiguous record key.
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// A read model value has no string `id` to key it by.
    #[error("Read model {read_model} has no string `id` field")]
    MissingReadModelId { read_model: String },

    /// A search filter is malformed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An envelope is missing required content.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
