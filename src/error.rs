//! Error types for the cache.

use crate::types::Id;
use thiserror::Error;

/// Main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("pass in a transport client")]
    MissingTransport,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("record not found: {service}/{id}")]
    RecordNotFound { service: String, id: Id },

    #[error("record removed: {service}/{id}")]
    RecordRemoved { service: String, id: Id },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
