//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for every adapter and the HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Missing or invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No adapter registered under the requested name
    #[error("Unknown adapter name {0:?}")]
    UnknownAdapter(String),

    /// Operation requires an existing key
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Stored value cannot be interpreted as the required type
    #[error("Type mismatch: {0}")]
    Type(String),

    /// Underlying storage I/O or network failure
    #[error("Storage medium error: {0}")]
    Medium(String),

    /// Stored metadata cannot be decoded
    #[error("Corrupt entry: {0}")]
    CorruptEntry(String),

    /// Value could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Rejected logical key
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Medium(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Medium(err.to_string())
    }
}

#[cfg(feature = "memcache")]
impl From<memcache::MemcacheError> for CacheError {
    fn from(err: memcache::MemcacheError) -> Self {
        CacheError::Medium(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidKey(_) | CacheError::Type(_) | CacheError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::UnknownAdapter(_)
            | CacheError::Medium(_)
            | CacheError::CorruptEntry(_)
            | CacheError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
