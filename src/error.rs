//! Error types for the cache and request layers
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by the cache tiers.
///
/// Durable-store variants never reach callers of `CacheService`; they are
/// logged and absorbed. Only a payload that cannot be serialized fails a `set`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Payload or stored record could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store rejected the operation
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// Filesystem error from a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Request Error Enum ==
/// Failure of a single outbound request.
///
/// `Clone` because every waiter on a deduplicated request receives a copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The attempt exceeded the configured timeout
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Backend answered with a non-2xx status
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded into the expected shape
    #[error("Invalid response body: {0}")]
    Decode(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
