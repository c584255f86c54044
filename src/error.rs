//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Apart from
//! [`TieredCache::open`](crate::TieredCache::open), none of these cross the
//! cache facade: they are logged and degrade to a miss or a no-op.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache directory could not be created
    #[error("Failed to create cache directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be written to disk
    #[error("Failed to write {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record exists but could not be read
    #[error("Failed to read {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The codec could not turn a value into bytes
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// The codec could not turn bytes back into a value
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// The key cannot be mapped to a file name
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The cache was opened outside a Tokio runtime
    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
