//! Error types for the local cache.

use thiserror::Error;

/// Errors raised by [`KeyValueStore`](super::KeyValueStore) implementations.
///
/// Cache failures are never fatal to identity resolution: callers log them
/// and carry on as if the entry were absent.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing file failed.
    #[error("Cache file I/O failed for {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be encoded.
    #[error("Failed to serialize cache value for '{key}': {source}")]
    SerializationFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be decoded.
    #[error("Failed to deserialize cache value for '{key}': {source}")]
    DeserializationFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Check if this error comes from the filesystem.
    pub fn is_io_error(&self) -> bool {
        matches!(self, CacheError::FileIo { .. })
    }

    /// Check if this error is an encoding problem with a stored value.
    pub fn is_corrupt_entry(&self) -> bool {
        matches!(
            self,
            CacheError::SerializationFailed { .. } | CacheError::DeserializationFailed { .. }
        )
    }
}

impl From<CacheError> for crate::Error {
    fn from(err: CacheError) -> Self {
        crate::Error::Cache(err)
    }
}
