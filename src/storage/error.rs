//! Storage errors.

use thiserror::Error;

/// Errors returned by the storage engine and its backing file.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No entry is stored under the requested key
    #[error("no data was found by provided key")]
    KeyNotFound,

    /// A create targeted a key that is already stored
    #[error("provided key already exists")]
    KeyAlreadyExists,

    /// Snapshot or entry could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The snapshot was written by a newer format than this build reads
    #[error("unsupported snapshot version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The backing file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true for routine outcomes the caller fixes by changing the
    /// request, as opposed to corruption or environment failures.
    pub fn is_domain(&self) -> bool {
        matches!(self, StorageError::KeyNotFound | StorageError::KeyAlreadyExists)
    }

    /// Returns true if the error comes from malformed persisted or wire data.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            StorageError::Encoding(_) | StorageError::UnsupportedVersion { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
