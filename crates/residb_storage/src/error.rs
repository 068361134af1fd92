//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the storage directory lock.
    #[error("storage directory is locked by another process: {path}")]
    Locked {
        /// The locked directory.
        path: String,
    },

    /// The blob name cannot be used as a storage key.
    #[error("invalid blob name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The storage location is not usable.
    #[error("invalid storage location: {0}")]
    InvalidLocation(String),
}
