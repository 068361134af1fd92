//! Blob store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable, named blob store for ResiDB.
///
/// Blob stores are **opaque byte stores** keyed by name. Every write
/// replaces the whole blob; there is no partial update or append. ResiDB
/// owns the format of every blob it writes.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write`
/// - a `write` is all-or-nothing: readers never observe a torn blob
/// - stores must be `Send + Sync` so that different blobs can be written
///   from different threads at the same time
///
/// # Implementors
///
/// - [`super::InMemoryBlobStore`] - For testing
/// - [`super::FileBlobStore`] - For persistent storage
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `name`.
    ///
    /// Returns `Ok(None)` if no blob with that name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the blob stored under `name` with `data`.
    ///
    /// After this returns successfully the data survives process termination
    /// (for durable implementations).
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn write(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Deletes the blob stored under `name`.
    ///
    /// Returns `true` if a blob was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn delete(&self, name: &str) -> StorageResult<bool>;

    /// Lists the names of all stored blobs, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be produced.
    fn names(&self) -> StorageResult<Vec<String>>;

    /// Returns true if a blob with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.read(name)?.is_some())
    }
}

/// Checks that `name` is usable as a flat blob name.
///
/// Names must be non-empty, must not start with `.`, and may not contain
/// path separators or control characters.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] if the name is rejected.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    let rejected = name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control());

    if rejected {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
