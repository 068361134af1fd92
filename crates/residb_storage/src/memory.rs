//! In-memory blob store for testing.

use crate::backend::{validate_blob_name, BlobStore};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory blob store.
///
/// This store keeps all blobs in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use residb_storage::{BlobStore, InMemoryBlobStore};
///
/// let store = InMemoryBlobStore::new();
/// store.write("a.json", b"[1]").unwrap();
/// assert!(store.exists("a.json").unwrap());
/// assert_eq!(store.write_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl InMemoryBlobStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with pre-existing blobs.
    ///
    /// Useful for testing load scenarios.
    #[must_use]
    pub fn with_blobs<I>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        Self {
            blobs: RwLock::new(blobs.into_iter().collect()),
            writes: AtomicU64::new(0),
        }
    }

    /// Returns the total number of successful writes.
    ///
    /// Useful for asserting how often a blob was flushed.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Removes all blobs.
    pub fn clear(&self) {
        self.blobs.write().clear();
    }
}

impl BlobStore for InMemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_blob_name(name)?;
        Ok(self.blobs.read().get(name).cloned())
    }

    fn write(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_blob_name(name)?;
        self.blobs.write().insert(name.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        validate_blob_name(name)?;
        Ok(self.blobs.write().remove(name).is_some())
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        validate_blob_name(name)?;
        Ok(self.blobs.read().contains_key(name))
    }
}
