//! Per-type identity allocation.

use crate::error::{CoreError, CoreResult};
use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues monotonically increasing identities, one counter per record type.
///
/// Counters are atomics, so allocation never waits on a type lock.
/// Identities are never handed out twice, even after deletes or clears.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl IdentityAllocator {
    /// Creates an allocator with no counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, record_type: &str) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.read().get(record_type) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write();
        Arc::clone(counters.entry(record_type.to_string()).or_default())
    }

    /// Returns the next identity for `record_type`, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] once the counter has reached
    /// `u64::MAX`, which an explicit or loaded identity can cause.
    pub fn next(&self, record_type: &str) -> CoreResult<RecordId> {
        self.counter(record_type)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|previous| RecordId(previous + 1))
            .map_err(|_| {
                CoreError::invalid_operation(format!("identities of {record_type} are exhausted"))
            })
    }

    /// Raises the counter so later identities are greater than `id`.
    pub fn observe(&self, record_type: &str, id: RecordId) {
        self.counter(record_type)
            .fetch_max(id.as_u64(), Ordering::SeqCst);
    }

    /// The last identity issued or observed, `0` if none.
    pub fn current(&self, record_type: &str) -> u64 {
        self.counters
            .read()
            .get(record_type)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}
