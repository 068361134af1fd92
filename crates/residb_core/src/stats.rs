//! Store statistics.
//!
//! Counters are atomic and updated without taking any lock, so they are
//! best-effort: a snapshot taken during a burst of writes may be slightly
//! behind.
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("inserts: {}", stats.inserts);
//! for index in &stats.indexes {
//!     println!("{}.{}: {} keys", index.record_type, index.property, index.keys);
//! }
//! ```

use crate::index::IndexStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live operation counters.
#[derive(Debug, Default)]
pub struct StoreStats {
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    lookups: AtomicU64,
    constraint_violations: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    records_loaded: AtomicU64,
    records_skipped: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&self, count: u64) {
        self.inserts.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_constraint_violation(&self) {
        self.constraint_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_loaded(&self, count: u64) {
        self.records_loaded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records inserted.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Records updated.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Records deleted.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Index and identity lookups served.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Writes rejected by a uniqueness constraint.
    pub fn constraint_violations(&self) -> u64 {
        self.constraint_violations.load(Ordering::Relaxed)
    }

    /// Successful flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Failed flushes.
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    /// Records restored from blobs.
    pub fn records_loaded(&self) -> u64 {
        self.records_loaded.load(Ordering::Relaxed)
    }

    /// Stored records dropped while loading.
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped.load(Ordering::Relaxed)
    }

    /// Copies the counters and attaches index statistics.
    pub fn snapshot(&self, indexes: Vec<IndexStats>) -> StatsSnapshot {
        let approx_memory_bytes = indexes.iter().map(|i| i.approx_bytes).sum();
        StatsSnapshot {
            inserts: self.inserts(),
            updates: self.updates(),
            deletes: self.deletes(),
            lookups: self.lookups(),
            constraint_violations: self.constraint_violations(),
            flushes: self.flushes(),
            flush_failures: self.flush_failures(),
            records_loaded: self.records_loaded(),
            records_skipped: self.records_skipped(),
            index_count: indexes.len(),
            approx_memory_bytes,
            indexes,
        }
    }
}

/// A point-in-time copy of the store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records inserted.
    pub inserts: u64,
    /// Records updated.
    pub updates: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Lookups served.
    pub lookups: u64,
    /// Writes rejected by a uniqueness constraint.
    pub constraint_violations: u64,
    /// Successful flushes.
    pub flushes: u64,
    /// Failed flushes.
    pub flush_failures: u64,
    /// Records restored from blobs.
    pub records_loaded: u64,
    /// Stored records dropped while loading.
    pub records_skipped: u64,
    /// One entry per (type, property) index, sorted.
    pub indexes: Vec<IndexStats>,
    /// Number of property indexes.
    pub index_count: usize,
    /// Sum of the indexes' approximate heap usage.
    pub approx_memory_bytes: usize,
}
