//! The object table: record type to (identity to record).
//!
//! The table is the source of truth for which records exist. Each type has
//! its own map behind a `RwLock`, so readers of one type never block
//! writers of another, and a reader only holds a guard long enough to
//! clone an `Arc`.

use crate::record::Record;
use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type Rows = RwLock<HashMap<RecordId, Arc<Record>>>;

/// Canonical in-memory record storage.
#[derive(Debug, Default)]
pub struct ObjectTable {
    types: RwLock<HashMap<String, Arc<Rows>>>,
}

impl ObjectTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self, record_type: &str) -> Option<Arc<Rows>> {
        self.types.read().get(record_type).map(Arc::clone)
    }

    fn rows_or_create(&self, record_type: &str) -> Arc<Rows> {
        if let Some(rows) = self.rows(record_type) {
            return rows;
        }
        Arc::clone(
            self.types
                .write()
                .entry(record_type.to_string())
                .or_default(),
        )
    }

    /// Stores `record` under its identity and returns that identity.
    pub fn insert(&self, record_type: &str, record: Arc<Record>) -> RecordId {
        let id = record.id;
        self.rows_or_create(record_type).write().insert(id, record);
        id
    }

    /// Returns the record with `id`.
    pub fn get(&self, record_type: &str, id: RecordId) -> Option<Arc<Record>> {
        self.rows(record_type)?.read().get(&id).map(Arc::clone)
    }

    /// Returns true if a record with `id` exists.
    pub fn contains(&self, record_type: &str, id: RecordId) -> bool {
        self.rows(record_type)
            .is_some_and(|rows| rows.read().contains_key(&id))
    }

    /// Point-in-time copy of every record of the type, ordered by identity.
    pub fn all(&self, record_type: &str) -> Vec<Arc<Record>> {
        let Some(rows) = self.rows(record_type) else {
            return Vec::new();
        };
        let mut records: Vec<_> = rows.read().values().map(Arc::clone).collect();
        records.sort_unstable_by_key(|r| r.id);
        records
    }

    /// Removes a record. Returns false if it did not exist.
    pub fn remove(&self, record_type: &str, id: RecordId) -> bool {
        self.take(record_type, id).is_some()
    }

    /// Removes a record and returns it.
    pub fn take(&self, record_type: &str, id: RecordId) -> Option<Arc<Record>> {
        self.rows(record_type)?.write().remove(&id)
    }

    /// Replaces the record stored under `id`, returning the previous one.
    pub fn replace(
        &self,
        record_type: &str,
        id: RecordId,
        record: Arc<Record>,
    ) -> Option<Arc<Record>> {
        self.rows_or_create(record_type).write().insert(id, record)
    }

    /// Number of records of the type.
    pub fn len(&self, record_type: &str) -> usize {
        self.rows(record_type).map_or(0, |rows| rows.read().len())
    }

    /// Returns true if the type holds no records.
    pub fn is_empty(&self, record_type: &str) -> bool {
        self.len(record_type) == 0
    }

    /// Drops every record of the type.
    pub fn clear(&self, record_type: &str) {
        if let Some(rows) = self.rows(record_type) {
            rows.write().clear();
        }
    }
}
