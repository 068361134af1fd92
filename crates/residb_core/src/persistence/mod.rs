//! Asynchronous persistence of record types to the blob store.
//!
//! Writers only flip a per-type state flag; snapshots are taken, encoded
//! and written by background threads (or by an explicit flush), never
//! while a writer holds the type's lock.

mod engine;
mod snapshot;
mod state;

pub use engine::PersistenceEngine;
pub use snapshot::{blob_name, decode_snapshot, encode_snapshot, DecodedSnapshot, BLOB_SUFFIX};
pub use state::PersistenceState;

use crate::error::CoreResult;
use crate::record::Record;
use crate::schema::TypeSchema;
use std::sync::Arc;

/// Provides consistent copies of a record type for flushing.
pub trait SnapshotSource: Send + Sync {
    /// Returns the type's schema and every record it holds, copied at a
    /// single point in time.
    ///
    /// # Errors
    ///
    /// Fails if the type is unknown.
    fn snapshot(&self, record_type: &str) -> CoreResult<(Arc<TypeSchema>, Vec<Arc<Record>>)>;
}
