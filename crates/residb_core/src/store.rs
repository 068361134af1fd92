//! The store facade.
//!
//! A [`Store`] ties the object table, indexes, uniqueness constraints,
//! identity counters and persistence engine together. It is cheap to clone;
//! clones share the same state.
//!
//! # Opening a Store
//!
//! ```rust,ignore
//! use residb_core::{Config, Record, Store};
//! use std::path::Path;
//!
//! let store = Store::open_dir(Path::new("data"), Config::default())?;
//! store.register(user_schema())?;
//!
//! let id = store.insert("User", Record::new().with("username", "alice"))?;
//! let found = store.exact("User", "username", "alice")?;
//!
//! store.close()?;
//! ```
//!
//! # Write path
//!
//! Every mutation of a type runs under that type's exclusive lock, in this
//! order: schema normalization, uniqueness validation, identity
//! allocation, table commit, index update, uniqueness commit. The
//! persistence engine is notified after the lock is released. Readers take
//! no type lock.

use crate::collection::{Collection, Entity};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityAllocator;
use crate::index::{CalendarBucket, IndexManager};
use crate::persistence::{
    blob_name, decode_snapshot, PersistenceEngine, PersistenceState, SnapshotSource,
};
use crate::query::{Query, QueryEngine};
use crate::record::Record;
use crate::registry::{TypeEntry, TypeRegistry};
use crate::schema::TypeSchema;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::table::ObjectTable;
use crate::types::RecordId;
use crate::unique::UniquenessManager;
use parking_lot::MutexGuard;
use residb_codec::Value;
use residb_storage::{BlobStore, FileBlobStore, InMemoryBlobStore};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared by every clone of a store and by the flush threads.
pub(crate) struct StoreState {
    config: Config,
    registry: TypeRegistry,
    table: ObjectTable,
    indexes: IndexManager,
    uniqueness: UniquenessManager,
    identity: IdentityAllocator,
    stats: Arc<StoreStats>,
    blobs: Arc<dyn BlobStore>,
    closed: AtomicBool,
}

impl SnapshotSource for StoreState {
    fn snapshot(&self, record_type: &str) -> CoreResult<(Arc<TypeSchema>, Vec<Arc<Record>>)> {
        let entry = self.registry.get(record_type)?;
        let _guard = entry.write_lock.lock();
        if !entry.is_loaded() {
            return Err(CoreError::invalid_operation(format!(
                "{record_type} has not been loaded"
            )));
        }
        Ok((Arc::clone(&entry.schema), self.table.all(record_type)))
    }
}

impl StoreState {
    fn query_engine(&self) -> QueryEngine<'_> {
        QueryEngine {
            indexes: &self.indexes,
            table: &self.table,
        }
    }

    fn loads_from_blobs(&self, schema: &TypeSchema) -> bool {
        self.config.persistence_enabled && schema.persistent
    }

    /// Takes the type lock, loading the type first if needed.
    fn lock_type<'a>(&self, entry: &'a TypeEntry) -> CoreResult<MutexGuard<'a, ()>> {
        let guard = entry.write_lock.lock();
        if !entry.is_loaded() {
            self.load(entry)?;
        }
        Ok(guard)
    }

    fn ensure_loaded(&self, entry: &TypeEntry) -> CoreResult<()> {
        if !entry.is_loaded() {
            drop(self.lock_type(entry)?);
        }
        Ok(())
    }

    /// Restores a type from its blob. Called with the type lock held.
    ///
    /// A storage error leaves the type unloaded so the next access retries.
    /// A blob that is not a JSON array leaves the type empty.
    fn load(&self, entry: &TypeEntry) -> CoreResult<()> {
        let schema = &entry.schema;
        let record_type = schema.name.as_str();
        if !self.loads_from_blobs(schema) {
            entry.mark_loaded();
            return Ok(());
        }

        let Some(bytes) = self.blobs.read(&blob_name(record_type))? else {
            debug!(record_type, "no stored records");
            entry.mark_loaded();
            return Ok(());
        };

        let decoded = match decode_snapshot(schema, &bytes) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(record_type, error = %error, "stored records are unreadable, starting empty");
                entry.mark_loaded();
                return Ok(());
            }
        };
        for _ in 0..decoded.skipped {
            self.stats.record_skipped();
        }

        let mut loaded = 0u64;
        let mut max_id = RecordId::UNASSIGNED;
        for record in decoded.records {
            if self.table.contains(record_type, record.id) {
                warn!(record_type, id = record.id.as_u64(), "skipping duplicate identity");
                self.stats.record_skipped();
                continue;
            }
            if let Err(error) = self.uniqueness.validate(schema, &record, None) {
                warn!(record_type, id = record.id.as_u64(), error = %error, "skipping record");
                self.stats.record_skipped();
                continue;
            }
            max_id = max_id.max(record.id);
            let record = Arc::new(record);
            self.table.insert(record_type, Arc::clone(&record));
            self.indexes.add(record_type, &record)?;
            self.uniqueness.commit_insert(schema, &record);
            loaded += 1;
        }

        self.identity.observe(record_type, max_id);
        self.stats.record_loaded(loaded);
        entry.mark_loaded();
        info!(
            record_type,
            records = loaded,
            skipped = decoded.skipped,
            bytes = bytes.len(),
            "loaded"
        );
        Ok(())
    }
}

/// Coerces every declared property to its kind. Absent properties become
/// null; undeclared ones are rejected.
fn normalize(schema: &TypeSchema, record: Record) -> CoreResult<Record> {
    let Record { id, mut fields } = record;
    if let Some(unknown) = fields.keys().find(|name| schema.property_def(name).is_none()) {
        return Err(CoreError::unknown_property(&schema.name, unknown.as_str()));
    }

    let mut normalized = BTreeMap::new();
    for def in &schema.properties {
        let value = fields.remove(&def.name).unwrap_or(Value::Null);
        let value = def
            .kind
            .coerce(value)
            .map_err(|e| CoreError::from_coercion(&schema.name, &def.name, e))?;
        normalized.insert(def.name.clone(), value);
    }
    Ok(Record {
        id,
        fields: normalized,
    })
}

struct StoreInner {
    state: Arc<StoreState>,
    /// `None` when persistence is disabled.
    persistence: Option<PersistenceEngine>,
}

/// An embedded, memory-resident object store.
///
/// Records are grouped by record type. Each type must be registered with a
/// [`TypeSchema`] before use; the first access to a registered type loads
/// its stored records.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.state.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens a store over any blob store.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush threads cannot be started.
    pub fn open(config: Config, blobs: Arc<dyn BlobStore>) -> CoreResult<Self> {
        let stats = Arc::new(StoreStats::new());
        let state = Arc::new(StoreState {
            config: config.clone(),
            registry: TypeRegistry::default(),
            table: ObjectTable::new(),
            indexes: IndexManager::new(),
            uniqueness: UniquenessManager::new(),
            identity: IdentityAllocator::new(),
            stats: Arc::clone(&stats),
            blobs: Arc::clone(&blobs),
            closed: AtomicBool::new(false),
        });

        let persistence = if config.persistence_enabled {
            let source: Arc<dyn SnapshotSource> = state.clone();
            Some(PersistenceEngine::start(&config, source, blobs, stats)?)
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(StoreInner { state, persistence }),
        })
    }

    /// Opens (or creates) a store persisted in a directory.
    ///
    /// # Errors
    ///
    /// Returns [`residb_storage::StorageError::Locked`] (wrapped) if another
    /// process has the directory open.
    pub fn open_dir(path: &Path, config: Config) -> CoreResult<Self> {
        let blobs = FileBlobStore::open(path)?;
        info!(path = %path.display(), "opening store");
        Self::open(config, Arc::new(blobs))
    }

    /// Opens a store whose blobs live in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush threads cannot be started.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(Config::default(), Arc::new(InMemoryBlobStore::new()))
    }

    fn state(&self) -> &StoreState {
        &self.inner.state
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.state().closed.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    fn entry(&self, record_type: &str) -> CoreResult<Arc<TypeEntry>> {
        self.check_open()?;
        self.state().registry.get(record_type)
    }

    /// Resolves a type for reading, loading it if needed.
    fn readable(&self, record_type: &str) -> CoreResult<Arc<TypeEntry>> {
        let entry = self.entry(record_type)?;
        self.state().ensure_loaded(&entry)?;
        self.state().stats.record_lookup();
        Ok(entry)
    }

    fn notify_persistence(&self, schema: &TypeSchema) {
        if !schema.persistent {
            return;
        }
        if let Some(engine) = &self.inner.persistence {
            engine.mark_dirty(&schema.name);
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.state().config
    }

    /// Registers a record type.
    ///
    /// Registering an identical schema again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] if the schema is inconsistent or
    /// the name is taken by a different schema.
    pub fn register(&self, schema: TypeSchema) -> CoreResult<()> {
        self.check_open()?;
        let state = self.state();
        // Indexes exist before the type becomes visible to writers.
        state
            .registry
            .register(schema, |schema| state.indexes.register(Arc::clone(schema)))?;
        Ok(())
    }

    /// Returns the schema of a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] if the type is not registered.
    pub fn schema(&self, record_type: &str) -> CoreResult<Arc<TypeSchema>> {
        Ok(Arc::clone(&self.entry(record_type)?.schema))
    }

    /// Names of all registered types, sorted.
    pub fn record_types(&self) -> Vec<String> {
        self.state()
            .registry
            .entries()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Registers `T` and returns a typed handle to its records.
    ///
    /// # Errors
    ///
    /// Fails like [`register`](Self::register).
    pub fn collection<T: Entity>(&self) -> CoreResult<Collection<T>> {
        let schema = T::schema();
        let name = schema.name.clone();
        self.register(schema)?;
        Ok(Collection::new(self.clone(), name))
    }

    // === Writes ===

    /// Inserts a record and returns its identity.
    ///
    /// An unassigned record gets the type's next identity. A record that
    /// already carries an identity keeps it, provided no record holds it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownProperty`] / [`CoreError::TypeMismatch`] if the
    ///   record does not fit the schema
    /// - [`CoreError::ConstraintViolation`] if a uniqueness rule is broken
    /// - [`CoreError::InvalidOperation`] if the given identity is taken
    ///
    /// Nothing is modified when an error is returned.
    pub fn insert(&self, record_type: &str, record: Record) -> CoreResult<RecordId> {
        let entry = self.entry(record_type)?;
        let schema = Arc::clone(&entry.schema);
        let state = self.state();
        let mut record = normalize(&schema, record)?;

        let id = {
            let _guard = state.lock_type(&entry)?;

            if record.id.is_assigned() && state.table.contains(record_type, record.id) {
                return Err(CoreError::invalid_operation(format!(
                    "{record_type} {} already exists",
                    record.id
                )));
            }
            if let Err(error) = state.uniqueness.validate(&schema, &record, None) {
                state.stats.record_constraint_violation();
                return Err(error);
            }

            if record.id.is_assigned() {
                state.identity.observe(record_type, record.id);
            } else {
                record.id = state.identity.next(record_type)?;
            }

            let record = Arc::new(record);
            state.indexes.add(record_type, &record)?;
            state.table.insert(record_type, Arc::clone(&record));
            state.uniqueness.commit_insert(&schema, &record);
            record.id
        };

        state.stats.record_insert(1);
        self.notify_persistence(&schema);
        Ok(id)
    }

    /// Inserts several records, all or nothing.
    ///
    /// Uniqueness is checked against stored records and within the batch
    /// before anything is written.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert); on error no record is inserted.
    pub fn insert_batch(&self, record_type: &str, records: Vec<Record>) -> CoreResult<Vec<RecordId>> {
        let entry = self.entry(record_type)?;
        let schema = Arc::clone(&entry.schema);
        let state = self.state();
        let records = records
            .into_iter()
            .map(|r| normalize(&schema, r))
            .collect::<CoreResult<Vec<_>>>()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(records.len());
        {
            let _guard = state.lock_type(&entry)?;

            let mut explicit = HashSet::new();
            for record in records.iter().filter(|r| r.id.is_assigned()) {
                if !explicit.insert(record.id) || state.table.contains(record_type, record.id) {
                    return Err(CoreError::invalid_operation(format!(
                        "{record_type} {} already exists",
                        record.id
                    )));
                }
            }
            if let Err(error) = state.uniqueness.validate_batch(&schema, &records) {
                state.stats.record_constraint_violation();
                return Err(error);
            }

            let mut records = records;
            for record in &mut records {
                if record.id.is_assigned() {
                    state.identity.observe(record_type, record.id);
                } else {
                    record.id = state.identity.next(record_type)?;
                }
            }

            for record in records {
                let record = Arc::new(record);
                state.indexes.add(record_type, &record)?;
                state.table.insert(record_type, Arc::clone(&record));
                state.uniqueness.commit_insert(&schema, &record);
                ids.push(record.id);
            }
        }

        state.stats.record_insert(ids.len() as u64);
        self.notify_persistence(&schema);
        Ok(ids)
    }

    /// Replaces the record with `record.id`.
    ///
    /// Returns the previous version, or `None` if no record has that
    /// identity (nothing is inserted in that case).
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert); a record without an identity is an
    /// [`CoreError::InvalidOperation`].
    pub fn update(&self, record_type: &str, record: Record) -> CoreResult<Option<Arc<Record>>> {
        let entry = self.entry(record_type)?;
        let schema = Arc::clone(&entry.schema);
        let state = self.state();
        if !record.id.is_assigned() {
            return Err(CoreError::invalid_operation(
                "cannot update a record without an identity",
            ));
        }
        let record = Arc::new(normalize(&schema, record)?);

        let previous = {
            let _guard = state.lock_type(&entry)?;

            let Some(previous) = state.table.get(record_type, record.id) else {
                return Ok(None);
            };
            if let Err(error) = state.uniqueness.validate(&schema, &record, Some(record.id)) {
                state.stats.record_constraint_violation();
                return Err(error);
            }

            state.indexes.update(record_type, &previous, &record)?;
            state
                .table
                .replace(record_type, record.id, Arc::clone(&record));
            state.uniqueness.commit_remove(&schema, &previous);
            state.uniqueness.commit_insert(&schema, &record);
            previous
        };

        state.stats.record_update();
        self.notify_persistence(&schema);
        Ok(Some(previous))
    }

    /// Deletes a record, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] or [`CoreError::Closed`].
    pub fn delete(&self, record_type: &str, id: RecordId) -> CoreResult<Option<Arc<Record>>> {
        let entry = self.entry(record_type)?;
        let schema = Arc::clone(&entry.schema);
        let state = self.state();

        let removed = {
            let _guard = state.lock_type(&entry)?;
            let Some(removed) = state.table.get(record_type, id) else {
                return Ok(None);
            };
            state.indexes.remove(record_type, &removed)?;
            state.table.take(record_type, id);
            state.uniqueness.commit_remove(&schema, &removed);
            removed
        };

        state.stats.record_delete();
        self.notify_persistence(&schema);
        Ok(Some(removed))
    }

    /// Drops every in-memory record of a type. Stored blobs are untouched
    /// and identities are not reused.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] or [`CoreError::Closed`].
    pub fn clear(&self, record_type: &str) -> CoreResult<()> {
        let entry = self.entry(record_type)?;
        let state = self.state();
        let _guard = state.lock_type(&entry)?;
        state.table.clear(record_type);
        state.indexes.clear_type(record_type);
        state.uniqueness.clear_type(record_type);
        debug!(record_type, "cleared");
        Ok(())
    }

    /// [`clear`](Self::clear) for every registered type.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn clear_all(&self) -> CoreResult<()> {
        for entry in self.state().registry.entries() {
            self.clear(entry.name())?;
        }
        Ok(())
    }

    // === Reads ===

    /// Returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`], [`CoreError::Closed`] or a load
    /// error.
    pub fn get(&self, record_type: &str, id: RecordId) -> CoreResult<Option<Arc<Record>>> {
        self.readable(record_type)?;
        Ok(self.state().table.get(record_type, id))
    }

    /// Returns the records for `ids`, in the given order, skipping
    /// identities that do not exist and repeats.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub fn get_many(&self, record_type: &str, ids: &[RecordId]) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        Ok(self.state().query_engine().fetch(record_type, ids))
    }

    /// Every record of the type, ordered by identity.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub fn all(&self, record_type: &str) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        Ok(self.state().table.all(record_type))
    }

    /// Number of records of the type.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub fn count(&self, record_type: &str) -> CoreResult<usize> {
        self.readable(record_type)?;
        Ok(self.state().table.len(record_type))
    }

    /// Records whose `property` equals `value`. Text comparison is
    /// case-sensitive; numbers compare by value.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownProperty`], [`CoreError::NotIndexed`] or
    /// [`CoreError::TypeMismatch`] if the lookup does not fit the schema.
    pub fn exact(
        &self,
        record_type: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        self.state()
            .query_engine()
            .exact(record_type, property, &value.into())
    }

    /// Case-insensitive [`exact`](Self::exact) for text properties.
    ///
    /// # Errors
    ///
    /// As for [`exact`](Self::exact).
    pub fn exact_ignore_case(
        &self,
        record_type: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        let state = self.state();
        let ids = state
            .indexes
            .exact_ignore_case(record_type, property, &value.into())?;
        Ok(state.query_engine().resolve(record_type, ids))
    }

    /// Records whose `property` lies in `[min, max]`. Pass [`Value::Null`]
    /// for an open bound.
    ///
    /// # Errors
    ///
    /// As for [`exact`](Self::exact).
    pub fn range(
        &self,
        record_type: &str,
        property: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        self.state()
            .query_engine()
            .range(record_type, property, &min.into(), &max.into())
    }

    /// Records whose `property` matches a `*` wildcard pattern,
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// As for [`exact`](Self::exact).
    pub fn pattern(
        &self,
        record_type: &str,
        property: &str,
        pattern: &str,
    ) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        self.state()
            .query_engine()
            .pattern(record_type, property, pattern)
    }

    /// Records whose temporal `property` falls in a calendar bucket.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidOperation`] if the property is not temporal,
    /// otherwise as for [`exact`](Self::exact).
    pub fn calendar(
        &self,
        record_type: &str,
        property: &str,
        bucket: CalendarBucket,
    ) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        let state = self.state();
        let ids = state.indexes.calendar(record_type, property, bucket)?;
        Ok(state.query_engine().resolve(record_type, ids))
    }

    /// Records matching every predicate of `query`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidOperation`] for an empty query, otherwise as for
    /// [`exact`](Self::exact).
    pub fn query(&self, record_type: &str, query: &Query) -> CoreResult<Vec<Arc<Record>>> {
        self.readable(record_type)?;
        self.state().query_engine().query(record_type, query)
    }

    /// The record holding `value` under the unique constraint on `property`.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub fn find_unique(
        &self,
        record_type: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Option<Arc<Record>>> {
        let entry = self.readable(record_type)?;
        let Some(def) = entry.schema.property_def(property) else {
            return Err(CoreError::unknown_property(record_type, property));
        };
        let value = def
            .kind
            .coerce(value.into())
            .map_err(|e| CoreError::from_coercion(record_type, property, e))?;
        let state = self.state();
        Ok(state
            .uniqueness
            .lookup(record_type, property, &value)
            .and_then(|id| state.table.get(record_type, id)))
    }

    /// The record holding `values` under the composite group `group`.
    ///
    /// Values are given in the group's property order and coerced by each
    /// property's kind.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidOperation`] for an unknown group or a tuple of
    /// the wrong length, [`CoreError::TypeMismatch`] for a value that does
    /// not fit, otherwise as for [`get`](Self::get).
    pub fn find_unique_composite(
        &self,
        record_type: &str,
        group: &str,
        values: Vec<Value>,
    ) -> CoreResult<Option<Arc<Record>>> {
        let entry = self.readable(record_type)?;
        let schema = &entry.schema;
        let Some(composite) = schema.composite.iter().find(|g| g.name == group) else {
            return Err(CoreError::invalid_operation(format!(
                "{record_type} has no composite group {group}"
            )));
        };
        if values.len() != composite.properties.len() {
            return Err(CoreError::invalid_operation(format!(
                "{group} takes {} values, got {}",
                composite.properties.len(),
                values.len()
            )));
        }

        let mut tuple = Vec::with_capacity(values.len());
        for (property, value) in composite.properties.iter().zip(values) {
            let Some(def) = schema.property_def(property) else {
                return Err(CoreError::unknown_property(record_type, property));
            };
            let value = def
                .kind
                .coerce(value)
                .map_err(|e| CoreError::from_coercion(record_type, property, e))?;
            tuple.push(value);
        }

        let state = self.state();
        Ok(state
            .uniqueness
            .lookup_composite(record_type, group, &tuple)
            .and_then(|id| state.table.get(record_type, id)))
    }

    /// Returns true if any index of the type still refers to `id`.
    pub fn index_references(&self, record_type: &str, id: RecordId) -> bool {
        self.state().indexes.references(record_type, id)
    }

    // === Persistence and lifecycle ===

    /// Writes a snapshot of the type now.
    ///
    /// Does nothing for memory-only types or when persistence is disabled.
    ///
    /// # Errors
    ///
    /// Returns the load, encoding or storage error.
    pub fn flush(&self, record_type: &str) -> CoreResult<()> {
        let entry = self.entry(record_type)?;
        let Some(engine) = &self.inner.persistence else {
            return Ok(());
        };
        if !entry.schema.persistent {
            return Ok(());
        }
        self.state().ensure_loaded(&entry)?;
        engine.flush(record_type)
    }

    /// Flushes every type with unsaved changes.
    ///
    /// # Errors
    ///
    /// Attempts every type, then returns the first error.
    pub fn flush_all(&self) -> CoreResult<()> {
        self.check_open()?;
        match &self.inner.persistence {
            Some(engine) => engine.flush_all(),
            None => Ok(()),
        }
    }

    /// Flush state of a type. Always `Clean` without persistence.
    pub fn persistence_state(&self, record_type: &str) -> PersistenceState {
        self.inner
            .persistence
            .as_ref()
            .map_or(PersistenceState::Clean, |e| e.state(record_type))
    }

    /// Closes the store: pending changes are flushed (unless disabled in
    /// the config) and the flush threads stop. Every later operation on
    /// any clone returns [`CoreError::Closed`]. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first flush error; the store is closed regardless.
    pub fn close(&self) -> CoreResult<()> {
        if self.state().closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("closing store");
        match &self.inner.persistence {
            Some(engine) => engine.close(),
            None => Ok(()),
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed.load(Ordering::Acquire)
    }

    /// Counters plus per-index statistics.
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.state();
        state.stats.snapshot(state.indexes.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompositeUnique, PropertyDef, UniqueConstraint};
    use residb_codec::PropertyKind;
    use std::time::Duration;

    fn user_schema() -> TypeSchema {
        TypeSchema::new("User")
            .property(PropertyDef::new("username", PropertyKind::Text))
            .property(PropertyDef::new("age", PropertyKind::Numeric))
            .property(PropertyDef::new("active", PropertyKind::Boolean))
            .property(PropertyDef::new("bio", PropertyKind::Text).not_indexed())
            .unique(UniqueConstraint::new("username"))
    }

    fn store() -> Store {
        let store = Store::open(
            Config::new().persistence_enabled(false),
            Arc::new(InMemoryBlobStore::new()),
        )
        .unwrap();
        store.register(user_schema()).unwrap();
        store
    }

    fn user(name: &str, age: i64) -> Record {
        Record::new().with("username", name).with("age", age)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let store = store();
        assert_eq!(store.insert("User", user("a", 1)).unwrap(), RecordId(1));
        assert_eq!(store.insert("User", user("b", 2)).unwrap(), RecordId(2));
        assert_eq!(store.count("User").unwrap(), 2);

        let a = store.get("User", RecordId(1)).unwrap().unwrap();
        assert_eq!(a.get("username"), &Value::from("a"));
        // Missing properties are stored as null.
        assert_eq!(a.get("bio"), &Value::Null);
    }

    #[test]
    fn insert_normalizes_and_validates() {
        let store = store();
        let id = store
            .insert(
                "User",
                Record::new()
                    .with("username", "a")
                    .with("age", "42")
                    .with("active", "yes"),
            )
            .unwrap();
        let record = store.get("User", id).unwrap().unwrap();
        assert_eq!(record.get("age"), &Value::Integer(42));
        assert_eq!(record.get("active"), &Value::Bool(true));

        assert!(matches!(
            store.insert("User", Record::new().with("nickname", "x")),
            Err(CoreError::UnknownProperty { .. })
        ));
        assert!(matches!(
            store.insert("User", Record::new().with("age", "old")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.insert("Ghost", Record::new()),
            Err(CoreError::UnknownType { .. })
        ));
        assert_eq!(store.count("User").unwrap(), 1);
    }

    #[test]
    fn explicit_identity() {
        let store = store();
        let id = store
            .insert("User", user("a", 1).with_id(RecordId(10)))
            .unwrap();
        assert_eq!(id, RecordId(10));
        assert_eq!(store.insert("User", user("b", 1)).unwrap(), RecordId(11));
        assert!(matches!(
            store.insert("User", user("c", 1).with_id(RecordId(10))),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn identity_at_the_top_of_the_range_exhausts_the_type() {
        let store = store();
        store
            .insert("User", user("a", 1).with_id(RecordId(u64::MAX)))
            .unwrap();
        assert!(matches!(
            store.insert("User", user("b", 1)),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            store.insert_batch("User", vec![user("c", 1), user("d", 1)]),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(store.count("User").unwrap(), 1);
        assert!(store.get("User", RecordId(0)).unwrap().is_none());
        assert!(store.find_unique("User", "username", "b").unwrap().is_none());

        // A loaded identity has the same effect.
        let blobs = Arc::new(InMemoryBlobStore::with_blobs([(
            "User.json".to_string(),
            format!(r#"[{{"id": {}, "username": "x", "age": 1}}]"#, u64::MAX).into_bytes(),
        )]));
        let reloaded = Store::open(Config::default(), blobs).unwrap();
        reloaded.register(user_schema()).unwrap();
        assert_eq!(reloaded.count("User").unwrap(), 1);
        assert!(reloaded.insert("User", user("y", 1)).is_err());
        assert_eq!(reloaded.count("User").unwrap(), 1);
        reloaded.close().unwrap();
    }

    #[test]
    fn violation_leaves_no_trace() {
        let store = store();
        store.insert("User", user("a", 25)).unwrap();
        let err = store.insert("User", user("a", 40)).unwrap_err();
        assert!(err.is_constraint_violation());

        assert_eq!(store.count("User").unwrap(), 1);
        assert!(store.exact("User", "age", 40).unwrap().is_empty());
        assert_eq!(store.stats().constraint_violations, 1);
        // The failed insert did not consume an identity.
        assert_eq!(store.insert("User", user("b", 1)).unwrap(), RecordId(2));
    }

    #[test]
    fn update_moves_indexes_and_constraints() {
        let store = store();
        let id = store.insert("User", user("a", 25)).unwrap();
        store.insert("User", user("b", 30)).unwrap();

        let previous = store
            .update("User", user("c", 26).with_id(id))
            .unwrap()
            .unwrap();
        assert_eq!(previous.get("username"), &Value::from("a"));

        assert!(store.exact("User", "username", "a").unwrap().is_empty());
        assert_eq!(store.exact("User", "age", 26).unwrap()[0].id, id);
        // "a" is free again, "b" is not.
        store.insert("User", user("a", 1)).unwrap();
        assert!(store
            .update("User", user("b", 1).with_id(id))
            .unwrap_err()
            .is_constraint_violation());

        assert_eq!(store.update("User", user("z", 1).with_id(RecordId(99))).unwrap(), None);
        assert!(store.update("User", user("z", 1)).is_err());
    }

    #[test]
    fn delete_clears_every_structure() {
        let store = store();
        let id = store.insert("User", user("a", 25)).unwrap();
        let removed = store.delete("User", id).unwrap().unwrap();
        assert_eq!(removed.id, id);

        assert!(store.get("User", id).unwrap().is_none());
        assert!(!store.index_references("User", id));
        assert!(store.find_unique("User", "username", "a").unwrap().is_none());
        assert!(store.delete("User", id).unwrap().is_none());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = store();
        store.insert("User", user("a", 1)).unwrap();

        let err = store
            .insert_batch("User", vec![user("b", 2), user("a", 3)])
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(store.count("User").unwrap(), 1);

        let err = store
            .insert_batch("User", vec![user("c", 2), user("c", 3)])
            .unwrap_err();
        assert!(err.is_constraint_violation());

        let ids = store
            .insert_batch("User", vec![user("b", 2), user("c", 3)])
            .unwrap();
        assert_eq!(ids, vec![RecordId(2), RecordId(3)]);
        assert!(store.insert_batch("User", Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn reads() {
        let store = store();
        for (name, age) in [("alice", 25), ("Alfred", 30), ("bob", 35)] {
            store.insert("User", user(name, age)).unwrap();
        }

        let names = |records: Vec<Arc<Record>>| -> Vec<String> {
            records
                .iter()
                .map(|r| r.get("username").as_text().unwrap().to_string())
                .collect()
        };

        assert_eq!(names(store.range("User", "age", 20, 30).unwrap()), ["alice", "Alfred"]);
        assert_eq!(names(store.range("User", "age", 31, Value::Null).unwrap()), ["bob"]);
        assert_eq!(names(store.pattern("User", "username", "al*").unwrap()), ["alice", "Alfred"]);
        assert!(store.exact("User", "username", "ALICE").unwrap().is_empty());
        assert_eq!(names(store.exact_ignore_case("User", "username", "ALICE").unwrap()), ["alice"]);
        assert_eq!(
            names(store.query("User", &Query::new().pattern("username", "al*").range("age", 28, 40)).unwrap()),
            ["Alfred"]
        );
        assert_eq!(
            names(store.get_many("User", &[RecordId(3), RecordId(9), RecordId(1), RecordId(3)]).unwrap()),
            ["bob", "alice"]
        );
        assert!(matches!(
            store.exact("User", "bio", "x"),
            Err(CoreError::NotIndexed { .. })
        ));
        assert!(matches!(
            store.exact("User", "nope", "x"),
            Err(CoreError::UnknownProperty { .. })
        ));
        assert!(store.query("User", &Query::new()).is_err());
    }

    #[test]
    fn composite_constraint() {
        let store = store();
        store
            .register(
                TypeSchema::new("Seat")
                    .property(PropertyDef::new("row", PropertyKind::Text))
                    .property(PropertyDef::new("number", PropertyKind::Numeric))
                    .composite(CompositeUnique::new("place", ["row", "number"]).message("seat taken")),
            )
            .unwrap();

        let seat = |row: &str, n: i64| Record::new().with("row", row).with("number", n);
        store.insert("Seat", seat("A", 1)).unwrap();
        store.insert("Seat", seat("A", 2)).unwrap();
        store.insert("Seat", seat("B", 1)).unwrap();
        match store.insert("Seat", seat("A", 1)).unwrap_err() {
            CoreError::ConstraintViolation { message, fields, .. } => {
                assert_eq!(message, "seat taken");
                assert_eq!(fields, vec!["row".to_string(), "number".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn composite_lookup_coerces_each_member() {
        let store = store();
        store
            .register(
                TypeSchema::new("Seat")
                    .property(PropertyDef::new("row", PropertyKind::Text))
                    .property(PropertyDef::new("number", PropertyKind::Numeric))
                    .composite(CompositeUnique::new("place", ["row", "number"])),
            )
            .unwrap();
        let id = store
            .insert("Seat", Record::new().with("row", "A").with("number", 1))
            .unwrap();

        let found = store
            .find_unique_composite("Seat", "place", vec![Value::from("A"), Value::from("1")])
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(id));
        assert!(store
            .find_unique_composite("Seat", "place", vec![Value::from("A"), Value::from(2)])
            .unwrap()
            .is_none());

        assert!(matches!(
            store.find_unique_composite("Seat", "place", vec![Value::from("A")]),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            store.find_unique_composite("Seat", "ghost", vec![]),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            store.find_unique_composite("Seat", "place", vec![Value::from("A"), Value::from("one")]),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn registration_is_visible_to_racing_writers() {
        for round in 0..50 {
            let store = Store::open(
                Config::new().persistence_enabled(false),
                Arc::new(InMemoryBlobStore::new()),
            )
            .unwrap();
            let writer = {
                let store = store.clone();
                std::thread::spawn(move || loop {
                    match store.insert("User", user("a", round)) {
                        Ok(id) => return id,
                        Err(CoreError::UnknownType { .. }) => std::thread::yield_now(),
                        Err(other) => panic!("insert failed: {other}"),
                    }
                })
            };
            store.register(user_schema()).unwrap();
            let id = writer.join().unwrap();

            assert_eq!(store.count("User").unwrap(), 1);
            assert!(store.index_references("User", id));
            assert_eq!(store.exact("User", "age", round).unwrap().len(), 1);
        }
    }

    #[test]
    fn constraints_on_transient_properties_are_rejected() {
        let store = store();
        let schema = TypeSchema::new("Slot")
            .property(PropertyDef::new("slot", PropertyKind::Numeric).transient())
            .unique(UniqueConstraint::new("slot"));
        assert!(matches!(
            store.register(schema.clone()),
            Err(CoreError::InvalidSchema { .. })
        ));
        assert!(matches!(
            store.insert("Slot", Record::new().with("slot", 1)),
            Err(CoreError::UnknownType { .. })
        ));
        store.register(schema.memory_only()).unwrap();
    }

    #[test]
    fn reloaded_defaults_take_the_property_kind() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let schema = TypeSchema::new("Event")
            .property(PropertyDef::new("title", PropertyKind::Text))
            .property(
                PropertyDef::new("at", PropertyKind::Temporal)
                    .transient()
                    .default_value("2024-01-01"),
            )
            .property(
                PropertyDef::new("n", PropertyKind::Numeric)
                    .transient()
                    .default_value("5"),
            );
        {
            let store = Store::open(Config::default(), blobs.clone()).unwrap();
            store.register(schema.clone()).unwrap();
            store
                .insert("Event", Record::new().with("title", "launch"))
                .unwrap();
            store.close().unwrap();
        }

        let store = Store::open(Config::default(), blobs).unwrap();
        store.register(schema).unwrap();
        let event = store.all("Event").unwrap().remove(0);
        assert!(matches!(event.get("at"), Value::Timestamp(_)));
        assert_eq!(event.get("n"), &Value::Integer(5));
        assert_eq!(store.exact("Event", "at", "2024-01-01").unwrap().len(), 1);
        assert_eq!(store.range("Event", "n", 5, 5).unwrap().len(), 1);

        let bad = TypeSchema::new("Bad")
            .property(PropertyDef::new("n", PropertyKind::Numeric).default_value("abc"));
        assert!(matches!(
            store.register(bad),
            Err(CoreError::InvalidSchema { .. })
        ));
        store.close().unwrap();
    }

    #[test]
    fn clear_keeps_identities() {
        let store = store();
        store.insert("User", user("a", 1)).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.count("User").unwrap(), 0);
        assert!(!store.index_references("User", RecordId(1)));
        store.insert("User", user("a", 1)).unwrap();
        assert_eq!(store.all("User").unwrap()[0].id, RecordId(2));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = store();
        let other = store.clone();
        store.close().unwrap();
        assert!(other.is_closed());
        assert!(matches!(other.insert("User", user("a", 1)), Err(CoreError::Closed)));
        assert!(matches!(other.get("User", RecordId(1)), Err(CoreError::Closed)));
        store.close().unwrap();
    }

    #[test]
    fn persisted_round_trip_and_lazy_load() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let config = Config::new().flush_debounce(Duration::from_millis(1));
        let schema = user_schema()
            .property(PropertyDef::new("session", PropertyKind::Text).transient());

        {
            let store = Store::open(config.clone(), blobs.clone()).unwrap();
            store.register(schema.clone()).unwrap();
            store
                .insert("User", user("a", 25).with("session", "tok"))
                .unwrap();
            store.insert("User", user("b", 30)).unwrap();
            store.close().unwrap();
        }
        assert!(blobs.exists("User.json").unwrap());

        let store = Store::open(config, blobs.clone()).unwrap();
        store.register(schema).unwrap();
        let all = store.all("User").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].get("session"), &Value::Null);
        assert_eq!(store.stats().records_loaded, 2);
        // Loaded values are indexed and constrained.
        assert_eq!(store.exact("User", "age", 30).unwrap()[0].id, RecordId(2));
        assert!(store.insert("User", user("a", 1)).is_err());
        assert_eq!(store.insert("User", user("c", 1)).unwrap(), RecordId(3));
    }

    #[test]
    fn load_skips_conflicting_records() {
        let blobs = Arc::new(InMemoryBlobStore::with_blobs([(
            "User.json".to_string(),
            br#"[
                {"id": 1, "username": "a", "age": 1},
                {"id": 2, "username": "a", "age": 2},
                {"id": 1, "username": "z", "age": 3},
                {"id": 7, "username": "b", "age": "x"}
            ]"#
            .to_vec(),
        )]));
        let store = Store::open(Config::default(), blobs).unwrap();
        store.register(user_schema()).unwrap();

        assert_eq!(store.count("User").unwrap(), 1);
        assert_eq!(store.stats().records_skipped, 3);
        // The counter is raised past every loaded identity.
        assert_eq!(store.insert("User", user("c", 1)).unwrap(), RecordId(2));
    }

    #[test]
    fn non_array_blob_loads_empty() {
        let blobs = Arc::new(InMemoryBlobStore::with_blobs([(
            "User.json".to_string(),
            br#"{"oops": true}"#.to_vec(),
        )]));
        let store = Store::open(Config::default(), blobs).unwrap();
        store.register(user_schema()).unwrap();
        assert_eq!(store.count("User").unwrap(), 0);
    }

    #[test]
    fn memory_only_types_skip_persistence() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = Store::open(Config::default(), blobs.clone()).unwrap();
        store.register(user_schema().memory_only()).unwrap();
        store.insert("User", user("a", 1)).unwrap();
        store.flush("User").unwrap();
        store.close().unwrap();
        assert!(!blobs.exists("User.json").unwrap());
    }

    #[test]
    fn stats_cover_indexes() {
        let store = store();
        store.insert("User", user("a", 1)).unwrap();
        let stats = store.stats();
        assert_eq!(stats.inserts, 1);
        // username, age and active are indexed; bio is not.
        assert_eq!(stats.index_count, 3);
        assert!(stats.approx_memory_bytes > 0);
    }
}
