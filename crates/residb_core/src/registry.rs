//! Registered record types and their per-type locks.

use crate::error::{CoreError, CoreResult};
use crate::schema::TypeSchema;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-type state shared by every operation on that type.
#[derive(Debug)]
pub(crate) struct TypeEntry {
    pub(crate) schema: Arc<TypeSchema>,
    /// Serializes mutations of this type.
    pub(crate) write_lock: Mutex<()>,
    loaded: AtomicBool,
}

impl TypeEntry {
    fn new(schema: TypeSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            write_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.schema.name
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }
}

/// Maps record type names to their schema and lock.
#[derive(Debug, Default)]
pub(crate) struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeEntry>>>,
}

impl TypeRegistry {
    /// Registers a schema.
    ///
    /// Registering an identical schema again is a no-op; a different schema
    /// under an existing name is rejected.
    pub(crate) fn register(
        &self,
        schema: TypeSchema,
        on_new: impl FnOnce(&Arc<TypeSchema>),
    ) -> CoreResult<Arc<TypeEntry>> {
        let schema = schema.normalized()?;

        let mut types = self.types.write();
        if let Some(existing) = types.get(&schema.name) {
            if *existing.schema == schema {
                return Ok(Arc::clone(existing));
            }
            return Err(CoreError::invalid_schema(format!(
                "{} is already registered with a different schema",
                schema.name
            )));
        }

        let entry = Arc::new(TypeEntry::new(schema));
        on_new(&entry.schema);
        types.insert(entry.name().to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub(crate) fn get(&self, name: &str) -> CoreResult<Arc<TypeEntry>> {
        self.types
            .read()
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| CoreError::unknown_type(name))
    }

    pub(crate) fn entries(&self) -> Vec<Arc<TypeEntry>> {
        let mut entries: Vec<_> = self.types.read().values().map(Arc::clone).collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }
}
