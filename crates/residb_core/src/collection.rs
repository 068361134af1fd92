//! Typed collections.

use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::record::Record;
use crate::schema::TypeSchema;
use crate::store::Store;
use crate::types::RecordId;
use residb_codec::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A Rust type stored as records of one record type.
///
/// # Example
///
/// ```rust,ignore
/// use residb_codec::PropertyKind;
/// use residb_core::{CoreResult, Entity, PropertyDef, Record, RecordId, TypeSchema, UniqueConstraint};
///
/// struct User {
///     id: RecordId,
///     username: String,
///     age: i64,
/// }
///
/// impl Entity for User {
///     fn schema() -> TypeSchema {
///         TypeSchema::new("User")
///             .property(PropertyDef::new("username", PropertyKind::Text))
///             .property(PropertyDef::new("age", PropertyKind::Numeric))
///             .unique(UniqueConstraint::new("username"))
///     }
///
///     fn id(&self) -> RecordId {
///         self.id
///     }
///
///     fn set_id(&mut self, id: RecordId) {
///         self.id = id;
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new()
///             .with("username", self.username.as_str())
///             .with("age", self.age)
///     }
///
///     fn from_record(record: &Record) -> CoreResult<Self> {
///         Ok(User {
///             id: record.id,
///             username: record.field("username", |v| v.as_text().map(String::from))?,
///             age: record.field("age", |v| v.as_integer())?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync {
    /// Schema of the record type. Called once per [`Store::collection`].
    fn schema() -> TypeSchema;

    /// Current identity, [`RecordId::UNASSIGNED`] before the first insert.
    fn id(&self) -> RecordId;

    /// Stores the identity assigned on insert.
    fn set_id(&mut self, id: RecordId);

    /// Property values. The identity is taken from [`Entity::id`].
    fn to_record(&self) -> Record;

    /// Rebuilds the value from a stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if a property does not have the expected shape.
    fn from_record(record: &Record) -> CoreResult<Self>;
}

/// Typed access to the records of one [`Entity`] type.
///
/// Obtained from [`Store::collection`]. Cloning is cheap.
pub struct Collection<T: Entity> {
    store: Store,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Collection<T> {
    pub(crate) fn new(store: Store, name: String) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    /// Record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn record_of(entity: &T) -> Record {
        entity.to_record().with_id(entity.id())
    }

    fn decode_all(records: Vec<Arc<Record>>) -> CoreResult<Vec<T>> {
        records.iter().map(|r| T::from_record(r)).collect()
    }

    /// Inserts `entity` and writes the assigned identity back into it.
    ///
    /// # Errors
    ///
    /// See [`Store::insert`].
    pub fn insert(&self, entity: &mut T) -> CoreResult<RecordId> {
        let id = self.store.insert(&self.name, Self::record_of(entity))?;
        entity.set_id(id);
        Ok(id)
    }

    /// Inserts every entity or none of them.
    ///
    /// # Errors
    ///
    /// See [`Store::insert_batch`]. On error no identity is written back.
    pub fn insert_batch(&self, entities: &mut [T]) -> CoreResult<Vec<RecordId>> {
        let records = entities.iter().map(Self::record_of).collect();
        let ids = self.store.insert_batch(&self.name, records)?;
        for (entity, id) in entities.iter_mut().zip(&ids) {
            entity.set_id(*id);
        }
        Ok(ids)
    }

    /// Replaces the stored version of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no record has the entity's
    /// identity; otherwise see [`Store::update`].
    pub fn update(&self, entity: &T) -> CoreResult<()> {
        match self.store.update(&self.name, Self::record_of(entity))? {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found(&self.name, entity.id())),
        }
    }

    /// Deletes by identity. Returns false if nothing was deleted.
    ///
    /// # Errors
    ///
    /// See [`Store::delete`].
    pub fn delete(&self, id: RecordId) -> CoreResult<bool> {
        Ok(self.store.delete(&self.name, id)?.is_some())
    }

    /// Looks up by identity.
    ///
    /// # Errors
    ///
    /// See [`Store::get`], plus any [`Entity::from_record`] failure.
    pub fn find_by_id(&self, id: RecordId) -> CoreResult<Option<T>> {
        self.store
            .get(&self.name, id)?
            .map(|r| T::from_record(&r))
            .transpose()
    }

    /// Entities whose `property` equals `value`.
    ///
    /// # Errors
    ///
    /// See [`Store::exact`].
    pub fn find_by(&self, property: &str, value: impl Into<Value>) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.exact(&self.name, property, value)?)
    }

    /// Entities whose `property` lies in `[min, max]`.
    ///
    /// # Errors
    ///
    /// See [`Store::range`].
    pub fn find_by_range(
        &self,
        property: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.range(&self.name, property, min, max)?)
    }

    /// Entities whose `property` matches a `*` wildcard pattern.
    ///
    /// # Errors
    ///
    /// See [`Store::pattern`].
    pub fn find_by_pattern(&self, property: &str, pattern: &str) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.pattern(&self.name, property, pattern)?)
    }

    /// Entities matching every predicate.
    ///
    /// # Errors
    ///
    /// See [`Store::query`].
    pub fn find_by_multiple(&self, query: &Query) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.query(&self.name, query)?)
    }

    /// The entity holding `value` under a unique constraint.
    ///
    /// # Errors
    ///
    /// See [`Store::find_unique`].
    pub fn find_unique(&self, property: &str, value: impl Into<Value>) -> CoreResult<Option<T>> {
        self.store
            .find_unique(&self.name, property, value)?
            .map(|r| T::from_record(&r))
            .transpose()
    }

    /// The entity holding `values` under the composite group `group`.
    ///
    /// # Errors
    ///
    /// See [`Store::find_unique_composite`].
    pub fn find_unique_composite(&self, group: &str, values: Vec<Value>) -> CoreResult<Option<T>> {
        self.store
            .find_unique_composite(&self.name, group, values)?
            .map(|r| T::from_record(&r))
            .transpose()
    }

    /// Every entity, ordered by identity.
    ///
    /// # Errors
    ///
    /// See [`Store::all`].
    pub fn all(&self) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.all(&self.name)?)
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// See [`Store::count`].
    pub fn count(&self) -> CoreResult<usize> {
        self.store.count(&self.name)
    }
}
