//! Index manager: one strategy per (record type, property).
//!
//! Strategies are chosen from the declared [`PropertyKind`] when the type
//! is registered and never change afterwards. Each property index sits
//! behind its own `RwLock`, so a lookup on one property never waits for a
//! write to another.

use crate::error::{CoreError, CoreResult};
use crate::index::boolean::BooleanIndex;
use crate::index::fallback::FallbackIndex;
use crate::index::numeric::NumericIndex;
use crate::index::pattern::Pattern;
use crate::index::temporal::{CalendarBucket, TemporalIndex};
use crate::index::text::TextIndex;
use crate::index::traits::{IndexStrategy, SET_SLOT_BYTES};
use crate::query::Predicate;
use crate::record::Record;
use crate::schema::{PropertyDef, TypeSchema};
use crate::types::{IdSet, RecordId};
use parking_lot::RwLock;
use residb_codec::{PropertyKind, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the strategy for a property kind.
pub fn strategy_for(kind: PropertyKind) -> Box<dyn IndexStrategy> {
    match kind {
        PropertyKind::Text => Box::new(TextIndex::new()),
        PropertyKind::Numeric => Box::new(NumericIndex::new()),
        PropertyKind::Temporal => Box::new(TemporalIndex::new()),
        PropertyKind::Boolean => Box::new(BooleanIndex::new()),
        PropertyKind::Other => Box::new(FallbackIndex::new()),
    }
}

/// A strategy plus the identities whose value is null.
struct PropertyIndex {
    strategy: Box<dyn IndexStrategy>,
    nulls: IdSet,
}

impl PropertyIndex {
    fn new(kind: PropertyKind) -> Self {
        Self {
            strategy: strategy_for(kind),
            nulls: IdSet::new(),
        }
    }

    fn add(&mut self, value: &Value, id: RecordId) {
        if value.is_null() {
            self.nulls.insert(id);
        } else {
            self.strategy.add(value, id);
        }
    }

    fn remove(&mut self, value: &Value, id: RecordId) {
        if value.is_null() {
            self.nulls.remove(&id);
        } else {
            self.strategy.remove(value, id);
        }
    }

    fn exact(&self, value: &Value) -> IdSet {
        if value.is_null() {
            self.nulls.clone()
        } else {
            self.strategy.exact(value)
        }
    }

    fn clear(&mut self) {
        self.strategy.clear();
        self.nulls.clear();
    }
}

/// Indexes of one record type. The property map is fixed at registration.
struct TypeIndexes {
    schema: Arc<TypeSchema>,
    properties: HashMap<String, RwLock<PropertyIndex>>,
}

impl TypeIndexes {
    fn resolve(&self, property: &str) -> CoreResult<(&PropertyDef, &RwLock<PropertyIndex>)> {
        let def = self
            .schema
            .property_def(property)
            .ok_or_else(|| CoreError::unknown_property(&self.schema.name, property))?;
        let index = self
            .properties
            .get(property)
            .ok_or_else(|| CoreError::not_indexed(&self.schema.name, property))?;
        Ok((def, index))
    }

    fn coerce(&self, def: &PropertyDef, value: &Value) -> CoreResult<Value> {
        def.kind
            .coerce(value.clone())
            .map_err(|e| CoreError::from_coercion(&self.schema.name, &def.name, e))
    }
}

/// Size and shape of one property index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Record type.
    pub record_type: String,
    /// Indexed property.
    pub property: String,
    /// Strategy kind.
    pub kind: PropertyKind,
    /// Distinct keys, counting null as one key.
    pub keys: usize,
    /// Value/identity pairs, nulls included.
    pub entries: usize,
    /// Rough heap usage in bytes.
    pub approx_bytes: usize,
}

/// Routes index maintenance and lookups to per-property strategies.
#[derive(Default)]
pub struct IndexManager {
    types: RwLock<HashMap<String, Arc<TypeIndexes>>>,
}

impl IndexManager {
    /// Creates a manager with no types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the indexes for every indexed property of `schema`.
    ///
    /// Registering a type twice keeps the existing indexes.
    pub fn register(&self, schema: Arc<TypeSchema>) {
        let mut types = self.types.write();
        if types.contains_key(&schema.name) {
            return;
        }
        let properties = schema
            .indexed_properties()
            .map(|def| (def.name.clone(), RwLock::new(PropertyIndex::new(def.kind))))
            .collect();
        types.insert(
            schema.name.clone(),
            Arc::new(TypeIndexes { schema, properties }),
        );
    }

    fn type_indexes(&self, record_type: &str) -> CoreResult<Arc<TypeIndexes>> {
        self.types
            .read()
            .get(record_type)
            .map(Arc::clone)
            .ok_or_else(|| CoreError::unknown_type(record_type))
    }

    /// Adds every indexed property of `record`.
    pub fn add(&self, record_type: &str, record: &Record) -> CoreResult<()> {
        let indexes = self.type_indexes(record_type)?;
        for (name, index) in &indexes.properties {
            index.write().add(record.get(name), record.id);
        }
        Ok(())
    }

    /// Removes every indexed property of `record`.
    pub fn remove(&self, record_type: &str, record: &Record) -> CoreResult<()> {
        let indexes = self.type_indexes(record_type)?;
        for (name, index) in &indexes.properties {
            index.write().remove(record.get(name), record.id);
        }
        Ok(())
    }

    /// Moves `old` to `new`, touching only properties whose value changed.
    pub fn update(&self, record_type: &str, old: &Record, new: &Record) -> CoreResult<()> {
        let indexes = self.type_indexes(record_type)?;
        for (name, index) in &indexes.properties {
            let (before, after) = (old.get(name), new.get(name));
            if before != after || old.id != new.id {
                let mut index = index.write();
                index.remove(before, old.id);
                index.add(after, new.id);
            }
        }
        Ok(())
    }

    /// Identities whose `property` equals `value` (`Null` included).
    pub fn exact(&self, record_type: &str, property: &str, value: &Value) -> CoreResult<IdSet> {
        let indexes = self.type_indexes(record_type)?;
        let (def, index) = indexes.resolve(property)?;
        let value = indexes.coerce(def, value)?;
        let ids = index.read().exact(&value);
        Ok(ids)
    }

    /// Case-insensitive equality for text; same as [`exact`](Self::exact)
    /// for other kinds.
    pub fn exact_ignore_case(
        &self,
        record_type: &str,
        property: &str,
        value: &Value,
    ) -> CoreResult<IdSet> {
        let indexes = self.type_indexes(record_type)?;
        let (def, index) = indexes.resolve(property)?;
        let value = indexes.coerce(def, value)?;
        let index = index.read();
        if value.is_null() {
            return Ok(index.nulls.clone());
        }
        Ok(index.strategy.exact_ignore_case(&value))
    }

    /// Identities whose `property` lies in `[min, max]`; `Null` bounds are
    /// open. Null values never match.
    pub fn range(
        &self,
        record_type: &str,
        property: &str,
        min: &Value,
        max: &Value,
    ) -> CoreResult<IdSet> {
        let indexes = self.type_indexes(record_type)?;
        let (def, index) = indexes.resolve(property)?;
        let min = indexes.coerce(def, min)?;
        let max = indexes.coerce(def, max)?;
        let ids = index.read().strategy.range(&min, &max);
        Ok(ids)
    }

    /// Identities whose `property` matches a wildcard pattern.
    pub fn pattern(&self, record_type: &str, property: &str, pattern: &str) -> CoreResult<IdSet> {
        let indexes = self.type_indexes(record_type)?;
        let (_, index) = indexes.resolve(property)?;
        let ids = index.read().strategy.pattern(&Pattern::parse(pattern));
        Ok(ids)
    }

    /// Identities in a calendar bucket of a temporal property.
    pub fn calendar(
        &self,
        record_type: &str,
        property: &str,
        bucket: CalendarBucket,
    ) -> CoreResult<IdSet> {
        let indexes = self.type_indexes(record_type)?;
        let (def, index) = indexes.resolve(property)?;
        let ids = index.read().strategy.calendar(bucket);
        ids.ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "{record_type}.{property} is {}, calendar queries need a temporal property",
                def.kind
            ))
        })
    }

    /// Intersects predicates in the order given, stopping at the first
    /// empty intermediate result. An empty predicate list is rejected.
    pub fn query(&self, record_type: &str, predicates: &[Predicate]) -> CoreResult<IdSet> {
        let Some((first, rest)) = predicates.split_first() else {
            return Err(CoreError::invalid_operation("query needs at least one predicate"));
        };

        let mut result = self.evaluate(record_type, first)?;
        for predicate in rest {
            if result.is_empty() {
                break;
            }
            let next = self.evaluate(record_type, predicate)?;
            result.retain(|id| next.contains(id));
        }
        Ok(result)
    }

    fn evaluate(&self, record_type: &str, predicate: &Predicate) -> CoreResult<IdSet> {
        match predicate {
            Predicate::Eq { property, value } => self.exact(record_type, property, value),
            Predicate::Range { property, min, max } => {
                self.range(record_type, property, min, max)
            }
            Predicate::Pattern { property, pattern } => {
                self.pattern(record_type, property, pattern)
            }
        }
    }

    /// Returns true if any index of the type still refers to `id`.
    pub fn references(&self, record_type: &str, id: RecordId) -> bool {
        self.type_indexes(record_type).is_ok_and(|indexes| {
            indexes.properties.values().any(|index| {
                let index = index.read();
                index.nulls.contains(&id) || index.strategy.contains_id(id)
            })
        })
    }

    /// Empties every index of the type.
    pub fn clear_type(&self, record_type: &str) {
        if let Ok(indexes) = self.type_indexes(record_type) {
            for index in indexes.properties.values() {
                index.write().clear();
            }
        }
    }

    /// Per-index statistics, ordered by type then property.
    pub fn stats(&self) -> Vec<IndexStats> {
        let types: Vec<_> = self.types.read().values().map(Arc::clone).collect();
        let mut stats = Vec::new();
        for indexes in types {
            for (property, index) in &indexes.properties {
                let index = index.read();
                let nulls = index.nulls.len();
                stats.push(IndexStats {
                    record_type: indexes.schema.name.clone(),
                    property: property.clone(),
                    kind: index.strategy.kind(),
                    keys: index.strategy.key_count() + usize::from(nulls > 0),
                    entries: index.strategy.entry_count() + nulls,
                    approx_bytes: index.strategy.approx_bytes() + nulls * SET_SLOT_BYTES,
                });
            }
        }
        stats.sort_by(|a, b| {
            (a.record_type.as_str(), a.property.as_str())
                .cmp(&(b.record_type.as_str(), b.property.as_str()))
        });
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertyDef;
    use chrono::{TimeZone, Utc};

    fn schema() -> Arc<TypeSchema> {
        Arc::new(
            TypeSchema::new("User")
                .property(PropertyDef::new("name", PropertyKind::Text))
                .property(PropertyDef::new("age", PropertyKind::Numeric))
                .property(PropertyDef::new("active", PropertyKind::Boolean))
                .property(PropertyDef::new("joined", PropertyKind::Temporal))
                .property(PropertyDef::new("bio", PropertyKind::Text).not_indexed()),
        )
    }

    fn user(id: u64, name: &str, age: i64, active: bool) -> Record {
        Record::new()
            .with("name", name)
            .with("age", age)
            .with("active", active)
            .with_id(RecordId(id))
    }

    fn ids(set: IdSet) -> Vec<u64> {
        let mut v: Vec<_> = set.into_iter().map(RecordId::as_u64).collect();
        v.sort_unstable();
        v
    }

    fn manager() -> IndexManager {
        let manager = IndexManager::new();
        manager.register(schema());
        for record in [
            user(1, "alice", 25, true),
            user(2, "bob", 30, false),
            user(3, "alex", 25, false),
        ] {
            manager.add("User", &record).unwrap();
        }
        manager
    }

    #[test]
    fn query_values_are_coerced() {
        let manager = manager();
        assert_eq!(
            ids(manager.exact("User", "age", &Value::from("25")).unwrap()),
            vec![1, 3]
        );
        assert_eq!(
            ids(manager.exact("User", "active", &Value::from("yes")).unwrap()),
            vec![1]
        );
        assert!(matches!(
            manager.exact("User", "age", &Value::from("old")),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn missing_properties_index_as_null() {
        let manager = manager();
        assert_eq!(
            ids(manager.exact("User", "joined", &Value::Null).unwrap()),
            vec![1, 2, 3]
        );
        assert!(manager
            .range("User", "joined", &Value::Null, &Value::Null)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn errors_for_unindexed_and_unknown() {
        let manager = manager();
        assert!(matches!(
            manager.exact("User", "bio", &Value::from("x")),
            Err(CoreError::NotIndexed { .. })
        ));
        assert!(matches!(
            manager.exact("User", "ghost", &Value::from("x")),
            Err(CoreError::UnknownProperty { .. })
        ));
        assert!(matches!(
            manager.exact("Order", "id", &Value::Integer(1)),
            Err(CoreError::UnknownType { .. })
        ));
        assert!(matches!(
            manager.calendar("User", "age", CalendarBucket::Year(2024)),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn intersection_in_caller_order() {
        let manager = manager();
        let predicates = vec![
            Predicate::eq("age", 25),
            Predicate::pattern("name", "al*"),
            Predicate::eq("active", false),
        ];
        assert_eq!(ids(manager.query("User", &predicates).unwrap()), vec![3]);

        let none = vec![Predicate::eq("age", 99), Predicate::eq("ghost", 1)];
        // Short-circuits before the unknown property is evaluated.
        assert!(manager.query("User", &none).unwrap().is_empty());

        assert!(manager.query("User", &[]).is_err());
    }

    #[test]
    fn update_moves_changed_values() {
        let manager = manager();
        let old = user(2, "bob", 30, false);
        let new = user(2, "bob", 31, false);
        manager.update("User", &old, &new).unwrap();

        assert!(manager
            .exact("User", "age", &Value::Integer(30))
            .unwrap()
            .is_empty());
        assert_eq!(
            ids(manager.exact("User", "age", &Value::Integer(31)).unwrap()),
            vec![2]
        );
    }

    #[test]
    fn remove_leaves_no_reference() {
        let manager = manager();
        assert!(manager.references("User", RecordId(1)));
        manager.remove("User", &user(1, "alice", 25, true)).unwrap();
        assert!(!manager.references("User", RecordId(1)));
    }

    #[test]
    fn calendar_and_stats() {
        let manager = manager();
        let joined = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let record = user(4, "dan", 40, true).with("joined", joined);
        manager.add("User", &record).unwrap();

        assert_eq!(
            ids(manager
                .calendar("User", "joined", CalendarBucket::Month(2024, 5))
                .unwrap()),
            vec![4]
        );

        let stats = manager.stats();
        let props: Vec<_> = stats.iter().map(|s| s.property.as_str()).collect();
        assert_eq!(props, vec!["active", "age", "joined", "name"]);

        let joined_stats = &stats[2];
        assert_eq!(joined_stats.kind, PropertyKind::Temporal);
        assert_eq!(joined_stats.entries, 4);
        assert_eq!(joined_stats.keys, 2);

        manager.clear_type("User");
        assert!(manager.stats().iter().all(|s| s.entries == 0));
    }
}
