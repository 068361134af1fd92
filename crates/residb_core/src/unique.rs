//! Uniqueness constraints.
//!
//! For every constraint the manager keeps a reverse map from the
//! constrained value (or tuple of values) to the identity holding it.
//! Writers call [`UniquenessManager::validate`] before touching any other
//! structure and commit afterwards, all under the type's write lock, so a
//! violation never leaves partial state behind.
//!
//! # Null handling
//!
//! With `allow_null` (the default) a null value, or a tuple with any null
//! component, is exempt: it is neither checked nor stored. Without it,
//! null is encoded like any other value and at most one record may hold it.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::{CompositeUnique, TypeSchema, UniqueConstraint};
use crate::types::RecordId;
use parking_lot::RwLock;
use residb_codec::Value;
use std::collections::HashMap;

type ReverseMap = HashMap<String, RecordId>;

/// Reverse maps for the single and composite constraints of every type.
#[derive(Debug, Default)]
pub struct UniquenessManager {
    /// (type, property) to value key to owner.
    single: RwLock<HashMap<(String, String), ReverseMap>>,
    /// (type, group) to tuple key to owner.
    composite: RwLock<HashMap<(String, String), ReverseMap>>,
}

/// Key for a single-property constraint, `None` when exempt.
fn single_key(constraint: &UniqueConstraint, value: &Value) -> Option<String> {
    if value.is_null() && constraint.allow_null {
        return None;
    }
    Some(value.canonical_key())
}

/// Key for a composite group, `None` when exempt.
///
/// Components are length-prefixed canonical keys, so no choice of values
/// can make two different tuples collide.
fn composite_key(group: &CompositeUnique, values: &[&Value]) -> Option<String> {
    if group.allow_null && values.iter().any(|v| v.is_null()) {
        return None;
    }
    let mut key = String::new();
    for value in values {
        let part = value.canonical_key();
        key.push_str(&part.len().to_string());
        key.push(':');
        key.push_str(&part);
    }
    Some(key)
}

fn group_values<'r>(group: &CompositeUnique, record: &'r Record) -> Vec<&'r Value> {
    group.properties.iter().map(|p| record.get(p)).collect()
}

fn single_violation(
    schema: &TypeSchema,
    constraint: &UniqueConstraint,
    value: &Value,
    owner: Option<RecordId>,
) -> CoreError {
    CoreError::ConstraintViolation {
        type_name: schema.name.clone(),
        constraint: constraint.property.clone(),
        fields: vec![constraint.property.clone()],
        values: vec![value.to_string()],
        conflicting_id: owner,
        message: constraint.message.clone().unwrap_or_else(|| {
            format!("{} {} is already in use", constraint.property, value)
        }),
    }
}

fn composite_violation(
    schema: &TypeSchema,
    group: &CompositeUnique,
    values: &[&Value],
    owner: Option<RecordId>,
) -> CoreError {
    CoreError::ConstraintViolation {
        type_name: schema.name.clone(),
        constraint: group.name.clone(),
        fields: group.properties.clone(),
        values: values.iter().map(ToString::to_string).collect(),
        conflicting_id: owner,
        message: group.message.clone().unwrap_or_else(|| {
            format!("combination of {} is already in use", group.properties.join(", "))
        }),
    }
}

fn map_key(schema: &TypeSchema, name: &str) -> (String, String) {
    (schema.name.clone(), name.to_string())
}

impl UniquenessManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every constraint of `schema` against `record`.
    ///
    /// A match owned by `exclude` (the record being updated) is not a
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] for the first rule broken.
    pub fn validate(
        &self,
        schema: &TypeSchema,
        record: &Record,
        exclude: Option<RecordId>,
    ) -> CoreResult<()> {
        let conflicts = |owner: RecordId| Some(owner) != exclude;

        if !schema.unique.is_empty() {
            let single = self.single.read();
            for constraint in &schema.unique {
                let value = record.get(&constraint.property);
                let Some(key) = single_key(constraint, value) else {
                    continue;
                };
                let owner = single
                    .get(&map_key(schema, &constraint.property))
                    .and_then(|m| m.get(&key))
                    .copied();
                if let Some(owner) = owner.filter(|o| conflicts(*o)) {
                    return Err(single_violation(schema, constraint, value, Some(owner)));
                }
            }
        }

        if !schema.composite.is_empty() {
            let composite = self.composite.read();
            for group in &schema.composite {
                let values = group_values(group, record);
                let Some(key) = composite_key(group, &values) else {
                    continue;
                };
                let owner = composite
                    .get(&map_key(schema, &group.name))
                    .and_then(|m| m.get(&key))
                    .copied();
                if let Some(owner) = owner.filter(|o| conflicts(*o)) {
                    return Err(composite_violation(schema, group, &values, Some(owner)));
                }
            }
        }

        Ok(())
    }

    /// Validates a batch against committed state and against itself.
    ///
    /// Records in the batch are not yet inserted, so they are told apart by
    /// position; a clash inside the batch reports no conflicting identity.
    ///
    /// # Errors
    ///
    /// Returns the first [`CoreError::ConstraintViolation`] found.
    pub fn validate_batch(&self, schema: &TypeSchema, records: &[Record]) -> CoreResult<()> {
        let mut seen_single: HashMap<(&str, String), usize> = HashMap::new();
        let mut seen_composite: HashMap<(&str, String), usize> = HashMap::new();

        for (position, record) in records.iter().enumerate() {
            let exclude = record.id.is_assigned().then_some(record.id);
            self.validate(schema, record, exclude)?;

            for constraint in &schema.unique {
                let value = record.get(&constraint.property);
                if let Some(key) = single_key(constraint, value) {
                    if seen_single
                        .insert((constraint.property.as_str(), key), position)
                        .is_some()
                    {
                        return Err(single_violation(schema, constraint, value, None));
                    }
                }
            }

            for group in &schema.composite {
                let values = group_values(group, record);
                if let Some(key) = composite_key(group, &values) {
                    if seen_composite
                        .insert((group.name.as_str(), key), position)
                        .is_some()
                    {
                        return Err(composite_violation(schema, group, &values, None));
                    }
                }
            }
        }
        Ok(())
    }

    /// Registers the record's constrained values. Call only after a
    /// successful [`validate`](Self::validate).
    pub fn commit_insert(&self, schema: &TypeSchema, record: &Record) {
        if !schema.unique.is_empty() {
            let mut single = self.single.write();
            for constraint in &schema.unique {
                if let Some(key) = single_key(constraint, record.get(&constraint.property)) {
                    single
                        .entry(map_key(schema, &constraint.property))
                        .or_default()
                        .insert(key, record.id);
                }
            }
        }

        if !schema.composite.is_empty() {
            let mut composite = self.composite.write();
            for group in &schema.composite {
                if let Some(key) = composite_key(group, &group_values(group, record)) {
                    composite
                        .entry(map_key(schema, &group.name))
                        .or_default()
                        .insert(key, record.id);
                }
            }
        }
    }

    /// Removes the record's constrained values. Entries owned by another
    /// identity are left alone.
    pub fn commit_remove(&self, schema: &TypeSchema, record: &Record) {
        if !schema.unique.is_empty() {
            let mut single = self.single.write();
            for constraint in &schema.unique {
                let Some(key) = single_key(constraint, record.get(&constraint.property)) else {
                    continue;
                };
                if let Some(map) = single.get_mut(&map_key(schema, &constraint.property)) {
                    if map.get(&key) == Some(&record.id) {
                        map.remove(&key);
                    }
                }
            }
        }

        if !schema.composite.is_empty() {
            let mut composite = self.composite.write();
            for group in &schema.composite {
                let Some(key) = composite_key(group, &group_values(group, record)) else {
                    continue;
                };
                if let Some(map) = composite.get_mut(&map_key(schema, &group.name)) {
                    if map.get(&key) == Some(&record.id) {
                        map.remove(&key);
                    }
                }
            }
        }
    }

    /// Validates `new` (excluding `old`'s identity), then swaps the entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] without changing anything.
    pub fn commit_update(&self, schema: &TypeSchema, old: &Record, new: &Record) -> CoreResult<()> {
        self.validate(schema, new, Some(old.id))?;
        self.commit_remove(schema, old);
        self.commit_insert(schema, new);
        Ok(())
    }

    /// Owner of `value` under the single constraint on `property`.
    pub fn lookup(&self, record_type: &str, property: &str, value: &Value) -> Option<RecordId> {
        self.single
            .read()
            .get(&(record_type.to_string(), property.to_string()))
            .and_then(|m| m.get(&value.canonical_key()))
            .copied()
    }

    /// Owner of a tuple under the composite `group`.
    pub fn lookup_composite(
        &self,
        record_type: &str,
        group: &str,
        values: &[Value],
    ) -> Option<RecordId> {
        let mut key = String::new();
        for value in values {
            let part = value.canonical_key();
            key.push_str(&part.len().to_string());
            key.push(':');
            key.push_str(&part);
        }
        self.composite
            .read()
            .get(&(record_type.to_string(), group.to_string()))
            .and_then(|m| m.get(&key))
            .copied()
    }

    /// Drops every entry of the type.
    pub fn clear_type(&self, record_type: &str) {
        self.single.write().retain(|(t, _), _| t != record_type);
        self.composite.write().retain(|(t, _), _| t != record_type);
    }

    /// Total number of registered values across all constraints.
    pub fn len(&self) -> usize {
        self.single.read().values().map(HashMap::len).sum::<usize>()
            + self.composite.read().values().map(HashMap::len).sum::<usize>()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
