//! Numeric index: hashed exact lookup plus an ordered key set.

use crate::index::pattern::Pattern;
use crate::index::traits::{insert_id, remove_id, IndexStrategy, MAP_NODE_BYTES, SET_SLOT_BYTES};
use crate::types::{IdSet, RecordId};
use residb_codec::{NumericKey, PropertyKind, Value};
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Index for numeric properties.
///
/// Integers and floats are normalized to [`NumericKey`], so `25` and
/// `25.0` share a key. Exact lookups hit the hash map; range scans walk
/// the ordered key set and resolve each key through the map.
#[derive(Debug, Default)]
pub struct NumericIndex {
    exact: HashMap<NumericKey, IdSet>,
    ordered: BTreeSet<NumericKey>,
    count: usize,
}

impl NumericIndex {
    /// Creates an empty numeric index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest indexed number.
    pub fn min_key(&self) -> Option<NumericKey> {
        self.ordered.first().copied()
    }

    /// Largest indexed number.
    pub fn max_key(&self) -> Option<NumericKey> {
        self.ordered.last().copied()
    }

    fn bound(value: &Value) -> Bound<NumericKey> {
        value.as_number().map_or(Bound::Unbounded, Bound::Included)
    }
}

impl IndexStrategy for NumericIndex {
    fn kind(&self) -> PropertyKind {
        PropertyKind::Numeric
    }

    fn add(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(key) = value.as_number() else {
            return false;
        };
        if !insert_id(&mut self.exact, key, id) {
            return false;
        }
        self.ordered.insert(key);
        self.count += 1;
        true
    }

    fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(key) = value.as_number() else {
            return false;
        };
        if !remove_id(&mut self.exact, &key, id) {
            return false;
        }
        if !self.exact.contains_key(&key) {
            self.ordered.remove(&key);
        }
        self.count -= 1;
        true
    }

    fn exact(&self, value: &Value) -> IdSet {
        value
            .as_number()
            .and_then(|key| self.exact.get(&key))
            .cloned()
            .unwrap_or_default()
    }

    fn range(&self, min: &Value, max: &Value) -> IdSet {
        let lower = Self::bound(min);
        let upper = Self::bound(max);
        if let (Bound::Included(lo), Bound::Included(hi)) = (&lower, &upper) {
            if lo > hi {
                return IdSet::new();
            }
        }
        self.ordered
            .range((lower, upper))
            .filter_map(|key| self.exact.get(key))
            .flatten()
            .copied()
            .collect()
    }

    fn pattern(&self, pattern: &Pattern) -> IdSet {
        self.exact
            .iter()
            .filter(|(key, _)| pattern.matches(&key.to_string()))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    fn contains_id(&self, id: RecordId) -> bool {
        self.exact.values().any(|ids| ids.contains(&id))
    }

    fn key_count(&self) -> usize {
        self.exact.len()
    }

    fn entry_count(&self) -> usize {
        self.count
    }

    fn approx_bytes(&self) -> usize {
        let key_bytes = std::mem::size_of::<NumericKey>();
        self.exact.len() * (2 * (MAP_NODE_BYTES + key_bytes)) + self.count * SET_SLOT_BYTES
    }

    fn clear(&mut self) {
        self.exact.clear();
        self.ordered.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: IdSet) -> Vec<u64> {
        let mut v: Vec<_> = set.into_iter().map(RecordId::as_u64).collect();
        v.sort_unstable();
        v
    }

    fn index() -> NumericIndex {
        let mut index = NumericIndex::new();
        index.add(&Value::Integer(25), RecordId(1));
        index.add(&Value::Integer(30), RecordId(2));
        index.add(&Value::Float(27.5), RecordId(3));
        index.add(&Value::Integer(-4), RecordId(4));
        index
    }

    #[test]
    fn integers_and_integral_floats_match() {
        let index = index();
        assert_eq!(ids(index.exact(&Value::Float(25.0))), vec![1]);
        assert_eq!(ids(index.exact(&Value::Integer(25))), vec![1]);
        assert!(index.exact(&Value::Integer(26)).is_empty());
    }

    #[test]
    fn inclusive_range() {
        let index = index();
        assert_eq!(
            ids(index.range(&Value::Integer(20), &Value::Integer(27))),
            vec![1]
        );
        assert_eq!(
            ids(index.range(&Value::Integer(25), &Value::Integer(30))),
            vec![1, 2, 3]
        );
        assert_eq!(ids(index.range(&Value::Null, &Value::Integer(0))), vec![4]);
        assert_eq!(ids(index.range(&Value::Float(27.5), &Value::Null)), vec![2, 3]);
        assert!(index
            .range(&Value::Integer(30), &Value::Integer(20))
            .is_empty());
    }

    #[test]
    fn remove_cleans_ordered_keys() {
        let mut index = index();
        index.add(&Value::Integer(30), RecordId(5));

        assert!(index.remove(&Value::Integer(30), RecordId(2)));
        assert_eq!(index.max_key(), Some(NumericKey::Int(30)));
        assert!(index.remove(&Value::Float(30.0), RecordId(5)));
        assert_eq!(index.max_key(), Some(NumericKey::from_f64(27.5).unwrap()));
        assert!(!index.remove(&Value::Integer(30), RecordId(5)));
        assert_eq!(index.entry_count(), 3);
        assert_eq!(index.min_key(), Some(NumericKey::Int(-4)));
    }

    #[test]
    fn pattern_on_text_form() {
        let index = index();
        assert_eq!(ids(index.pattern(&Pattern::parse("2*"))), vec![1, 3]);
        assert_eq!(ids(index.pattern(&Pattern::parse("*.5"))), vec![3]);
    }
}
