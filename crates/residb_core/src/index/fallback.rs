//! Fallback index for values without a natural order.

use crate::index::pattern::Pattern;
use crate::index::traits::{IndexStrategy, MAP_NODE_BYTES, SET_SLOT_BYTES};
use crate::types::{IdSet, RecordId};
use residb_codec::{PropertyKind, Value};
use std::collections::HashMap;

/// Index keyed by [`Value::canonical_key`].
///
/// Equality is structural. Range and pattern queries scan every key:
/// range compares canonical keys as strings, pattern matches the value's
/// text form.
#[derive(Debug, Default)]
pub struct FallbackIndex {
    entries: HashMap<String, (Value, IdSet)>,
    count: usize,
}

impl FallbackIndex {
    /// Creates an empty fallback index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStrategy for FallbackIndex {
    fn kind(&self) -> PropertyKind {
        PropertyKind::Other
    }

    fn add(&mut self, value: &Value, id: RecordId) -> bool {
        if value.is_null() {
            return false;
        }
        let (_, ids) = self
            .entries
            .entry(value.canonical_key())
            .or_insert_with(|| (value.clone(), IdSet::new()));
        if !ids.insert(id) {
            return false;
        }
        self.count += 1;
        true
    }

    fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        let key = value.canonical_key();
        let Some((_, ids)) = self.entries.get_mut(&key) else {
            return false;
        };
        if !ids.remove(&id) {
            return false;
        }
        if ids.is_empty() {
            self.entries.remove(&key);
        }
        self.count -= 1;
        true
    }

    fn exact(&self, value: &Value) -> IdSet {
        self.entries
            .get(&value.canonical_key())
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    fn range(&self, min: &Value, max: &Value) -> IdSet {
        let lo = (!min.is_null()).then(|| min.canonical_key());
        let hi = (!max.is_null()).then(|| max.canonical_key());
        self.entries
            .iter()
            .filter(|(key, _)| {
                lo.as_ref().map_or(true, |lo| key.as_str() >= lo.as_str())
                    && hi.as_ref().map_or(true, |hi| key.as_str() <= hi.as_str())
            })
            .flat_map(|(_, (_, ids))| ids.iter().copied())
            .collect()
    }

    fn pattern(&self, pattern: &Pattern) -> IdSet {
        self.entries
            .values()
            .filter(|(value, _)| pattern.matches(&value.to_text_form()))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    fn contains_id(&self, id: RecordId) -> bool {
        self.entries.values().any(|(_, ids)| ids.contains(&id))
    }

    fn key_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_count(&self) -> usize {
        self.count
    }

    fn approx_bytes(&self) -> usize {
        self.entries
            .keys()
            .map(|key| MAP_NODE_BYTES + 2 * key.len())
            .sum::<usize>()
            + self.count * SET_SLOT_BYTES
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}
