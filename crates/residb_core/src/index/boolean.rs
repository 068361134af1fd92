//! Boolean index: two buckets.

use crate::index::pattern::Pattern;
use crate::index::traits::{IndexStrategy, SET_SLOT_BYTES};
use crate::types::{IdSet, RecordId};
use residb_codec::{parse_bool, PropertyKind, Value};

/// Index for boolean properties.
///
/// Values are parsed tolerantly, so `true`, `"yes"`, `"on"` and `1` all
/// land in the same bucket.
#[derive(Debug, Default)]
pub struct BooleanIndex {
    buckets: [IdSet; 2],
}

impl BooleanIndex {
    /// Creates an empty boolean index.
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, flag: bool) -> &IdSet {
        &self.buckets[usize::from(flag)]
    }
}

impl IndexStrategy for BooleanIndex {
    fn kind(&self) -> PropertyKind {
        PropertyKind::Boolean
    }

    fn add(&mut self, value: &Value, id: RecordId) -> bool {
        parse_bool(value).is_some_and(|flag| self.buckets[usize::from(flag)].insert(id))
    }

    fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        parse_bool(value).is_some_and(|flag| self.buckets[usize::from(flag)].remove(&id))
    }

    fn exact(&self, value: &Value) -> IdSet {
        parse_bool(value).map_or_else(IdSet::new, |flag| self.bucket(flag).clone())
    }

    fn range(&self, min: &Value, max: &Value) -> IdSet {
        let lo = parse_bool(min).unwrap_or(false);
        let hi = parse_bool(max).unwrap_or(true);
        [false, true]
            .into_iter()
            .filter(|flag| (lo..=hi).contains(flag))
            .flat_map(|flag| self.bucket(flag).iter().copied())
            .collect()
    }

    fn pattern(&self, pattern: &Pattern) -> IdSet {
        [false, true]
            .into_iter()
            .filter(|flag| pattern.matches(&flag.to_string()))
            .flat_map(|flag| self.bucket(flag).iter().copied())
            .collect()
    }

    fn contains_id(&self, id: RecordId) -> bool {
        self.buckets.iter().any(|ids| ids.contains(&id))
    }

    fn key_count(&self) -> usize {
        self.buckets.iter().filter(|ids| !ids.is_empty()).count()
    }

    fn entry_count(&self) -> usize {
        self.buckets[0].len() + self.buckets[1].len()
    }

    fn approx_bytes(&self) -> usize {
        self.entry_count() * SET_SLOT_BYTES
    }

    fn clear(&mut self) {
        self.buckets[0].clear();
        self.buckets[1].clear();
    }
}
