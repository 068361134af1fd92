//! The index strategy trait.

use crate::index::pattern::Pattern;
use crate::index::temporal::CalendarBucket;
use crate::types::{IdSet, RecordId};
use residb_codec::{PropertyKind, Value};

/// Per-property index algorithm.
///
/// A strategy maps non-null values to sets of record identities. Nulls are
/// tracked by the caller. Values handed to a strategy have already been
/// coerced to its kind; values it cannot key are ignored.
///
/// `add` and `remove` are idempotent: adding a present pair or removing an
/// absent one changes nothing and returns false.
pub trait IndexStrategy: Send + Sync {
    /// The property kind this strategy serves.
    fn kind(&self) -> PropertyKind;

    /// Adds a value/identity pair.
    fn add(&mut self, value: &Value, id: RecordId) -> bool;

    /// Removes a value/identity pair.
    fn remove(&mut self, value: &Value, id: RecordId) -> bool;

    /// Identities whose value equals `value`.
    fn exact(&self, value: &Value) -> IdSet;

    /// Like [`exact`](Self::exact) but ignoring letter case. Only differs
    /// for text.
    fn exact_ignore_case(&self, value: &Value) -> IdSet {
        self.exact(value)
    }

    /// Identities whose value lies in `[min, max]`. `Null` leaves that end
    /// unbounded.
    fn range(&self, min: &Value, max: &Value) -> IdSet;

    /// Identities whose value's text form matches `pattern`.
    fn pattern(&self, pattern: &Pattern) -> IdSet;

    /// Identities in a calendar bucket. `None` if the strategy has no
    /// calendar buckets.
    fn calendar(&self, _bucket: CalendarBucket) -> Option<IdSet> {
        None
    }

    /// Returns true if any key maps to `id`.
    fn contains_id(&self, id: RecordId) -> bool;

    /// Number of distinct keys.
    fn key_count(&self) -> usize;

    /// Number of value/identity pairs.
    fn entry_count(&self) -> usize;

    /// Rough heap usage in bytes.
    fn approx_bytes(&self) -> usize;

    /// Removes everything.
    fn clear(&mut self);
}

/// Approximate per-entry overhead of a hash set slot.
pub(crate) const SET_SLOT_BYTES: usize = std::mem::size_of::<RecordId>() + 8;

/// Approximate per-key overhead of a map node.
pub(crate) const MAP_NODE_BYTES: usize = 48;

/// Inserts into a set stored under `key`, creating the set if needed.
pub(crate) fn insert_id<K, M>(map: &mut M, key: K, id: RecordId) -> bool
where
    M: MapLike<K>,
{
    map.slot(key).insert(id)
}

/// Removes `id` from the set under `key`, dropping the set once empty.
pub(crate) fn remove_id<K, M>(map: &mut M, key: &K, id: RecordId) -> bool
where
    M: MapLike<K>,
{
    let Some(set) = map.existing(key) else {
        return false;
    };
    if !set.remove(&id) {
        return false;
    }
    if set.is_empty() {
        map.drop_key(key);
    }
    true
}

/// The few map operations the id-set helpers need.
pub(crate) trait MapLike<K> {
    fn slot(&mut self, key: K) -> &mut IdSet;
    fn existing(&mut self, key: &K) -> Option<&mut IdSet>;
    fn drop_key(&mut self, key: &K);
}

impl<K: std::hash::Hash + Eq> MapLike<K> for std::collections::HashMap<K, IdSet> {
    fn slot(&mut self, key: K) -> &mut IdSet {
        self.entry(key).or_default()
    }

    fn existing(&mut self, key: &K) -> Option<&mut IdSet> {
        self.get_mut(key)
    }

    fn drop_key(&mut self, key: &K) {
        self.remove(key);
    }
}

impl<K: Ord> MapLike<K> for std::collections::BTreeMap<K, IdSet> {
    fn slot(&mut self, key: K) -> &mut IdSet {
        self.entry(key).or_default()
    }

    fn existing(&mut self, key: &K) -> Option<&mut IdSet> {
        self.get_mut(key)
    }

    fn drop_key(&mut self, key: &K) {
        self.remove(key);
    }
}
