//! Text index: one case-folded ordered map.

use crate::index::pattern::{fold, Pattern};
use crate::index::traits::{IndexStrategy, MAP_NODE_BYTES, SET_SLOT_BYTES};
use crate::types::{IdSet, RecordId};
use residb_codec::{PropertyKind, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Index for text properties.
///
/// Keys are lower-cased text; each key maps identities to the original
/// spelling, so case-sensitive and case-insensitive equality share one
/// map. Ranges compare folded text lexicographically. Pattern queries scan
/// keys, narrowed to the literal prefix when the pattern has one.
#[derive(Debug, Default)]
pub struct TextIndex {
    entries: BTreeMap<String, HashMap<RecordId, String>>,
    count: usize,
}

impl TextIndex {
    /// Creates an empty text index.
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(value: &Value) -> Bound<String> {
        match value.as_text() {
            Some(text) => Bound::Included(fold(text)),
            None => Bound::Unbounded,
        }
    }
}

impl IndexStrategy for TextIndex {
    fn kind(&self) -> PropertyKind {
        PropertyKind::Text
    }

    fn add(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(text) = value.as_text() else {
            return false;
        };
        let slot = self.entries.entry(fold(text)).or_default();
        match slot.insert(id, text.to_string()) {
            None => {
                self.count += 1;
                true
            }
            Some(previous) => previous != text,
        }
    }

    fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(text) = value.as_text() else {
            return false;
        };
        let key = fold(text);
        let Some(slot) = self.entries.get_mut(&key) else {
            return false;
        };
        if slot.get(&id).map(String::as_str) != Some(text) {
            return false;
        }
        slot.remove(&id);
        self.count -= 1;
        if slot.is_empty() {
            self.entries.remove(&key);
        }
        true
    }

    fn exact(&self, value: &Value) -> IdSet {
        let Some(text) = value.as_text() else {
            return IdSet::new();
        };
        self.entries.get(&fold(text)).map_or_else(IdSet::new, |slot| {
            slot.iter()
                .filter(|(_, original)| original.as_str() == text)
                .map(|(id, _)| *id)
                .collect()
        })
    }

    fn exact_ignore_case(&self, value: &Value) -> IdSet {
        let Some(text) = value.as_text() else {
            return IdSet::new();
        };
        self.entries
            .get(&fold(text))
            .map_or_else(IdSet::new, |slot| slot.keys().copied().collect())
    }

    fn range(&self, min: &Value, max: &Value) -> IdSet {
        let lower = Self::bound(min);
        let upper = Self::bound(max);
        if let (Bound::Included(lo), Bound::Included(hi)) = (&lower, &upper) {
            if lo > hi {
                return IdSet::new();
            }
        }
        self.entries
            .range((lower, upper))
            .flat_map(|(_, slot)| slot.keys().copied())
            .collect()
    }

    fn pattern(&self, pattern: &Pattern) -> IdSet {
        match pattern.literal_prefix() {
            Some(prefix) => matching_ids(
                self.entries
                    .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(|(key, _)| key.starts_with(prefix)),
                pattern,
            ),
            None => matching_ids(self.entries.iter(), pattern),
        }
    }

    fn contains_id(&self, id: RecordId) -> bool {
        self.entries.values().any(|slot| slot.contains_key(&id))
    }

    fn key_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_count(&self) -> usize {
        self.count
    }

    fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, slot)| {
                MAP_NODE_BYTES
                    + key.len()
                    + slot
                        .values()
                        .map(|original| SET_SLOT_BYTES + original.len())
                        .sum::<usize>()
            })
            .sum()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}

fn matching_ids<'a, I>(candidates: I, pattern: &Pattern) -> IdSet
where
    I: Iterator<Item = (&'a String, &'a HashMap<RecordId, String>)>,
{
    candidates
        .filter(|(key, _)| pattern.matches_folded(key))
        .flat_map(|(_, slot)| slot.keys().copied())
        .collect()
}
