//! Temporal index: ordered timestamps plus calendar buckets.

use crate::index::pattern::Pattern;
use crate::index::traits::{insert_id, remove_id, IndexStrategy, MAP_NODE_BYTES, SET_SLOT_BYTES};
use crate::types::{IdSet, RecordId};
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use residb_codec::{PropertyKind, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// A calendar-aligned slice of time, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarBucket {
    /// A whole year.
    Year(i32),
    /// A month of a year, `1..=12`.
    Month(i32, u32),
    /// A single day.
    Day(NaiveDate),
}

/// Index for temporal properties.
///
/// Range scans use the ordered map. Year, month and day lookups are served
/// by three bucket maps kept alongside it, so calendar queries do not scan.
#[derive(Debug, Default)]
pub struct TemporalIndex {
    ordered: BTreeMap<DateTime<Utc>, IdSet>,
    by_year: HashMap<i32, IdSet>,
    by_month: HashMap<(i32, u32), IdSet>,
    by_day: HashMap<NaiveDate, IdSet>,
    count: usize,
}

impl TemporalIndex {
    /// Creates an empty temporal index.
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(value: &Value) -> Bound<DateTime<Utc>> {
        value.as_timestamp().map_or(Bound::Unbounded, Bound::Included)
    }
}

impl IndexStrategy for TemporalIndex {
    fn kind(&self) -> PropertyKind {
        PropertyKind::Temporal
    }

    fn add(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(at) = value.as_timestamp() else {
            return false;
        };
        if !insert_id(&mut self.ordered, at, id) {
            return false;
        }
        insert_id(&mut self.by_year, at.year(), id);
        insert_id(&mut self.by_month, (at.year(), at.month()), id);
        insert_id(&mut self.by_day, at.date_naive(), id);
        self.count += 1;
        true
    }

    fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        let Some(at) = value.as_timestamp() else {
            return false;
        };
        if !remove_id(&mut self.ordered, &at, id) {
            return false;
        }
        remove_id(&mut self.by_year, &at.year(), id);
        remove_id(&mut self.by_month, &(at.year(), at.month()), id);
        remove_id(&mut self.by_day, &at.date_naive(), id);
        self.count -= 1;
        true
    }

    fn exact(&self, value: &Value) -> IdSet {
        value
            .as_timestamp()
            .and_then(|at| self.ordered.get(&at))
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
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    fn pattern(&self, pattern: &Pattern) -> IdSet {
        self.ordered
            .iter()
            .filter(|(at, _)| pattern.matches(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    fn calendar(&self, bucket: CalendarBucket) -> Option<IdSet> {
        let ids = match bucket {
            CalendarBucket::Year(year) => self.by_year.get(&year),
            CalendarBucket::Month(year, month) => self.by_month.get(&(year, month)),
            CalendarBucket::Day(day) => self.by_day.get(&day),
        };
        Some(ids.cloned().unwrap_or_default())
    }

    fn contains_id(&self, id: RecordId) -> bool {
        self.ordered.values().any(|ids| ids.contains(&id))
    }

    fn key_count(&self) -> usize {
        self.ordered.len()
    }

    fn entry_count(&self) -> usize {
        self.count
    }

    fn approx_bytes(&self) -> usize {
        let buckets = self.by_year.len() + self.by_month.len() + self.by_day.len();
        (self.ordered.len() + buckets) * MAP_NODE_BYTES + self.count * 4 * SET_SLOT_BYTES
    }

    fn clear(&mut self) {
        self.ordered.clear();
        self.by_year.clear();
        self.by_month.clear();
        self.by_day.clear();
        self.count = 0;
    }
}
