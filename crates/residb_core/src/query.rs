//! Query composition: predicates to identities to records.

use crate::error::CoreResult;
use crate::index::IndexManager;
use crate::record::Record;
use crate::table::ObjectTable;
use crate::types::{IdSet, RecordId};
use residb_codec::Value;
use std::sync::Arc;

/// One condition on one property.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Property equals value (`Null` matches missing or null values).
    Eq {
        /// Property name.
        property: String,
        /// Value to match, coerced to the property kind.
        value: Value,
    },
    /// Property lies in `[min, max]`; a `Null` bound is open.
    Range {
        /// Property name.
        property: String,
        /// Lower bound.
        min: Value,
        /// Upper bound.
        max: Value,
    },
    /// Property matches a case-insensitive `*` wildcard pattern.
    Pattern {
        /// Property name.
        property: String,
        /// The pattern.
        pattern: String,
    },
}

impl Predicate {
    /// Equality predicate.
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Inclusive range predicate.
    pub fn range(
        property: impl Into<String>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        Self::Range {
            property: property.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    /// Wildcard pattern predicate.
    pub fn pattern(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Pattern {
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    /// The property this predicate reads.
    pub fn property(&self) -> &str {
        match self {
            Self::Eq { property, .. }
            | Self::Range { property, .. }
            | Self::Pattern { property, .. } => property,
        }
    }
}

/// A conjunction of predicates, evaluated in the order they were added.
///
/// ```
/// use residb_core::Query;
///
/// let query = Query::new().eq("team", "core").range("age", 20, 40);
/// assert_eq!(query.predicates().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    predicates: Vec<Predicate>,
}

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::eq(property, value));
        self
    }

    /// Adds an inclusive range condition.
    #[must_use]
    pub fn range(
        mut self,
        property: impl Into<String>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        self.predicates.push(Predicate::range(property, min, max));
        self
    }

    /// Adds a pattern condition.
    #[must_use]
    pub fn pattern(mut self, property: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.predicates.push(Predicate::pattern(property, pattern));
        self
    }

    /// Adds an arbitrary predicate.
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// The predicates in evaluation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

impl From<Vec<Predicate>> for Query {
    fn from(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }
}

/// Resolves index results against the object table.
pub(crate) struct QueryEngine<'a> {
    pub(crate) indexes: &'a IndexManager,
    pub(crate) table: &'a ObjectTable,
}

impl QueryEngine<'_> {
    /// Records for a set of identities, ordered by identity.
    ///
    /// Identities whose record has been deleted since the index was read
    /// are dropped.
    pub(crate) fn resolve(&self, record_type: &str, ids: IdSet) -> Vec<Arc<Record>> {
        let mut ids: Vec<RecordId> = ids.into_iter().collect();
        ids.sort_unstable();
        self.fetch(record_type, &ids)
    }

    /// Records for identities in caller order, skipping missing ones and
    /// repeats.
    pub(crate) fn fetch(&self, record_type: &str, ids: &[RecordId]) -> Vec<Arc<Record>> {
        let mut seen = IdSet::with_capacity(ids.len());
        ids.iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.table.get(record_type, *id))
            .collect()
    }

    pub(crate) fn exact(
        &self,
        record_type: &str,
        property: &str,
        value: &Value,
    ) -> CoreResult<Vec<Arc<Record>>> {
        let ids = self.indexes.exact(record_type, property, value)?;
        Ok(self.resolve(record_type, ids))
    }

    pub(crate) fn range(
        &self,
        record_type: &str,
        property: &str,
        min: &Value,
        max: &Value,
    ) -> CoreResult<Vec<Arc<Record>>> {
        let ids = self.indexes.range(record_type, property, min, max)?;
        Ok(self.resolve(record_type, ids))
    }

    pub(crate) fn pattern(
        &self,
        record_type: &str,
        property: &str,
        pattern: &str,
    ) -> CoreResult<Vec<Arc<Record>>> {
        let ids = self.indexes.pattern(record_type, property, pattern)?;
        Ok(self.resolve(record_type, ids))
    }

    pub(crate) fn query(&self, record_type: &str, query: &Query) -> CoreResult<Vec<Arc<Record>>> {
        let ids = self.indexes.query(record_type, query.predicates())?;
        Ok(self.resolve(record_type, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyDef, TypeSchema};
    use residb_codec::PropertyKind;

    fn setup() -> (IndexManager, ObjectTable) {
        let indexes = IndexManager::new();
        indexes.register(Arc::new(
            TypeSchema::new("Item")
                .property(PropertyDef::new("name", PropertyKind::Text))
                .property(PropertyDef::new("price", PropertyKind::Numeric)),
        ));
        let table = ObjectTable::new();
        for (id, name, price) in [(1, "apple", 3), (2, "apricot", 5), (3, "banana", 3)] {
            let record = Record::new()
                .with("name", name)
                .with("price", price)
                .with_id(RecordId(id));
            indexes.add("Item", &record).unwrap();
            table.insert("Item", Arc::new(record));
        }
        (indexes, table)
    }

    fn names(records: &[Arc<Record>]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.get("name").as_text().unwrap())
            .collect()
    }

    #[test]
    fn results_are_ordered_by_identity() {
        let (indexes, table) = setup();
        let engine = QueryEngine {
            indexes: &indexes,
            table: &table,
        };
        let cheap = engine.exact("Item", "price", &Value::Integer(3)).unwrap();
        assert_eq!(names(&cheap), vec!["apple", "banana"]);

        let query = Query::new().pattern("name", "ap*").range("price", 4, 10);
        assert_eq!(names(&engine.query("Item", &query).unwrap()), vec!["apricot"]);
    }

    #[test]
    fn vanished_records_are_filtered() {
        let (indexes, table) = setup();
        let engine = QueryEngine {
            indexes: &indexes,
            table: &table,
        };
        // Index still holds 1, table no longer does.
        table.remove("Item", RecordId(1));
        let cheap = engine.exact("Item", "price", &Value::Integer(3)).unwrap();
        assert_eq!(names(&cheap), vec!["banana"]);
    }

    #[test]
    fn fetch_dedupes_and_keeps_order() {
        let (indexes, table) = setup();
        let engine = QueryEngine {
            indexes: &indexes,
            table: &table,
        };
        let ids = [RecordId(3), RecordId(1), RecordId(3), RecordId(42)];
        assert_eq!(names(&engine.fetch("Item", &ids)), vec!["banana", "apple"]);
    }

    #[test]
    fn predicate_accessors() {
        assert_eq!(Predicate::eq("a", 1).property(), "a");
        assert_eq!(Predicate::range("b", 1, 2).property(), "b");
        assert_eq!(Predicate::pattern("c", "x*").property(), "c");
        let query: Query = vec![Predicate::eq("a", 1)].into();
        assert_eq!(query.and(Predicate::eq("b", 2)).predicates().len(), 2);
    }
}
