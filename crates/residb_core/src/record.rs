//! Records: an identity plus named property values.

use crate::error::CoreResult;
use crate::types::RecordId;
use residb_codec::{CodecError, Value};
use std::collections::BTreeMap;

/// A record of some record type.
///
/// Fields are kept sorted by name. A property that is absent reads as
/// [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Identity, [`RecordId::UNASSIGNED`] until inserted.
    pub id: RecordId,
    /// Property values by name.
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty, unassigned record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unassigned record from property values.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            id: RecordId::UNASSIGNED,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a property, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the identity, builder style.
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    /// Sets a property.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns a property value, `Null` if absent.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Returns true if the property is present (even if null).
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Extracts a property with `extract`, failing if it returns `None`.
    ///
    /// Handy in [`Entity::from_record`](crate::Entity::from_record):
    ///
    /// ```
    /// # use residb_core::Record;
    /// let record = Record::new().with("age", 30);
    /// let age = record.field("age", |v| v.as_integer()).unwrap();
    /// assert_eq!(age, 30);
    /// assert!(record.field("age", |v| v.as_text()).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a decoding error naming the property.
    pub fn field<'a, T>(
        &'a self,
        name: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> CoreResult<T> {
        let value = self.get(name);
        extract(value).ok_or_else(|| {
            CodecError::decoding_failed(format!(
                "property {name} holds an unexpected {} value",
                value.type_name()
            ))
            .into()
        })
    }
}
