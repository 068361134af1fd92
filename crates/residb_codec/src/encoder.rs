//! JSON encoding of values and documents.
//!
//! The durable format is plain JSON. Values map onto their natural JSON
//! form with two exceptions that would otherwise lose their type:
//!
//! | Value       | JSON                         |
//! |-------------|------------------------------|
//! | `Uuid`      | `{"$uuid": "<hyphenated>"}`  |
//! | `Bytes`     | `{"$bytes": "<hex>"}`        |
//!
//! Timestamps are written as RFC 3339 strings and recovered by the
//! declared [`PropertyKind`](crate::PropertyKind) on decode.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use chrono::SecondsFormat;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number};

/// Object key marking a wrapped uuid.
pub const UUID_TAG: &str = "$uuid";
/// Object key marking a wrapped byte string.
pub const BYTES_TAG: &str = "$bytes";
/// Key holding the record identity inside a document.
pub const ID_KEY: &str = "id";

/// Converts a value into its JSON form.
///
/// Non-finite floats become `null`, matching what `serde_json` does for
/// `f64`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Float(f) => {
            Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Timestamp(t) => {
            serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        Value::Uuid(u) => tagged(UUID_TAG, u.hyphenated().to_string()),
        Value::Bytes(_) => tagged(BYTES_TAG, value.to_text_form()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
    }
}

fn tagged(tag: &str, body: String) -> serde_json::Value {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), serde_json::Value::String(body));
    serde_json::Value::Object(map)
}

/// Builds the JSON object for one record: `"id"` followed by its fields.
///
/// A field literally named `id` is skipped; the identity always wins.
pub fn encode_document<'a, I>(id: u64, fields: I) -> serde_json::Value
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut map = Map::new();
    map.insert(ID_KEY.to_string(), serde_json::Value::Number(Number::from(id)));
    for (name, value) in fields {
        if name != ID_KEY {
            map.insert(name.to_string(), to_json(value));
        }
    }
    serde_json::Value::Object(map)
}

/// Serializes a list of documents as one JSON array.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn encode_document_array(documents: &[serde_json::Value]) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(documents).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn scalars() {
        assert_eq!(to_json(&Value::Null), json!(null));
        assert_eq!(to_json(&Value::Bool(true)), json!(true));
        assert_eq!(to_json(&Value::Integer(-7)), json!(-7));
        assert_eq!(to_json(&Value::Float(1.5)), json!(1.5));
        assert_eq!(to_json(&Value::Float(f64::NAN)), json!(null));
        assert_eq!(to_json(&Value::from("hi")), json!("hi"));
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(to_json(&Value::Timestamp(t)), json!("2024-01-15T08:00:00Z"));
    }

    #[test]
    fn wrapped_variants() {
        let id = Uuid::nil();
        assert_eq!(
            to_json(&Value::Uuid(id)),
            json!({ "$uuid": "00000000-0000-0000-0000-000000000000" })
        );
        assert_eq!(
            to_json(&Value::Bytes(vec![0xca, 0xfe])),
            json!({ "$bytes": "cafe" })
        );
    }

    #[test]
    fn document_shape() {
        let name = Value::from("alice");
        let shadow = Value::Integer(99);
        let doc = encode_document(3, vec![("name", &name), ("id", &shadow)]);
        assert_eq!(doc, json!({ "id": 3, "name": "alice" }));
    }

    #[test]
    fn array_bytes() {
        let docs = vec![json!({"id": 1}), json!({"id": 2})];
        let bytes = encode_document_array(&docs).unwrap();
        assert_eq!(bytes, br#"[{"id":1},{"id":2}]"#.to_vec());
    }

    #[test]
    fn serde_serialize_uses_json_form() {
        let v = Value::Array(vec![Value::Integer(1), Value::from("x")]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[1,"x"]"#);
    }
}
