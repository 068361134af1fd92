//! Blob layout for one record type.
//!
//! A type is stored as a JSON array of objects, each holding `"id"` and the
//! type's persisted properties in declaration order.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::TypeSchema;
use crate::types::RecordId;
use residb_codec::{
    decode_document_array, encode_document, encode_document_array, from_json, split_document,
};
use std::sync::Arc;
use tracing::warn;

/// Suffix of every type blob.
pub const BLOB_SUFFIX: &str = ".json";

/// Blob name for a record type.
///
/// Characters outside `[A-Za-z0-9_-]` are replaced with `_`, so the name
/// is always a valid single path component.
pub fn blob_name(record_type: &str) -> String {
    let mut name: String = record_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        name.push('_');
    }
    name.push_str(BLOB_SUFFIX);
    name
}

/// Serializes a snapshot of records.
///
/// # Errors
///
/// Returns a codec error if serialization fails.
pub fn encode_snapshot(schema: &TypeSchema, records: &[Arc<Record>]) -> CoreResult<Vec<u8>> {
    let persisted: Vec<&str> = schema
        .persisted_properties()
        .map(|p| p.name.as_str())
        .collect();

    let documents: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            encode_document(
                record.id.as_u64(),
                persisted.iter().map(|name| (*name, record.get(name))),
            )
        })
        .collect();

    Ok(encode_document_array(&documents)?)
}

/// Records decoded from a blob.
#[derive(Debug, Default)]
pub struct DecodedSnapshot {
    /// Records that decoded cleanly, in blob order.
    pub records: Vec<Record>,
    /// Number of elements that were dropped.
    pub skipped: usize,
}

/// Decodes a blob written by [`encode_snapshot`].
///
/// Every persisted property is coerced to its declared kind; a property
/// missing from the document, and every non-persisted property, takes its
/// declared default. Elements that fail to decode are logged and skipped.
///
/// # Errors
///
/// Fails only if the blob as a whole is not a JSON array.
pub fn decode_snapshot(schema: &TypeSchema, bytes: &[u8]) -> CoreResult<DecodedSnapshot> {
    let documents = decode_document_array(bytes)?;
    let mut decoded = DecodedSnapshot {
        records: Vec::with_capacity(documents.len()),
        skipped: 0,
    };

    for (position, document) in documents.into_iter().enumerate() {
        match decode_record(schema, document) {
            Ok(record) => decoded.records.push(record),
            Err(error) => {
                warn!(
                    record_type = %schema.name,
                    position,
                    error = %error,
                    "skipping undecodable record"
                );
                decoded.skipped += 1;
            }
        }
    }
    Ok(decoded)
}

fn decode_record(schema: &TypeSchema, document: serde_json::Value) -> CoreResult<Record> {
    let (id, mut fields) = split_document(document)?;
    let mut record = Record::new().with_id(RecordId::new(id));

    for def in &schema.properties {
        let value = match fields.remove(&def.name) {
            Some(json) if def.persisted => from_json(&json, def.kind)
                .map_err(|e| CoreError::from_coercion(&schema.name, &def.name, e))?,
            _ => def.default.clone(),
        };
        record.fields.insert(def.name.clone(), value);
    }
    Ok(record)
}
