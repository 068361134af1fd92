//! JSON decoding of values and documents.

use crate::encoder::{BYTES_TAG, ID_KEY, UUID_TAG};
use crate::error::{CodecError, CodecResult};
use crate::kind::PropertyKind;
use crate::value::Value;
use serde_json::Map;
use uuid::Uuid;

/// Decodes a JSON value and coerces it to `kind`.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] for malformed wrapped values and
/// [`CodecError::TypeMismatch`] when the result does not fit `kind`.
pub fn from_json(json: &serde_json::Value, kind: PropertyKind) -> CodecResult<Value> {
    kind.coerce(decode_untyped(json)?)
}

fn decode_untyped(json: &serde_json::Value) -> CodecResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(CodecError::decoding_failed(format!("unrepresentable number {n}")))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(decode_untyped)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        serde_json::Value::Object(map) => decode_wrapped(map),
    }
}

fn decode_wrapped(map: &Map<String, serde_json::Value>) -> CodecResult<Value> {
    if map.len() == 1 {
        if let Some(body) = map.get(UUID_TAG).and_then(serde_json::Value::as_str) {
            return Uuid::parse_str(body)
                .map(Value::Uuid)
                .map_err(|e| CodecError::decoding_failed(format!("bad uuid {body:?}: {e}")));
        }
        if let Some(body) = map.get(BYTES_TAG).and_then(serde_json::Value::as_str) {
            return unhex(body).map(Value::Bytes);
        }
    }
    Err(CodecError::decoding_failed("nested objects are not supported"))
}

fn unhex(text: &str) -> CodecResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(CodecError::decoding_failed("odd-length hex string"));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CodecError::decoding_failed(format!("bad hex at offset {i}")))
        })
        .collect()
}

/// Parses a blob into its list of documents.
///
/// # Errors
///
/// Fails if the bytes are not JSON or the top level is not an array. Per
/// element validation is left to [`split_document`] so that one bad
/// element does not spoil the rest.
pub fn decode_document_array(bytes: &[u8]) -> CodecResult<Vec<serde_json::Value>> {
    match serde_json::from_slice(bytes)? {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(CodecError::decoding_failed(format!(
            "expected a JSON array, found {}",
            json_type_name(&other)
        ))),
    }
}

/// Splits a document into its identity and remaining fields.
///
/// # Errors
///
/// Fails if the document is not an object or lacks a positive integer
/// `"id"`.
pub fn split_document(
    document: serde_json::Value,
) -> CodecResult<(u64, Map<String, serde_json::Value>)> {
    let serde_json::Value::Object(mut map) = document else {
        return Err(CodecError::decoding_failed(format!(
            "expected an object, found {}",
            json_type_name(&document)
        )));
    };
    let id = map
        .remove(ID_KEY)
        .and_then(|v| v.as_u64())
        .filter(|id| *id > 0)
        .ok_or_else(|| CodecError::decoding_failed("missing or invalid \"id\""))?;
    Ok((id, map))
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
