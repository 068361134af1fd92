//! Declared property kinds and value coercion.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

/// The declared value kind of a property.
///
/// The kind decides which index strategy a property gets and how incoming
/// values are normalized before they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Text, ordered lexicographically, searchable by pattern.
    Text,
    /// Any integer or floating point number.
    Numeric,
    /// Points in time.
    Temporal,
    /// True/false, with tolerant parsing.
    Boolean,
    /// Anything else, compared structurally.
    Other,
}

impl PropertyKind {
    /// Lower-case name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::Text => "text",
            PropertyKind::Numeric => "numeric",
            PropertyKind::Temporal => "temporal",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Other => "other",
        }
    }

    /// Converts `value` into the canonical representation for this kind.
    ///
    /// Null is accepted by every kind. Numeric text becomes a number,
    /// RFC 3339 or `YYYY-MM-DD` text becomes a timestamp, and the usual
    /// truthy/falsy spellings become booleans.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] when the value cannot be
    /// represented as this kind.
    pub fn coerce(self, value: Value) -> CodecResult<Value> {
        if value.is_null() {
            return Ok(value);
        }

        let mismatch = |v: &Value| CodecError::type_mismatch(self.as_str(), describe(v));

        match self {
            PropertyKind::Other => Ok(value),
            PropertyKind::Text => match value {
                Value::Text(_) => Ok(value),
                other => Err(mismatch(&other)),
            },
            PropertyKind::Numeric => match value {
                Value::Integer(_) => Ok(value),
                Value::Float(f) if f.is_finite() => Ok(value),
                Value::Text(ref s) => parse_number(s).ok_or_else(|| mismatch(&value)),
                other => Err(mismatch(&other)),
            },
            PropertyKind::Temporal => match value {
                Value::Timestamp(_) => Ok(value),
                Value::Text(ref s) => parse_timestamp(s)
                    .map(Value::Timestamp)
                    .ok_or_else(|| mismatch(&value)),
                other => Err(mismatch(&other)),
            },
            PropertyKind::Boolean => parse_bool(&value)
                .map(Value::Bool)
                .ok_or_else(|| mismatch(&value)),
        }
    }

    /// Returns true if `value` can be coerced to this kind.
    pub fn accepts(self, value: &Value) -> bool {
        self.coerce(value.clone()).is_ok()
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("text {s:?}"),
        other => format!("{} {}", other.type_name(), other.to_text_form()),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(Value::Integer(n));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Value::Float(f)),
        _ => None,
    }
}

/// Parses RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare date.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Tolerant boolean parsing.
///
/// Accepts real booleans, any number (non-zero is true) and the text forms
/// `true/false`, `t/f`, `yes/no`, `y/n`, `on/off`, `1/0`, case-insensitive.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Integer(n) => Some(*n != 0),
        Value::Float(f) if !f.is_nan() => Some(*f != 0.0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
