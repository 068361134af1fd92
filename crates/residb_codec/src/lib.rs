//! # ResiDB Codec
//!
//! Value model and JSON encoding for ResiDB.
//!
//! Records are maps of property name to [`Value`]. Every property declares
//! a [`PropertyKind`]; values are coerced to that kind on write and on
//! load, so `"25"` stored into a numeric property is indexed as `25`.
//!
//! ## Durable form
//!
//! A record type is persisted as one JSON array of objects. Each object
//! holds `"id"` plus the persisted properties. See [`to_json`] for the
//! value mapping.
//!
//! ## Usage
//!
//! ```
//! use residb_codec::{from_json, to_json, PropertyKind, Value};
//!
//! let value = Value::Integer(42);
//! let json = to_json(&value);
//! let back = from_json(&json, PropertyKind::Numeric).unwrap();
//! assert_eq!(value, back);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod kind;
mod number;
mod value;

pub use decoder::{decode_document_array, from_json, split_document};
pub use encoder::{encode_document, encode_document_array, to_json, BYTES_TAG, ID_KEY, UUID_TAG};
pub use error::{CodecError, CodecResult};
pub use kind::{parse_bool, parse_timestamp, PropertyKind};
pub use number::NumericKey;
pub use value::Value;
