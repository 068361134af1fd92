//! Error types for ResiDB core.

use crate::types::RecordId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ResiDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Blob store error.
    #[error("storage error: {0}")]
    Storage(#[from] residb_storage::StorageError),

    /// JSON codec error.
    #[error("codec error: {0}")]
    Codec(#[from] residb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write would break a single-property or composite uniqueness
    /// constraint. Nothing was mutated.
    #[error("constraint violation on {type_name}.{constraint}: {message}")]
    ConstraintViolation {
        /// Record type being written.
        type_name: String,
        /// Property name, or group name for composite constraints.
        constraint: String,
        /// Properties covered by the constraint.
        fields: Vec<String>,
        /// Offending values, in field order.
        values: Vec<String>,
        /// Record already holding the value, when known.
        conflicting_id: Option<RecordId>,
        /// Human-readable message.
        message: String,
    },

    /// No record with this identity.
    #[error("record not found: {type_name} {id}")]
    NotFound {
        /// Record type searched.
        type_name: String,
        /// Identity that was not found.
        id: RecordId,
    },

    /// The record type was never registered.
    #[error("unknown record type: {name}")]
    UnknownType {
        /// Name of the type.
        name: String,
    },

    /// The schema does not declare this property.
    #[error("unknown property {type_name}.{property}")]
    UnknownProperty {
        /// Record type.
        type_name: String,
        /// Property name.
        property: String,
    },

    /// The property exists but is excluded from indexing.
    #[error("no index on {type_name}.{property}")]
    NotIndexed {
        /// Record type.
        type_name: String,
        /// Property name.
        property: String,
    },

    /// A value cannot be stored as the property's declared kind.
    #[error("type mismatch on {type_name}.{property}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Record type.
        type_name: String,
        /// Property name.
        property: String,
        /// Declared kind.
        expected: String,
        /// Description of the offending value.
        found: String,
    },

    /// A schema definition is inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl CoreError {
    /// Creates an unknown type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Creates a not indexed error.
    pub fn not_indexed(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::NotIndexed {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(type_name: impl Into<String>, id: RecordId) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            id,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Attaches type and property context to a codec coercion failure.
    pub(crate) fn from_coercion(
        type_name: &str,
        property: &str,
        err: residb_codec::CodecError,
    ) -> Self {
        match err {
            residb_codec::CodecError::TypeMismatch { expected, found } => Self::TypeMismatch {
                type_name: type_name.to_string(),
                property: property.to_string(),
                expected,
                found,
            },
            other => Self::Codec(other),
        }
    }

    /// Returns true for uniqueness violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use residb_codec::CodecError;

    #[test]
    fn coercion_context() {
        let err = CoreError::from_coercion(
            "User",
            "age",
            CodecError::type_mismatch("numeric", "text \"x\""),
        );
        match err {
            CoreError::TypeMismatch {
                type_name,
                property,
                expected,
                ..
            } => {
                assert_eq!(type_name, "User");
                assert_eq!(property, "age");
                assert_eq!(expected, "numeric");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display() {
        let err = CoreError::not_found("User", RecordId::new(4));
        assert_eq!(err.to_string(), "record not found: User #4");
        assert_eq!(
            CoreError::not_indexed("User", "bio").to_string(),
            "no index on User.bio"
        );
    }
}
