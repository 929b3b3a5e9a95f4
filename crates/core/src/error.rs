//! Error type for value runtime operations

use typelib_engine::EngineError;
use typelib_schema::SchemaError;

use crate::config::ConfigError;

/// Error type for value runtime operations
///
/// Every variant names the type (and field or index) it was raised for.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value was invalidated and can no longer be used
    #[error("Access to invalidated value of type {type_name}")]
    InvalidatedAccess { type_name: String },

    /// Mutation of a frozen value
    #[error("Value of type {type_name} is frozen")]
    FrozenViolation { type_name: String },

    /// Operation does not apply to this type, or the input does not fit it
    #[error("Type mismatch on {type_name}: {reason}")]
    TypeMismatch { type_name: String, reason: String },

    /// Element index past the end
    #[error("Index {index} out of bounds for {type_name} of length {len}")]
    OutOfBounds {
        type_name: String,
        index: usize,
        len: usize,
    },

    /// Compound has no such field
    #[error("{type_name} has no field {field}")]
    NoSuchField { type_name: String, field: String },

    /// More than one conversion rule of the winning priority applies
    #[error("Ambiguous conversion for {type_name}: {candidates} rules apply")]
    AmbiguousConversion { type_name: String, candidates: usize },

    /// Type cannot be modelled (schema build time)
    #[error("Unrepresentable type {name}: {reason}")]
    UnrepresentableType { name: String, reason: String },

    /// A conversion rule or simple-value conversion failed
    #[error("Conversion failed for {type_name}: {reason}")]
    Conversion { type_name: String, reason: String },

    #[error(transparent)]
    Schema(SchemaError),

    #[error(transparent)]
    Engine(EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn mismatch(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

// Schema and engine errors that have a runtime counterpart are surfaced as
// that counterpart so callers match on one taxonomy.

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnrepresentableType { name, reason } => {
                Error::UnrepresentableType { name, reason }
            }
            other => Error::Schema(other),
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::OutOfBounds {
                type_name,
                index,
                len,
            } => Error::OutOfBounds {
                type_name,
                index,
                len,
            },
            EngineError::TypeMismatch { type_name, reason } => {
                Error::TypeMismatch { type_name, reason }
            }
            other => Error::Engine(other),
        }
    }
}

/// Result type for value runtime operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_runtime_taxonomy() {
        let err: Error = EngineError::OutOfBounds {
            type_name: "/std/vector</int32_t>".into(),
            index: 7,
            len: 3,
        }
        .into();
        assert!(matches!(err, Error::OutOfBounds { index: 7, len: 3, .. }));

        let err: Error = EngineError::Truncated {
            needed: 8,
            available: 4,
        }
        .into();
        assert!(matches!(err, Error::Engine(EngineError::Truncated { .. })));
    }

    #[test]
    fn test_unrepresentable_is_surfaced() {
        let err: Error = SchemaError::unrepresentable("/NS/Private", "non-public member x").into();
        assert!(matches!(err, Error::UnrepresentableType { .. }));
        assert!(err.to_string().contains("/NS/Private"));
    }
}
