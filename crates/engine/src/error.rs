//! Error types for memory engine operations

use crate::address::Address;

/// Error type for memory engine operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Address range does not lie inside a live block
    #[error("Invalid address {address} (+{len} bytes)")]
    InvalidAddress { address: Address, len: usize },

    /// Element index past the end of a container
    #[error("Index {index} out of bounds for {type_name} of length {len}")]
    OutOfBounds {
        type_name: String,
        index: usize,
        len: usize,
    },

    /// Operation applied to a type of the wrong kind
    #[error("Type mismatch on {type_name}: {reason}")]
    TypeMismatch { type_name: String, reason: String },

    /// The engine cannot perform the operation on this type
    #[error("Unsupported operation on {type_name}: {reason}")]
    Unsupported { type_name: String, reason: String },

    /// Byte buffer ended before the value was complete
    #[error("Buffer truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Byte buffer does not have the size the type requires
    #[error("Invalid size for {type_name}: expected {expected} bytes, got {actual}")]
    InvalidSize {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    /// Element buffer past the engine's allocation limit or address range
    #[error("Cannot address {count} elements of {element_size} bytes")]
    TooLarge { count: usize, element_size: usize },
}

impl EngineError {
    pub(crate) fn mismatch(type_name: &str, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(type_name: &str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
