//! Error types for registry operations

/// Error type for schema construction and lookup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// No type registered under this name
    #[error("Type not found: {0}")]
    NotFound(String),

    /// A type with this name already exists
    #[error("Type already defined: {0}")]
    AlreadyDefined(String),

    /// Name does not follow the `/namespace/name` convention
    #[error("Invalid type name: {0}")]
    InvalidName(String),

    /// The type cannot be modelled structurally (private members, bases, ...)
    #[error("Unrepresentable type {name}: {reason}")]
    UnrepresentableType { name: String, reason: String },

    /// Container instantiation for an undeclared container kind
    #[error("Unknown container kind: {0}")]
    UnknownContainerKind(String),

    /// Size change that the type's layout cannot accommodate
    #[error("Cannot resize {name} to {size} bytes: {reason}")]
    InvalidResize {
        name: String,
        size: usize,
        reason: String,
    },
}

impl SchemaError {
    /// Shorthand for [`SchemaError::UnrepresentableType`]
    pub fn unrepresentable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnrepresentableType {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
