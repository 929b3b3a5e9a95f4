//! typelib schema - Type Registry and Type Definitions
//!
//! This crate holds the schema side of typelib: immutable type definitions
//! describing C/C++-compatible layouts, and the registry that owns them.
//! It has no knowledge of memory; the engine and core crates consume it.
//!
//! # Modules
//!
//! - [`definition`] - [`TypeDefinition`] and its kind payloads
//! - [`registry`] - [`Registry`]: lookup, construction, aliasing, resizing
//! - [`import`] - batch registration with per-entry failure isolation
//! - [`name`] - name conventions (`T[N]`, `T*`, `K<T>`)
//! - [`metadata`] - free-form multi-value metadata
//!
//! # Example
//!
//! ```
//! use typelib_schema::{CompoundBuilder, Registry};
//!
//! let mut registry = Registry::with_standard_types();
//! let point = registry
//!     .create_compound(
//!         CompoundBuilder::new("/geo/Point")
//!             .field("x", "/double")
//!             .field("y", "/double"),
//!     )
//!     .unwrap();
//! assert_eq!(point.size(), 16);
//! assert_eq!(point.field("y").unwrap().offset(), 8);
//! ```

pub mod builder;
pub mod definition;
pub mod error;
pub mod import;
pub mod metadata;
pub mod name;
pub mod registry;

pub use builder::{CompoundBuilder, FieldDecl};
pub use definition::{
    align_up, CompoundDef, EnumDef, Field, NumericCategory, Specialization, TypeDefinition,
    TypeFlags, TypeKind, TypeUid, DEFAULT_CONTAINER_SIZE, POINTER_SIZE,
};
pub use error::{SchemaError, SchemaResult};
pub use import::{CompoundSpec, FieldAccess, FieldSpec, ImportReport, TypeSpec};
pub use metadata::MetaData;
pub use registry::{Registry, STD_VECTOR};
