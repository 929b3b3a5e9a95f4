//! typelib - Core value runtime
//!
//! This crate provides typed, mutable views (proxies) over memory owned by a
//! [`MemoryEngine`](engine::MemoryEngine), described by the type definitions
//! of a [`Registry`](schema::Registry).
//!
//! ```text
//!   ┌──────────────┐   type defs   ┌───────────┐   host values   ┌─────────┐
//!   │  Registry    │──────────────►│  Value    │◄───────────────►│   app   │
//!   │  (schema)    │               │  proxies  │   conversions   │         │
//!   └──────────────┘               └─────┬─────┘                 └─────────┘
//!                                        │ reads / writes / container ops
//!                                        ▼
//!                                  ┌───────────┐
//!                                  │  engine   │
//!                                  └───────────┘
//! ```
//!
//! # Re-exports
//!
//! - [`schema`] - Type definitions and the type registry
//! - [`engine`] - Memory engine contract and the reference heap engine
//!
//! # Example
//!
//! ```ignore
//! use typelib_core::schema::{CompoundBuilder, Registry};
//! use typelib_core::Runtime;
//!
//! let mut registry = Registry::with_standard_types();
//! registry.create_compound(
//!     CompoundBuilder::new("/Pose")
//!         .field("position", "/double[3]")
//!         .field("trail", "/std/vector</double>"),
//! )?;
//!
//! let runtime = Runtime::new(registry);
//! let pose = runtime.new_value("/Pose")?;
//! pose.set("position", vec![1.0, 2.0, 3.0])?;
//! pose.raw_get("trail")?.push(0.5)?;
//! ```

// Allow the crate to refer to itself as `typelib_core` for proc macro compatibility
extern crate self as typelib_core;

// Re-export schema and engine crates
pub use typelib_engine as engine;
pub use typelib_schema as schema;

pub mod accessor;
pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod simple;
pub mod value;

// Re-export commonly used items
pub use accessor::{Accessor, Path, Step};
pub use config::{ConfigError, ConfigResult, CoreConfig};
pub use convert::{
    ConversionRegistry, FromHost, HostClass, HostValue, Resolution, ToHost, TypeMatcher,
};
pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeBuilder};
pub use simple::{SimpleValueOptions, SpecialFloats};
pub use value::{Key, StateFlags, Value};

// Re-export the derive macro
pub use typelib_macros::HostCompound;
