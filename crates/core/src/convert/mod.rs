//! Conversion between typelib values and host values
//!
//! ```text
//!            to-host rules                     from-host rules
//!   Value ────────────────────► HostValue ─────────────────────► Value
//!          (matcher → transform)          (class + matcher → transform)
//! ```
//!
//! Rules live in a [`ConversionRegistry`]; a process-wide one is returned
//! by [`ConversionRegistry::global`], and a runtime can be given its own.

mod host;
mod matcher;
mod registry;
mod traits;

pub use host::{CustomValue, HostClass, HostValue};
pub use matcher::{MatchClass, TypeMatcher, TypePredicate};
pub use registry::{
    ConversionRegistry, FromHostFn, FromHostRule, Resolution, RuleKey, ToHostFn, ToHostPlan,
    ToHostRule,
};
pub use traits::{FromHost, ToHost};
