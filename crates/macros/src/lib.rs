//! typelib Proc Macros
//!
//! This crate provides proc macros for the typelib runtime:
//!
//! - `#[derive(HostCompound)]` - Mirror a compound type as a Rust struct
//!
//! # HostCompound Example
//!
//! ```ignore
//! use typelib_core::HostCompound;
//!
//! #[derive(Debug, Clone, HostCompound)]
//! #[typelib(type_name = "/geo/Point")]
//! pub struct Point {
//!     pub x: f64,
//!
//!     #[typelib(rename = "y_pos")]
//!     pub y: f64,
//!
//!     #[typelib(skip)]
//!     pub label: String,
//! }
//!
//! // Generated:
//! // - Point::TYPE_NAME == "/geo/Point"
//! // - Point::X_FIELD == "x", Point::Y_FIELD == "y_pos"
//! // - impl ToHost for Point    (value -> Point, field by field)
//! // - impl FromHost for Point  (Point -> value, field by field)
//! // - Point::register_conversions(&registry)
//! ```
//!
//! # Attributes
//!
//! ## Struct Attributes
//!
//! - `#[typelib(type_name = "/ns/Type")]` - **Required.** The compound's full name.
//!
//! ## Field Attributes
//!
//! - `#[typelib(rename = "name")]` - Compound field name, if not the Rust one.
//! - `#[typelib(skip)]` - Not part of the compound; read as `Default::default()`.

mod host_compound;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for Rust mirrors of compound types
///
/// Every field type must implement `ToHost` and `FromHost` (numbers, `bool`,
/// enum symbols as `String`, `Vec<T>`, `[T; N]`, `HostValue` and other
/// `HostCompound` structs). Skipped fields must implement `Default`.
///
/// # Generated Code
///
/// - `TYPE_NAME` and one `<FIELD>_FIELD` constant per mirrored field
/// - `ToHost` and `FromHost` implementations
/// - `register_conversions(&ConversionRegistry)`, installing an exact
///   to-host rule producing `HostValue::custom(Self)` and a from-host rule
///   accepting `Self`
#[proc_macro_derive(HostCompound, attributes(typelib))]
pub fn derive_host_compound(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    host_compound::derive_host_compound(input).into()
}
