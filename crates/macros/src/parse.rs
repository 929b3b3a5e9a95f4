//! Attribute parsing for the HostCompound derive macro

use darling::{FromDeriveInput, FromField};
use syn::{DeriveInput, Generics, Ident, Type};

/// Parsed #[typelib(...)] attributes on the struct
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(typelib), supports(struct_named))]
pub struct HostCompoundArgs {
    /// Struct identifier
    pub ident: Ident,

    pub generics: Generics,

    /// Struct fields
    pub data: darling::ast::Data<(), HostFieldArgs>,

    /// Full name of the compound type (e.g., "/geo/Point")
    pub type_name: String,
}

/// Parsed #[typelib(...)] attributes on a field
#[derive(Debug, FromField)]
#[darling(attributes(typelib))]
pub struct HostFieldArgs {
    /// Field identifier
    pub ident: Option<Ident>,

    /// Field type
    pub ty: Type,

    /// Compound field name, when it differs from the Rust one
    #[darling(default)]
    pub rename: Option<String>,

    /// Not mirrored in the compound; filled with `Default::default()`
    #[darling(default)]
    pub skip: bool,
}

impl HostFieldArgs {
    /// Name of the compound field this Rust field maps to
    pub fn compound_name(&self) -> Option<String> {
        match &self.rename {
            Some(name) => Some(name.clone()),
            None => self
                .ident
                .as_ref()
                .map(|ident| ident.to_string().trim_start_matches("r#").to_string()),
        }
    }
}

/// Parse a DeriveInput into HostCompoundArgs
pub fn parse_host_compound(input: &DeriveInput) -> darling::Result<HostCompoundArgs> {
    HostCompoundArgs::from_derive_input(input)
}
