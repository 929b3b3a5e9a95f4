//! HostCompound derive macro implementation

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Ident};

use crate::parse::{parse_host_compound, HostCompoundArgs, HostFieldArgs};

/// Generate the HostCompound implementation
pub fn derive_host_compound(input: DeriveInput) -> TokenStream {
    match parse_host_compound(&input) {
        Ok(args) => generate_impl(args),
        Err(e) => e.write_errors(),
    }
}

fn generate_impl(args: HostCompoundArgs) -> TokenStream {
    let struct_name = &args.ident;
    let type_name = &args.type_name;

    if !args.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &args.generics,
            "HostCompound cannot be derived for generic structs",
        )
        .to_compile_error();
    }
    if !type_name.starts_with('/') {
        return syn::Error::new_spanned(
            struct_name,
            "type_name must be a full type name such as \"/ns/Type\"",
        )
        .to_compile_error();
    }

    let fields = match args.data {
        darling::ast::Data::Struct(fields) => fields.fields,
        _ => {
            return syn::Error::new_spanned(
                &args.ident,
                "HostCompound can only be derived for structs",
            )
            .to_compile_error()
        }
    };

    let constants = fields
        .iter()
        .filter(|f| !f.skip)
        .map(generate_constant);

    let reads = fields.iter().map(generate_read);
    let writes = fields.iter().filter(|f| !f.skip).map(generate_write);

    let doc = format!("Mirror of the `{}` compound", type_name);

    quote! {
        impl #struct_name {
            #[doc = #doc]
            pub const TYPE_NAME: &'static str = #type_name;

            #(#constants)*

            /// Install conversions between the compound and this struct
            ///
            /// Values of the compound convert to this struct on access, and
            /// this struct can be assigned to values of the compound.
            pub fn register_conversions(
                registry: &::typelib_core::convert::ConversionRegistry,
            ) -> ::typelib_core::Result<(
                ::typelib_core::convert::RuleKey,
                ::typelib_core::convert::RuleKey,
            )> {
                let to_host = registry.add_to_host(
                    ::typelib_core::convert::ToHostRule::new(
                        ::typelib_core::convert::TypeMatcher::exact(Self::TYPE_NAME),
                        |value| {
                            let object =
                                <Self as ::typelib_core::convert::ToHost>::to_host(value)?;
                            Ok(::typelib_core::convert::HostValue::custom(object))
                        },
                    )
                    .host_class(::typelib_core::convert::HostClass::of::<Self>()),
                );
                let from_host = registry.from_host::<Self, _>(Self::TYPE_NAME, |object, target| {
                    ::typelib_core::convert::FromHost::from_host(object, target)
                })?;
                Ok((to_host, from_host))
            }
        }

        impl ::typelib_core::convert::ToHost for #struct_name {
            fn to_host(value: &::typelib_core::Value) -> ::typelib_core::Result<Self> {
                Ok(Self {
                    #(#reads)*
                })
            }
        }

        impl ::typelib_core::convert::FromHost for #struct_name {
            fn from_host(&self, target: &::typelib_core::Value) -> ::typelib_core::Result<()> {
                #(#writes)*
                Ok(())
            }
        }
    }
}

fn constant_ident(field: &HostFieldArgs) -> Ident {
    let field_ident = field.ident.as_ref().unwrap();
    let name = field_ident.to_string();
    let clean_name = name.trim_start_matches("r#").trim_start_matches('_');
    format_ident!("{}_FIELD", clean_name.to_uppercase())
}

fn generate_constant(field: &HostFieldArgs) -> TokenStream {
    let const_name = constant_ident(field);
    let compound_name = field.compound_name().unwrap_or_default();
    let doc = format!("Name of the `{}` field", compound_name);

    quote! {
        #[doc = #doc]
        pub const #const_name: &'static str = #compound_name;
    }
}

fn generate_read(field: &HostFieldArgs) -> TokenStream {
    let field_ident = field.ident.as_ref().unwrap();
    let field_ty = &field.ty;

    if field.skip {
        return quote! {
            #field_ident: ::core::default::Default::default(),
        };
    }

    let const_name = constant_ident(field);
    quote! {
        #field_ident: <#field_ty as ::typelib_core::convert::ToHost>::to_host(
            &value.raw_get(Self::#const_name)?,
        )?,
    }
}

fn generate_write(field: &HostFieldArgs) -> TokenStream {
    let field_ident = field.ident.as_ref().unwrap();
    let const_name = constant_ident(field);

    quote! {
        ::typelib_core::convert::FromHost::from_host(
            &self.#field_ident,
            &target.raw_get(Self::#const_name)?,
        )?;
    }
}
