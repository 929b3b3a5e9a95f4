//! Batch registration of importer output
//!
//! Header importers hand over whole translation units. Large headers
//! routinely contain types that cannot be modelled (base classes, private
//! members, ...); such an entry is skipped and reported, the rest of the
//! batch is still registered. Entries that depend on a skipped entry fail
//! with [`SchemaError::NotFound`] and are skipped too.

use tracing::{info, warn};

use crate::builder::{CompoundBuilder, FieldDecl};
use crate::definition::NumericCategory;
use crate::error::{SchemaError, SchemaResult};
use crate::metadata::MetaData;
use crate::registry::Registry;

/// C++ member access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldAccess {
    #[default]
    Public,
    Protected,
    Private,
}

/// Field as reported by an importer
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub type_name: String,
    pub offset: Option<usize>,
    pub access: FieldAccess,
    pub metadata: MetaData,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            offset: None,
            access: FieldAccess::Public,
            metadata: MetaData::new(),
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn access(mut self, access: FieldAccess) -> Self {
        self.access = access;
        self
    }
}

/// Compound as reported by an importer
#[derive(Debug, Clone, Default)]
pub struct CompoundSpec {
    pub name: String,
    pub size: Option<usize>,
    /// Base classes; inheritance is not modelled
    pub bases: Vec<String>,
    pub fields: Vec<FieldSpec>,
    pub metadata: MetaData,
}

/// One importer entry
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Numeric {
        name: String,
        category: NumericCategory,
        size: usize,
    },
    Enum {
        name: String,
        size: usize,
        values: Vec<(String, i64)>,
    },
    Compound(CompoundSpec),
    Opaque {
        name: String,
        size: usize,
    },
    Alias {
        name: String,
        target: String,
    },
    Array {
        element: String,
        len: usize,
    },
    Container {
        kind: String,
        element: String,
    },
    Pointer {
        target: String,
    },
}

impl TypeSpec {
    /// Name the entry registers
    pub fn name(&self) -> String {
        match self {
            TypeSpec::Numeric { name, .. }
            | TypeSpec::Enum { name, .. }
            | TypeSpec::Opaque { name, .. }
            | TypeSpec::Alias { name, .. } => name.clone(),
            TypeSpec::Compound(spec) => spec.name.clone(),
            TypeSpec::Array { element, len } => crate::name::array_name(element, *len),
            TypeSpec::Container { kind, element } => crate::name::container_name(kind, element),
            TypeSpec::Pointer { target } => crate::name::pointer_name(target),
        }
    }
}

/// Outcome of [`Registry::import`]
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Names registered, in batch order
    pub registered: Vec<String>,
    /// Entries that were skipped and why
    pub skipped: Vec<(String, SchemaError)>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn skipped_names(&self) -> impl Iterator<Item = &str> {
        self.skipped.iter().map(|(name, _)| name.as_str())
    }
}

impl Registry {
    /// Register a batch of importer entries
    ///
    /// Each entry either registers completely or not at all; a failing entry
    /// never aborts the batch.
    pub fn import(&mut self, specs: impl IntoIterator<Item = TypeSpec>) -> ImportReport {
        let mut report = ImportReport::default();

        for spec in specs {
            let name = spec.name();
            match self.import_one(spec) {
                Ok(()) => report.registered.push(name),
                Err(err) => {
                    warn!("Skipping {}: {}", name, err);
                    report.skipped.push((name, err));
                }
            }
        }

        info!(
            "Imported {} types ({} skipped)",
            report.registered.len(),
            report.skipped.len()
        );
        report
    }

    fn import_one(&mut self, spec: TypeSpec) -> SchemaResult<()> {
        match spec {
            TypeSpec::Numeric {
                name,
                category,
                size,
            } => self.create_numeric(&name, category, size).map(drop),
            TypeSpec::Enum { name, size, values } => self.create_enum(&name, size, values).map(drop),
            TypeSpec::Compound(spec) => self.import_compound(spec),
            TypeSpec::Opaque { name, size } => self.create_opaque(&name, size).map(drop),
            TypeSpec::Alias { name, target } => self.alias(&name, &target),
            TypeSpec::Array { element, len } => self.create_array(&element, len).map(drop),
            TypeSpec::Container { kind, element } => {
                self.create_container(&kind, &element).map(drop)
            }
            TypeSpec::Pointer { target } => self.create_pointer(&target).map(drop),
        }
    }

    fn import_compound(&mut self, spec: CompoundSpec) -> SchemaResult<()> {
        if !spec.bases.is_empty() {
            return Err(SchemaError::unrepresentable(
                &spec.name,
                format!("inherits from {}", spec.bases.join(", ")),
            ));
        }
        if let Some(field) = spec
            .fields
            .iter()
            .find(|f| f.access != FieldAccess::Public)
        {
            return Err(SchemaError::unrepresentable(
                &spec.name,
                format!("non-public member {}", field.name),
            ));
        }

        // Resolve every field type before registering anything under the
        // compound's name
        for field in &spec.fields {
            self.build(&field.type_name)?;
        }

        let mut builder = CompoundBuilder::new(spec.name);
        builder.metadata = spec.metadata;
        builder.size = spec.size;
        for field in spec.fields {
            builder = builder.field_decl(FieldDecl {
                name: field.name,
                type_name: field.type_name,
                offset: field.offset,
                metadata: field.metadata,
            });
        }
        self.create_compound(builder).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(name: &str, fields: Vec<FieldSpec>) -> TypeSpec {
        TypeSpec::Compound(CompoundSpec {
            name: name.into(),
            fields,
            ..Default::default()
        })
    }

    #[test]
    fn test_import_skips_only_offending_entries() {
        let mut registry = Registry::with_standard_types();
        let report = registry.import(vec![
            compound("/NS/Good", vec![FieldSpec::new("x", "/float")]),
            compound(
                "/NS/Private",
                vec![FieldSpec::new("secret", "/int32_t").access(FieldAccess::Private)],
            ),
            TypeSpec::Compound(CompoundSpec {
                name: "/NS/Derived".into(),
                bases: vec!["/NS/Good".into()],
                ..Default::default()
            }),
            compound("/NS/UsesPrivate", vec![FieldSpec::new("p", "/NS/Private")]),
            compound("/NS/AlsoGood", vec![FieldSpec::new("g", "/NS/Good[2]")]),
        ]);

        assert_eq!(report.registered, ["/NS/Good", "/NS/AlsoGood"]);
        assert_eq!(
            report.skipped_names().collect::<Vec<_>>(),
            ["/NS/Private", "/NS/Derived", "/NS/UsesPrivate"]
        );
        assert!(matches!(
            report.skipped[0].1,
            SchemaError::UnrepresentableType { .. }
        ));
        assert!(matches!(report.skipped[2].1, SchemaError::NotFound(_)));
        assert!(registry.contains("/NS/AlsoGood"));
        assert!(!registry.contains("/NS/Private"));
    }

    #[test]
    fn test_import_enum_and_alias() {
        let mut registry = Registry::with_standard_types();
        let report = registry.import(vec![
            TypeSpec::Enum {
                name: "/NS/Mode".into(),
                size: 4,
                values: vec![("OFF".into(), 0), ("ON".into(), 1)],
            },
            TypeSpec::Alias {
                name: "/NS/ModeAlias".into(),
                target: "/NS/Mode".into(),
            },
            TypeSpec::Container {
                kind: "/std/vector".into(),
                element: "/NS/Mode".into(),
            },
        ]);

        assert!(report.is_complete());
        assert_eq!(report.registered[2], "/std/vector</NS/Mode>");
        assert_eq!(registry.get("/NS/ModeAlias").unwrap().name(), "/NS/Mode");
    }
}
