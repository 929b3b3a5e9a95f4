//! Compound builder
//!
//! Collects field declarations by type name; the registry resolves the
//! names and computes the layout in [`Registry::create_compound`].
//!
//! [`Registry::create_compound`]: crate::Registry::create_compound

use crate::metadata::MetaData;

/// Field declaration waiting for layout
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
    /// Explicit byte offset; computed from natural alignment when `None`
    pub offset: Option<usize>,
    pub metadata: MetaData,
}

/// Compound declaration
#[derive(Debug, Clone)]
pub struct CompoundBuilder {
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) size: Option<usize>,
    pub(crate) metadata: MetaData,
}

impl CompoundBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            size: None,
            metadata: MetaData::new(),
        }
    }

    /// Add a field laid out after the previous one
    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            type_name: type_name.into(),
            offset: None,
            metadata: MetaData::new(),
        });
        self
    }

    /// Add a field at an explicit offset (as reported by a header importer)
    pub fn field_at(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        offset: usize,
    ) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            type_name: type_name.into(),
            offset: Some(offset),
            metadata: MetaData::new(),
        });
        self
    }

    /// Add a fully specified field declaration
    pub fn field_decl(mut self, decl: FieldDecl) -> Self {
        self.fields.push(decl);
        self
    }

    /// Force the total size (must cover every field)
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.add(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
