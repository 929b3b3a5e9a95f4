//! Type definitions
//!
//! A [`TypeDefinition`] is an immutable schema node. Definitions reference
//! their sub-types through `Arc`, so a definition is a self-contained view of
//! its whole type graph as it was when it was built. The registry replaces
//! definitions (copy-on-write) when a resize changes their layout.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::metadata::MetaData;

/// Size of a container slot: `{ base: u64, len: u64, capacity: u64 }`
pub const DEFAULT_CONTAINER_SIZE: usize = 24;

/// Size of a pointer
pub const POINTER_SIZE: usize = 8;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one built definition
///
/// Rebuilding a definition (e.g. after a resize) yields a new uid, so caches
/// keyed by uid never serve a stale layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeUid(u64);

impl TypeUid {
    fn next() -> Self {
        Self(NEXT_UID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Structural properties computed once when the definition is built
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        /// The type or one of its sub-types is a pointer
        const CONTAINS_POINTERS = 1 << 0;
        /// The type or one of its sub-types is a dynamic container
        const CONTAINS_CONTAINERS = 1 << 1;
        /// The type or one of its sub-types is opaque
        const CONTAINS_OPAQUES = 1 << 2;
        /// The null type
        const NULL = 1 << 3;
    }
}

/// Category of a numeric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericCategory {
    /// Signed integer
    Sint,
    /// Unsigned integer
    Uint,
    /// IEEE float (4 or 8 bytes)
    Float,
}

/// Value proxy strategy selected when a definition is registered
///
/// The runtime dispatches on this tag instead of inspecting the kind payload
/// at every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specialization {
    Null,
    Numeric,
    Enum,
    Compound,
    Array,
    Container,
    Pointer,
    Opaque,
}

/// Compound field
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    ty: Arc<TypeDefinition>,
    offset: usize,
    metadata: MetaData,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Arc<TypeDefinition>, offset: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            offset,
            metadata: MetaData::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn type_def(&self) -> &Arc<TypeDefinition> {
        &self.ty
    }

    /// Byte offset from the start of the compound
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }
}

/// Compound (struct) layout
///
/// The name → index table is built once, so field lookups during value
/// access never scan the field list.
#[derive(Debug, Clone)]
pub struct CompoundDef {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl CompoundDef {
    pub fn new(fields: Vec<Field>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { fields, index }
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Enum symbol table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    values: Vec<(String, i64)>,
}

impl EnumDef {
    pub fn new(values: Vec<(String, i64)>) -> Self {
        Self { values }
    }

    /// Symbols and values in declaration order
    pub fn values(&self) -> &[(String, i64)] {
        &self.values
    }

    /// Value of a symbol
    pub fn value_of(&self, symbol: &str) -> Option<i64> {
        self.values
            .iter()
            .find(|(name, _)| name == symbol)
            .map(|(_, v)| *v)
    }

    /// First symbol declared with this value
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// Structure of a definition
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Zero-sized placeholder (`void`)
    Null,
    Numeric(NumericCategory),
    Enum(EnumDef),
    Compound(CompoundDef),
    Array {
        element: Arc<TypeDefinition>,
        len: usize,
    },
    Container {
        /// Container kind, e.g. `/std/vector`
        kind: String,
        element: Arc<TypeDefinition>,
    },
    Pointer {
        target: Arc<TypeDefinition>,
    },
    /// Named blob of bytes with no modelled structure
    Opaque,
}

impl TypeKind {
    fn specialization(&self) -> Specialization {
        match self {
            TypeKind::Null => Specialization::Null,
            TypeKind::Numeric(_) => Specialization::Numeric,
            TypeKind::Enum(_) => Specialization::Enum,
            TypeKind::Compound(_) => Specialization::Compound,
            TypeKind::Array { .. } => Specialization::Array,
            TypeKind::Container { .. } => Specialization::Container,
            TypeKind::Pointer { .. } => Specialization::Pointer,
            TypeKind::Opaque => Specialization::Opaque,
        }
    }

    fn flags(&self) -> TypeFlags {
        match self {
            TypeKind::Null => TypeFlags::NULL,
            TypeKind::Numeric(_) | TypeKind::Enum(_) => TypeFlags::empty(),
            TypeKind::Compound(c) => c
                .fields
                .iter()
                .fold(TypeFlags::empty(), |acc, f| acc | f.ty.flags()),
            TypeKind::Array { element, .. } => element.flags() & !TypeFlags::NULL,
            TypeKind::Container { element, .. } => {
                TypeFlags::CONTAINS_CONTAINERS | (element.flags() & !TypeFlags::NULL)
            }
            TypeKind::Pointer { .. } => TypeFlags::CONTAINS_POINTERS,
            TypeKind::Opaque => TypeFlags::CONTAINS_OPAQUES,
        }
    }
}

/// Immutable schema node
#[derive(Debug)]
pub struct TypeDefinition {
    uid: TypeUid,
    name: String,
    size: usize,
    align: usize,
    kind: TypeKind,
    specialization: Specialization,
    flags: TypeFlags,
    metadata: MetaData,
}

impl TypeDefinition {
    /// Build a definition. Alignment defaults to the natural alignment of
    /// the kind.
    pub fn new(name: impl Into<String>, size: usize, kind: TypeKind) -> Self {
        let align = natural_alignment(size, &kind);
        Self {
            uid: TypeUid::next(),
            name: name.into(),
            size,
            align,
            specialization: kind.specialization(),
            flags: kind.flags(),
            kind,
            metadata: MetaData::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align.max(1);
        self
    }

    /// Same structure under a new identity, with a new size and kind payload
    pub(crate) fn rebuilt(&self, size: usize, kind: TypeKind) -> Self {
        Self {
            uid: TypeUid::next(),
            name: self.name.clone(),
            size,
            align: self.align,
            specialization: kind.specialization(),
            flags: kind.flags(),
            kind,
            metadata: self.metadata.clone(),
        }
    }

    pub fn uid(&self) -> TypeUid {
        self.uid
    }

    /// Full name, e.g. `/NS/Test`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last component of the name
    pub fn basename(&self) -> &str {
        crate::name::basename(&self.name)
    }

    /// Namespace, terminated by `/`
    pub fn namespace(&self) -> &str {
        crate::name::namespace(&self.name)
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn specialization(&self) -> Specialization {
        self.specialization
    }

    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn is_null(&self) -> bool {
        self.specialization == Specialization::Null
    }

    pub fn is_numeric(&self) -> bool {
        self.specialization == Specialization::Numeric
    }

    pub fn is_compound(&self) -> bool {
        self.specialization == Specialization::Compound
    }

    pub fn is_array(&self) -> bool {
        self.specialization == Specialization::Array
    }

    pub fn is_container(&self) -> bool {
        self.specialization == Specialization::Container
    }

    pub fn is_pointer(&self) -> bool {
        self.specialization == Specialization::Pointer
    }

    pub fn is_opaque(&self) -> bool {
        self.specialization == Specialization::Opaque
    }

    /// Numeric or enum: values with a scalar representation
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.specialization,
            Specialization::Numeric | Specialization::Enum
        )
    }

    pub fn numeric_category(&self) -> Option<NumericCategory> {
        match &self.kind {
            TypeKind::Numeric(category) => Some(*category),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundDef> {
        match &self.kind {
            TypeKind::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDef> {
        match &self.kind {
            TypeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Compound fields (empty for other kinds)
    pub fn fields(&self) -> &[Field] {
        self.as_compound().map(CompoundDef::fields).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.as_compound()?.field(name)
    }

    /// Element type of an array or container
    pub fn element(&self) -> Option<&Arc<TypeDefinition>> {
        match &self.kind {
            TypeKind::Array { element, .. } | TypeKind::Container { element, .. } => {
                Some(element)
            }
            _ => None,
        }
    }

    /// Length of a fixed array
    pub fn array_len(&self) -> Option<usize> {
        match &self.kind {
            TypeKind::Array { len, .. } => Some(*len),
            _ => None,
        }
    }

    /// Container kind (`/std/vector`)
    pub fn container_kind(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Container { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Pointed-to type
    pub fn pointer_target(&self) -> Option<&Arc<TypeDefinition>> {
        match &self.kind {
            TypeKind::Pointer { target } => Some(target),
            _ => None,
        }
    }

    /// Sub-types this definition is built from
    pub fn direct_dependencies(&self) -> Vec<&Arc<TypeDefinition>> {
        match &self.kind {
            TypeKind::Compound(c) => c.fields.iter().map(|f| &f.ty).collect(),
            TypeKind::Array { element, .. } | TypeKind::Container { element, .. } => {
                vec![element]
            }
            TypeKind::Pointer { target } => vec![target],
            _ => Vec::new(),
        }
    }

    /// Whether values of this type can be copied with a plain memcpy
    pub fn is_memcpy_safe(&self) -> bool {
        !self
            .flags
            .intersects(TypeFlags::CONTAINS_CONTAINERS | TypeFlags::CONTAINS_OPAQUES)
    }

    /// Whether values of this type can be dumped to a byte array
    pub fn is_dumpable(&self) -> bool {
        !self
            .flags
            .intersects(TypeFlags::CONTAINS_POINTERS | TypeFlags::CONTAINS_OPAQUES)
    }
}

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn natural_alignment(size: usize, kind: &TypeKind) -> usize {
    match kind {
        TypeKind::Null => 1,
        TypeKind::Numeric(_) | TypeKind::Enum(_) => size.clamp(1, 8),
        TypeKind::Compound(c) => c.fields.iter().map(|f| f.ty.align).max().unwrap_or(1),
        TypeKind::Array { element, .. } => element.align,
        TypeKind::Container { .. } | TypeKind::Pointer { .. } => 8,
        TypeKind::Opaque => size.clamp(1, 8).next_power_of_two().min(8),
    }
}

/// Round `offset` up to a multiple of `align`
pub const fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}
