//! Type registry
//!
//! Name → definition map with aliasing, derived-type construction from
//! name conventions and dependency-aware resizing.
//!
//! Types are kept in registration order. Every definition can only refer to
//! types registered before it, so registration order is a topological order
//! of the dependency graph; resize propagation and dependency queries rely
//! on that.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::builder::CompoundBuilder;
use crate::definition::{
    align_up, CompoundDef, EnumDef, Field, NumericCategory, TypeDefinition, TypeKind,
    DEFAULT_CONTAINER_SIZE, POINTER_SIZE,
};
use crate::error::{SchemaError, SchemaResult};
use crate::name;

/// Container kind registered by [`Registry::with_standard_types`]
pub const STD_VECTOR: &str = "/std/vector";

/// Store of type definitions
#[derive(Debug, Default)]
pub struct Registry {
    types: IndexMap<String, Arc<TypeDefinition>>,
    aliases: HashMap<String, String>,
    container_kinds: HashSet<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with fixed-width numerics, `/bool`, `/char`,
    /// `/float`, `/double`, `/nil` and the `/std/vector` container kind
    pub fn with_standard_types() -> Self {
        let mut registry = Self::new();
        registry
            .register_standard_types()
            .expect("standard types are well-formed");
        registry
    }

    fn register_standard_types(&mut self) -> SchemaResult<()> {
        use NumericCategory::*;

        for (bits, bytes) in [(8, 1), (16, 2), (32, 4), (64, 8)] {
            self.create_numeric(&format!("/int{}_t", bits), Sint, bytes)?;
            self.create_numeric(&format!("/uint{}_t", bits), Uint, bytes)?;
        }
        self.create_numeric("/bool", Uint, 1)?;
        self.create_numeric("/char", Sint, 1)?;
        self.create_numeric("/float", Float, 4)?;
        self.create_numeric("/double", Float, 8)?;
        self.create_null("/nil")?;
        self.alias("/int", "/int32_t")?;
        self.declare_container_kind(STD_VECTOR)?;
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Resolve aliases to the canonical name
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Check if a type (or alias) exists under this name
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(self.canonical_name(name))
    }

    /// Get a registered type by name or alias
    pub fn get(&self, name: &str) -> SchemaResult<Arc<TypeDefinition>> {
        self.types
            .get(self.canonical_name(name))
            .cloned()
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// Get a type, deriving arrays (`T[N]`), pointers (`T*`) and container
    /// instances (`K<T>`) from their registered parts when missing
    pub fn build(&mut self, name: &str) -> SchemaResult<Arc<TypeDefinition>> {
        if let Ok(def) = self.get(name) {
            return Ok(def);
        }
        name::validate(name)?;

        let def = if let Some(target) = name::split_pointer(name) {
            self.create_pointer(target)?
        } else if let Some((element, len)) = name::split_array(name) {
            self.create_array(element, len)?
        } else if let Some((kind, args)) = name::split_template(name) {
            if !self.container_kinds.contains(kind) {
                return Err(SchemaError::UnknownContainerKind(kind.to_string()));
            }
            match args.as_slice() {
                [element] => self.create_container(kind, element)?,
                _ => {
                    return Err(SchemaError::unrepresentable(
                        name,
                        "containers take exactly one element type",
                    ))
                }
            }
        } else {
            return Err(SchemaError::NotFound(name.to_string()));
        };

        // Derived names built through an alias resolve to the canonical one
        if def.name() != name {
            self.aliases.insert(name.to_string(), def.name().to_string());
        }
        Ok(def)
    }

    /// Canonical names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDefinition>> {
        self.types.values()
    }

    /// Aliases pointing at `name`
    pub fn aliases_of(&self, name: &str) -> Vec<&str> {
        let canonical = self.canonical_name(name);
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Names of every type that depends on `name`, directly or transitively,
    /// in registration order
    pub fn dependents(&self, name: &str) -> SchemaResult<Vec<String>> {
        let root = self.get(name)?;
        let mut found: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();

        for (type_name, def) in &self.types {
            let depends = def
                .direct_dependencies()
                .iter()
                .any(|dep| dep.name() == root.name() || found.contains(dep.name()));
            if depends {
                found.insert(type_name);
                result.push(type_name.clone());
            }
        }
        Ok(result)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn add(&mut self, def: TypeDefinition) -> SchemaResult<Arc<TypeDefinition>> {
        name::validate(def.name())?;
        if self.contains(def.name()) {
            return Err(SchemaError::AlreadyDefined(def.name().to_string()));
        }

        debug!(
            "Registered {} ({:?}, {} bytes)",
            def.name(),
            def.specialization(),
            def.size()
        );
        let def = Arc::new(def);
        self.types.insert(def.name().to_string(), def.clone());
        Ok(def)
    }

    /// Declare a container kind such as `/std/vector`
    pub fn declare_container_kind(&mut self, kind: &str) -> SchemaResult<()> {
        name::validate(kind)?;
        self.container_kinds.insert(kind.to_string());
        Ok(())
    }

    pub fn is_container_kind(&self, kind: &str) -> bool {
        self.container_kinds.contains(kind)
    }

    /// Register a numeric type
    pub fn create_numeric(
        &mut self,
        name: &str,
        category: NumericCategory,
        size: usize,
    ) -> SchemaResult<Arc<TypeDefinition>> {
        validate_numeric_size(name, category, size)?;
        self.add(TypeDefinition::new(name, size, TypeKind::Numeric(category)))
    }

    /// Register an enum with the given symbols
    pub fn create_enum<S: Into<String>>(
        &mut self,
        name: &str,
        size: usize,
        values: impl IntoIterator<Item = (S, i64)>,
    ) -> SchemaResult<Arc<TypeDefinition>> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(SchemaError::unrepresentable(
                name,
                format!("invalid enum size {}", size),
            ));
        }
        let values: Vec<(String, i64)> = values.into_iter().map(|(s, v)| (s.into(), v)).collect();
        self.add(TypeDefinition::new(
            name,
            size,
            TypeKind::Enum(EnumDef::new(values)),
        ))
    }

    /// Register a compound, resolving field types and computing the layout
    ///
    /// Fields without an explicit offset are placed at the next offset
    /// aligned for their type. Explicit offsets must not overlap.
    pub fn create_compound(
        &mut self,
        builder: CompoundBuilder,
    ) -> SchemaResult<Arc<TypeDefinition>> {
        let CompoundBuilder {
            name,
            fields: decls,
            size,
            metadata,
        } = builder;
        name::validate(&name)?;
        if self.contains(&name) {
            return Err(SchemaError::AlreadyDefined(name));
        }

        let mut fields = Vec::with_capacity(decls.len());
        let mut seen = HashSet::new();
        let mut end = 0usize;
        let mut max_align = 1usize;

        for decl in decls {
            if !seen.insert(decl.name.clone()) {
                return Err(SchemaError::unrepresentable(
                    &name,
                    format!("duplicate field {}", decl.name),
                ));
            }

            let ty = self.build(&decl.type_name)?;
            if ty.is_null() {
                return Err(SchemaError::unrepresentable(
                    &name,
                    format!("field {} has null type {}", decl.name, ty.name()),
                ));
            }

            let offset = match decl.offset {
                Some(offset) if offset < end => {
                    return Err(SchemaError::unrepresentable(
                        &name,
                        format!("field {} at offset {} overlaps previous field", decl.name, offset),
                    ))
                }
                Some(offset) => offset,
                None => align_up(end, ty.align()),
            };

            end = offset + ty.size();
            max_align = max_align.max(ty.align());
            fields.push(Field::new(decl.name, ty, offset).with_metadata(decl.metadata));
        }

        let size = match size {
            Some(size) if size < end => {
                return Err(SchemaError::unrepresentable(
                    &name,
                    format!("declared size {} is smaller than field end {}", size, end),
                ))
            }
            Some(size) => size,
            None => align_up(end, max_align),
        };

        self.add(
            TypeDefinition::new(name, size, TypeKind::Compound(CompoundDef::new(fields)))
                .with_metadata(metadata),
        )
    }

    /// Register (or fetch) the array `element[len]`
    pub fn create_array(&mut self, element: &str, len: usize) -> SchemaResult<Arc<TypeDefinition>> {
        let element = self.build(element)?;
        let array_name = name::array_name(element.name(), len);
        if let Ok(existing) = self.get(&array_name) {
            return Ok(existing);
        }
        if element.is_null() {
            return Err(SchemaError::unrepresentable(array_name, "array of null type"));
        }

        let size = element.size() * len;
        self.add(TypeDefinition::new(
            array_name,
            size,
            TypeKind::Array { element, len },
        ))
    }

    /// Register (or fetch) the container instance `kind<element>`
    pub fn create_container(
        &mut self,
        kind: &str,
        element: &str,
    ) -> SchemaResult<Arc<TypeDefinition>> {
        if !self.container_kinds.contains(kind) {
            return Err(SchemaError::UnknownContainerKind(kind.to_string()));
        }
        let element = self.build(element)?;
        let container_name = name::container_name(kind, element.name());
        if let Ok(existing) = self.get(&container_name) {
            return Ok(existing);
        }
        if element.is_null() {
            return Err(SchemaError::unrepresentable(
                container_name,
                "container of null type",
            ));
        }

        self.add(TypeDefinition::new(
            container_name,
            DEFAULT_CONTAINER_SIZE,
            TypeKind::Container {
                kind: kind.to_string(),
                element,
            },
        ))
    }

    /// Register (or fetch) the pointer `target*`
    pub fn create_pointer(&mut self, target: &str) -> SchemaResult<Arc<TypeDefinition>> {
        let target = self.build(target)?;
        let pointer_name = name::pointer_name(target.name());
        if let Ok(existing) = self.get(&pointer_name) {
            return Ok(existing);
        }
        self.add(TypeDefinition::new(
            pointer_name,
            POINTER_SIZE,
            TypeKind::Pointer { target },
        ))
    }

    /// Register a type whose structure is not modelled
    pub fn create_opaque(&mut self, name: &str, size: usize) -> SchemaResult<Arc<TypeDefinition>> {
        self.add(TypeDefinition::new(name, size, TypeKind::Opaque))
    }

    /// Register a zero-sized null type
    pub fn create_null(&mut self, name: &str) -> SchemaResult<Arc<TypeDefinition>> {
        self.add(TypeDefinition::new(name, 0, TypeKind::Null))
    }

    /// Make `alias` resolve to `target`
    pub fn alias(&mut self, alias: &str, target: &str) -> SchemaResult<()> {
        name::validate(alias)?;
        if self.contains(alias) {
            return Err(SchemaError::AlreadyDefined(alias.to_string()));
        }
        let target = self.get(target)?;
        trace!("Alias {} -> {}", alias, target.name());
        self.aliases
            .insert(alias.to_string(), target.name().to_string());
        Ok(())
    }

    // ========================================================================
    // Resizing
    // ========================================================================

    /// Change the size of the given types and recompute the layout of every
    /// type that depends on them
    ///
    /// Fields declared after an embedded resized type are shifted by the
    /// size delta; fields before it keep their offsets. Arrays grow by
    /// `len * delta`. Container slots keep their size since elements live
    /// in a separate buffer, but container definitions are rebuilt so they
    /// refer to the new element definition.
    ///
    /// Returns the canonical names of all rebuilt definitions, in
    /// registration order.
    pub fn resize(&mut self, sizes: &[(&str, usize)]) -> SchemaResult<Vec<String>> {
        let mut requested = HashMap::new();
        for (type_name, size) in sizes {
            let def = self.get(type_name)?;
            match def.kind() {
                TypeKind::Array { .. } | TypeKind::Pointer { .. } | TypeKind::Null => {
                    return Err(SchemaError::InvalidResize {
                        name: def.name().to_string(),
                        size: *size,
                        reason: "size is derived from the type structure".into(),
                    })
                }
                TypeKind::Numeric(category) => validate_numeric_size(def.name(), *category, *size)
                    .map_err(|e| SchemaError::InvalidResize {
                        name: def.name().to_string(),
                        size: *size,
                        reason: e.to_string(),
                    })?,
                _ => {}
            }
            requested.insert(def.name().to_string(), *size);
        }

        let mut rebuilt: HashMap<String, Arc<TypeDefinition>> = HashMap::new();
        let mut order = Vec::new();
        for (type_name, def) in &self.types {
            if let Some(new_def) = rebuild(def, requested.get(type_name).copied(), &rebuilt)? {
                debug!(
                    "Resized {}: {} -> {} bytes",
                    type_name,
                    def.size(),
                    new_def.size()
                );
                rebuilt.insert(type_name.clone(), Arc::new(new_def));
                order.push(type_name.clone());
            }
        }

        for type_name in &order {
            if let (Some(slot), Some(def)) =
                (self.types.get_mut(type_name), rebuilt.remove(type_name))
            {
                *slot = def;
            }
        }
        Ok(order)
    }
}

fn validate_numeric_size(name: &str, category: NumericCategory, size: usize) -> SchemaResult<()> {
    let valid = match category {
        NumericCategory::Sint | NumericCategory::Uint => matches!(size, 1 | 2 | 4 | 8),
        NumericCategory::Float => matches!(size, 4 | 8),
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::unrepresentable(
            name,
            format!("invalid size {} for {:?} numeric", size, category),
        ))
    }
}

/// Rebuild `def` against already-rebuilt dependencies. `None` when neither
/// the definition nor any of its dependencies changed.
fn rebuild(
    def: &TypeDefinition,
    requested: Option<usize>,
    rebuilt: &HashMap<String, Arc<TypeDefinition>>,
) -> SchemaResult<Option<TypeDefinition>> {
    let swap = |ty: &Arc<TypeDefinition>| rebuilt.get(ty.name()).cloned();

    let new_def = match def.kind() {
        TypeKind::Compound(compound) => {
            let mut changed = requested.is_some();
            let mut shift: i64 = 0;
            let mut fields = Vec::with_capacity(compound.fields().len());

            for field in compound.fields() {
                let offset = field.offset() as i64 + shift;
                let ty = match swap(field.type_def()) {
                    Some(new_ty) => {
                        changed = true;
                        shift += new_ty.size() as i64 - field.type_def().size() as i64;
                        new_ty
                    }
                    None => field.type_def().clone(),
                };
                if offset < 0 {
                    return Err(SchemaError::InvalidResize {
                        name: def.name().to_string(),
                        size: requested.unwrap_or(def.size()),
                        reason: format!("field {} would move before the start", field.name()),
                    });
                }
                fields.push(
                    Field::new(field.name(), ty, offset as usize)
                        .with_metadata(field.metadata().clone()),
                );
            }
            if !changed {
                return Ok(None);
            }

            let end = fields
                .iter()
                .map(|f| f.offset() + f.type_def().size())
                .max()
                .unwrap_or(0);
            let size = match requested {
                Some(size) if size < end => {
                    return Err(SchemaError::InvalidResize {
                        name: def.name().to_string(),
                        size,
                        reason: format!("fields end at {}", end),
                    })
                }
                Some(size) => size,
                None => ((def.size() as i64 + shift).max(0) as usize).max(end),
            };
            def.rebuilt(size, TypeKind::Compound(CompoundDef::new(fields)))
        }
        TypeKind::Array { element, len } => match swap(element) {
            Some(element) => def.rebuilt(
                element.size() * len,
                TypeKind::Array {
                    element,
                    len: *len,
                },
            ),
            None => return Ok(None),
        },
        TypeKind::Container { kind, element } => {
            let new_element = swap(element);
            if new_element.is_none() && requested.is_none() {
                return Ok(None);
            }
            def.rebuilt(
                requested.unwrap_or(def.size()),
                TypeKind::Container {
                    kind: kind.clone(),
                    element: new_element.unwrap_or_else(|| element.clone()),
                },
            )
        }
        TypeKind::Pointer { target } => match swap(target) {
            Some(target) => def.rebuilt(def.size(), TypeKind::Pointer { target }),
            None => return Ok(None),
        },
        TypeKind::Numeric(_) | TypeKind::Enum(_) | TypeKind::Opaque => match requested {
            Some(size) => def.rebuilt(size, def.kind().clone()),
            None => return Ok(None),
        },
        TypeKind::Null => return Ok(None),
    };
    Ok(Some(new_def))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_types() {
        let registry = Registry::with_standard_types();
        assert_eq!(registry.get("/int32_t").unwrap().size(), 4);
        assert_eq!(registry.get("/double").unwrap().size(), 8);
        assert_eq!(registry.get("/int").unwrap().name(), "/int32_t");
        assert!(registry.get("/nil").unwrap().is_null());
        assert!(registry.is_container_kind(STD_VECTOR));
    }

    #[test]
    fn test_get_missing() {
        let registry = Registry::with_standard_types();
        assert_eq!(
            registry.get("/NS/Missing").unwrap_err(),
            SchemaError::NotFound("/NS/Missing".into())
        );
    }

    #[test]
    fn test_already_defined() {
        let mut registry = Registry::with_standard_types();
        let err = registry
            .create_numeric("/float", NumericCategory::Float, 4)
            .unwrap_err();
        assert_eq!(err, SchemaError::AlreadyDefined("/float".into()));
    }

    #[test]
    fn test_invalid_numeric_size() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.create_numeric("/f16", NumericCategory::Float, 2),
            Err(SchemaError::UnrepresentableType { .. })
        ));
    }

    #[test]
    fn test_compound_natural_layout() {
        let mut registry = Registry::with_standard_types();
        let def = registry
            .create_compound(
                CompoundBuilder::new("/NS/Test")
                    .field("a", "/int8_t")
                    .field("b", "/double")
                    .field("c", "/int16_t"),
            )
            .unwrap();

        let offsets: Vec<_> = def.fields().iter().map(|f| f.offset()).collect();
        assert_eq!(offsets, [0, 8, 16]);
        assert_eq!(def.size(), 24);
        assert_eq!(def.align(), 8);
    }

    #[test]
    fn test_compound_explicit_offsets() {
        let mut registry = Registry::with_standard_types();
        let def = registry
            .create_compound(
                CompoundBuilder::new("/Packed")
                    .field_at("a", "/int8_t", 0)
                    .field_at("b", "/int32_t", 1)
                    .size(5),
            )
            .unwrap();
        assert_eq!(def.field("b").unwrap().offset(), 1);
        assert_eq!(def.size(), 5);

        let err = registry
            .create_compound(
                CompoundBuilder::new("/Overlap")
                    .field_at("a", "/int32_t", 0)
                    .field_at("b", "/int32_t", 2),
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnrepresentableType { .. }));
    }

    #[test]
    fn test_build_derived_types() {
        let mut registry = Registry::with_standard_types();

        let array = registry.build("/float[10]").unwrap();
        assert_eq!(array.size(), 40);
        assert_eq!(array.element().unwrap().name(), "/float");

        let vector = registry.build("/std/vector</float[10]>").unwrap();
        assert!(vector.is_container());
        assert_eq!(vector.size(), DEFAULT_CONTAINER_SIZE);
        assert_eq!(vector.element().unwrap().name(), "/float[10]");

        let ptr = registry.build("/double*").unwrap();
        assert!(ptr.is_pointer());
        assert_eq!(ptr.size(), POINTER_SIZE);

        assert!(matches!(
            registry.build("/std/list</float>"),
            Err(SchemaError::UnknownContainerKind(_))
        ));
    }

    #[test]
    fn test_build_through_alias() {
        let mut registry = Registry::with_standard_types();
        let a = registry.build("/int[4]").unwrap();
        assert_eq!(a.name(), "/int32_t[4]");
        let b = registry.build("/int[4]").unwrap();
        assert_eq!(a.uid(), b.uid());
    }

    #[test]
    fn test_dependents() {
        let mut registry = Registry::with_standard_types();
        registry
            .create_compound(CompoundBuilder::new("/A").field("x", "/float"))
            .unwrap();
        registry
            .create_compound(CompoundBuilder::new("/B").field("a", "/A[2]"))
            .unwrap();
        registry
            .create_compound(CompoundBuilder::new("/C").field("x", "/double"))
            .unwrap();

        let deps = registry.dependents("/A").unwrap();
        assert_eq!(deps, ["/A[2]", "/B"]);
    }

    #[test]
    fn test_resize_shifts_later_fields() {
        let mut registry = Registry::with_standard_types();
        registry
            .create_compound(CompoundBuilder::new("/Elem").field("value", "/double"))
            .unwrap();
        registry
            .create_compound(
                CompoundBuilder::new("/Outer")
                    .field("before", "/int32_t")
                    .field("elem", "/Elem")
                    .field("elems", "/std/vector</Elem>")
                    .field("after", "/int32_t"),
            )
            .unwrap();
        let outer = registry.get("/Outer").unwrap();
        let old: Vec<_> = outer.fields().iter().map(|f| f.offset()).collect();

        let rebuilt = registry.resize(&[("/Elem", 64)]).unwrap();
        assert!(rebuilt.contains(&"/Outer".to_string()));
        assert!(rebuilt.contains(&"/std/vector</Elem>".to_string()));

        let outer = registry.get("/Outer").unwrap();
        let new: Vec<_> = outer.fields().iter().map(|f| f.offset()).collect();
        assert_eq!(new[0], old[0]);
        assert_eq!(new[1], old[1]);
        assert_eq!(new[2], old[2] + 56);
        assert_eq!(new[3], old[3] + 56);

        // container definition now refers to the resized element
        let elems = outer.field("elems").unwrap().type_def();
        assert_eq!(elems.element().unwrap().size(), 64);
    }

    #[test]
    fn test_resize_rejects_arrays() {
        let mut registry = Registry::with_standard_types();
        registry.build("/float[3]").unwrap();
        assert!(matches!(
            registry.resize(&[("/float[3]", 16)]),
            Err(SchemaError::InvalidResize { .. })
        ));
    }
}
