//! Memory layouts
//!
//! A [`MemoryLayout`] is the flattened copy program for a type: runs of
//! plain bytes interleaved with arrays and containers that must be walked
//! element by element. Dumping and loading interpret it.
//!
//! ```text
//!   /Test { a: /int32_t, v: /std/vector</double>, b: /int64_t[2] }
//!
//!   Memcpy(8)                         a + padding
//!   Container(/double)                count: u64, then elements
//!     Memcpy(8)
//!   Memcpy(16)                        b
//! ```
//!
//! Adjacent byte runs are merged; a compound with no containers collapses
//! to a single `Memcpy`.

use std::sync::Arc;

use typelib_schema::{TypeDefinition, TypeFlags, TypeKind, DEFAULT_CONTAINER_SIZE};

use crate::error::{EngineError, EngineResult};

/// One step of a memory layout
#[derive(Debug, Clone)]
pub enum LayoutOp {
    /// Copy this many bytes verbatim
    Memcpy(usize),
    /// Repeat `body` for each of `len` consecutive elements
    Array { len: usize, body: Vec<LayoutOp> },
    /// A container slot; `body` is applied to each element
    Container {
        element: Arc<TypeDefinition>,
        body: Vec<LayoutOp>,
    },
}

/// Copy program for one type
#[derive(Debug, Clone)]
pub struct MemoryLayout {
    ops: Vec<LayoutOp>,
}

impl MemoryLayout {
    /// Compute the layout of `ty`
    ///
    /// Fails for types that contain pointers or opaques: their bytes have no
    /// meaning outside the process that produced them.
    pub fn of(ty: &TypeDefinition) -> EngineResult<Self> {
        if ty
            .flags()
            .intersects(TypeFlags::CONTAINS_POINTERS | TypeFlags::CONTAINS_OPAQUES)
        {
            return Err(EngineError::unsupported(
                ty.name(),
                "types with pointers or opaques have no memory layout",
            ));
        }
        let mut ops = Vec::new();
        append(ty, &mut ops)?;
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[LayoutOp] {
        &self.ops
    }

    /// Whether the whole type is one verbatim byte run
    pub fn is_memcpy(&self) -> bool {
        matches!(self.ops.as_slice(), [LayoutOp::Memcpy(_)] | [])
    }
}

fn append(ty: &TypeDefinition, ops: &mut Vec<LayoutOp>) -> EngineResult<()> {
    if ty.is_memcpy_safe() {
        push_memcpy(ops, ty.size());
        return Ok(());
    }

    match ty.kind() {
        TypeKind::Compound(compound) => {
            let mut cursor = 0;
            for field in compound.fields() {
                push_memcpy(ops, field.offset().saturating_sub(cursor));
                append(field.type_def(), ops)?;
                cursor = field.offset() + field.type_def().size();
            }
            push_memcpy(ops, ty.size().saturating_sub(cursor));
        }
        TypeKind::Array { element, len } => {
            let mut body = Vec::new();
            append(element, &mut body)?;
            ops.push(LayoutOp::Array { len: *len, body });
        }
        TypeKind::Container { element, .. } => {
            let mut body = Vec::new();
            append(element, &mut body)?;
            ops.push(LayoutOp::Container {
                element: element.clone(),
                body,
            });
            push_memcpy(ops, ty.size().saturating_sub(DEFAULT_CONTAINER_SIZE));
        }
        _ => {
            return Err(EngineError::unsupported(
                ty.name(),
                "no memory layout for this kind",
            ))
        }
    }
    Ok(())
}

fn push_memcpy(ops: &mut Vec<LayoutOp>, size: usize) {
    if size == 0 {
        return;
    }
    if let Some(LayoutOp::Memcpy(previous)) = ops.last_mut() {
        *previous += size;
    } else {
        ops.push(LayoutOp::Memcpy(size));
    }
}

#[cfg(test)]
mod tests {
    use typelib_schema::{CompoundBuilder, Registry};

    use super::*;

    #[test]
    fn test_plain_compound_is_one_memcpy() {
        let mut registry = Registry::with_standard_types();
        let ty = registry
            .create_compound(
                CompoundBuilder::new("/Plain")
                    .field("a", "/int8_t")
                    .field("b", "/double"),
            )
            .unwrap();
        let layout = MemoryLayout::of(&ty).unwrap();
        assert!(layout.is_memcpy());
        assert!(matches!(layout.ops(), [LayoutOp::Memcpy(16)]));
    }

    #[test]
    fn test_container_splits_runs() {
        let mut registry = Registry::with_standard_types();
        let ty = registry
            .create_compound(
                CompoundBuilder::new("/Test")
                    .field("a", "/int32_t")
                    .field("v", "/std/vector</double>")
                    .field("b", "/int64_t[2]"),
            )
            .unwrap();
        let layout = MemoryLayout::of(&ty).unwrap();
        match layout.ops() {
            [LayoutOp::Memcpy(8), LayoutOp::Container { element, body }, LayoutOp::Memcpy(16)] => {
                assert_eq!(element.name(), "/double");
                assert!(matches!(body.as_slice(), [LayoutOp::Memcpy(8)]));
            }
            other => panic!("unexpected layout {other:?}"),
        }
    }

    #[test]
    fn test_pointers_have_no_layout() {
        let mut registry = Registry::with_standard_types();
        let ty = registry.build("/int32_t*").unwrap();
        assert!(matches!(
            MemoryLayout::of(&ty),
            Err(EngineError::Unsupported { .. })
        ));
    }
}
