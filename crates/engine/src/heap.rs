//! Reference heap engine
//!
//! [`HeapEngine`] simulates a process address space: every allocation is a
//! zero-initialized block at a fresh base address. Bases are handed out by a
//! bump counter and never reused, so a freed address stays invalid for the
//! lifetime of the engine.
//!
//! ```text
//!   0x10000   block A (size 24)  ── container slot { base, len, capacity }
//!   0x10030   block B (size 32)  ◄─┘ element buffer (capacity × element size)
//!   0x10060   ...
//! ```
//!
//! Containers use the 24-byte slot layout `{ base: u64, len: u64,
//! capacity: u64 }`, little-endian. Bytes between `len` and `capacity` are
//! always zero. When a push or resize outgrows the buffer, the elements move
//! to a new block: the container's [`MemoryIdentity`] changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};
use typelib_schema::{
    align_up, TypeDefinition, TypeFlags, TypeKind, TypeUid, DEFAULT_CONTAINER_SIZE,
};

use crate::address::{Address, MemoryIdentity};
use crate::config::HeapEngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::layout::{LayoutOp, MemoryLayout};
use crate::{EngineStats, MemoryEngine};

/// First base address handed out
const FIRST_BASE: u64 = 0x10000;

/// Alignment of block bases, and the gap left between blocks
const BLOCK_ALIGN: usize = 16;

/// Decoded container slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Slot {
    base: u64,
    len: usize,
    capacity: usize,
}

impl Slot {
    fn element(&self, index: usize, element_size: usize) -> EngineResult<Address> {
        index
            .checked_mul(element_size)
            .and_then(|offset| self.base.checked_add(offset as u64))
            .map(Address::new)
            .ok_or(EngineError::TooLarge {
                count: index,
                element_size,
            })
    }

    fn identity(&self) -> MemoryIdentity {
        MemoryIdentity {
            base: Address::new(self.base),
            capacity: self.capacity,
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_le_bytes(buf)
        };
        Self {
            base: word(0),
            len: word(1) as usize,
            capacity: word(2) as usize,
        }
    }

    fn encode(&self) -> [u8; DEFAULT_CONTAINER_SIZE] {
        let mut out = [0u8; DEFAULT_CONTAINER_SIZE];
        out[0..8].copy_from_slice(&self.base.to_le_bytes());
        out[8..16].copy_from_slice(&(self.len as u64).to_le_bytes());
        out[16..24].copy_from_slice(&(self.capacity as u64).to_le_bytes());
        out
    }
}

/// In-process memory engine
pub struct HeapEngine {
    blocks: BTreeMap<u64, Vec<u8>>,
    next_base: u64,
    config: HeapEngineConfig,
    layouts: DashMap<TypeUid, Arc<MemoryLayout>>,
}

impl Default for HeapEngine {
    fn default() -> Self {
        Self::new(HeapEngineConfig::default())
    }
}

impl HeapEngine {
    pub fn new(config: HeapEngineConfig) -> Self {
        Self {
            blocks: BTreeMap::new(),
            next_base: FIRST_BASE,
            config,
            layouts: DashMap::new(),
        }
    }

    pub fn config(&self) -> &HeapEngineConfig {
        &self.config
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Allocate a zeroed block for `count` elements of `element_size` bytes
    fn alloc_block(&mut self, count: usize, element_size: usize) -> EngineResult<u64> {
        let too_large = || EngineError::TooLarge {
            count,
            element_size,
        };
        let size = count
            .checked_mul(element_size)
            .filter(|&size| size <= self.config.max_block_size)
            .ok_or_else(too_large)?;
        let span = align_up(size.max(1), BLOCK_ALIGN) + BLOCK_ALIGN;
        let next = self
            .next_base
            .checked_add(span as u64)
            .ok_or_else(too_large)?;

        let base = std::mem::replace(&mut self.next_base, next);
        self.blocks.insert(base, vec![0; size]);
        Ok(base)
    }

    fn free_block(&mut self, base: u64) -> EngineResult<()> {
        self.blocks
            .remove(&base)
            .map(drop)
            .ok_or(EngineError::InvalidAddress {
                address: Address::new(base),
                len: 0,
            })
    }

    /// Find the block holding `[address, address + len)`
    fn locate(&self, address: Address, len: usize) -> EngineResult<(u64, usize)> {
        let invalid = || EngineError::InvalidAddress { address, len };
        let (&base, block) = self
            .blocks
            .range(..=address.get())
            .next_back()
            .ok_or_else(invalid)?;
        let offset = (address.get() - base) as usize;
        match offset.checked_add(len) {
            Some(end) if end <= block.len() => Ok((base, offset)),
            _ => Err(invalid()),
        }
    }

    fn zero(&mut self, address: Address, len: usize) -> EngineResult<()> {
        if len == 0 {
            return Ok(());
        }
        let (base, offset) = self.locate(address, len)?;
        if let Some(block) = self.blocks.get_mut(&base) {
            block[offset..offset + len].fill(0);
        }
        Ok(())
    }

    // ========================================================================
    // Container slots
    // ========================================================================

    fn element_type(ty: &TypeDefinition) -> EngineResult<&Arc<TypeDefinition>> {
        match ty.kind() {
            TypeKind::Container { element, .. } => Ok(element),
            _ => Err(EngineError::mismatch(ty.name(), "not a container")),
        }
    }

    fn slot_at(&self, address: Address) -> EngineResult<Slot> {
        let bytes = self.read(address, DEFAULT_CONTAINER_SIZE)?;
        Ok(Slot::decode(&bytes))
    }

    fn store_slot(&mut self, address: Address, slot: Slot) -> EngineResult<()> {
        self.write(address, &slot.encode())
    }

    /// Move the elements of `slot` to a buffer holding at least `needed`
    fn grow(&mut self, slot: Slot, needed: usize, element_size: usize) -> EngineResult<Slot> {
        let capacity = self.config.grown_capacity(slot.capacity, needed);
        let base = self.alloc_block(capacity, element_size)?;

        let used = slot.len.saturating_mul(element_size);
        if used > 0 {
            let bytes = self.read(Address::new(slot.base), used)?;
            self.write(Address::new(base), &bytes)?;
        }
        if slot.base != 0 {
            self.free_block(slot.base)?;
        }

        debug!(
            "Container buffer moved {:#x} -> {:#x} (capacity {} -> {})",
            slot.base, base, slot.capacity, capacity
        );
        Ok(Slot {
            base,
            len: slot.len,
            capacity,
        })
    }

    fn resize_slot(
        &mut self,
        element: &TypeDefinition,
        address: Address,
        len: usize,
    ) -> EngineResult<()> {
        let element_size = element.size();
        let mut slot = self.slot_at(address)?;

        if len < slot.len {
            for i in len..slot.len {
                self.release_nested(element, slot.element(i, element_size)?)?;
            }
            self.zero(
                slot.element(len, element_size)?,
                (slot.len - len).saturating_mul(element_size),
            )?;
        } else if len > slot.capacity {
            slot = self.grow(slot, len, element_size)?;
        }

        slot.len = len;
        self.store_slot(address, slot)
    }

    /// Free the buffers owned by the value at `address`, leaving the value's
    /// own bytes in place
    fn release_nested(&mut self, ty: &TypeDefinition, address: Address) -> EngineResult<()> {
        if !ty.flags().contains(TypeFlags::CONTAINS_CONTAINERS) {
            return Ok(());
        }

        match ty.kind() {
            TypeKind::Compound(compound) => {
                for field in compound.fields() {
                    self.release_nested(field.type_def(), address.offset(field.offset()))?;
                }
            }
            TypeKind::Array { element, len } => {
                for i in 0..*len {
                    self.release_nested(element, address.offset(i * element.size()))?;
                }
            }
            TypeKind::Container { element, .. } => {
                let slot = self.slot_at(address)?;
                for i in 0..slot.len {
                    self.release_nested(element, slot.element(i, element.size())?)?;
                }
                if slot.base != 0 {
                    self.free_block(slot.base)?;
                }
                self.store_slot(address, Slot::default())?;
            }
            _ => {}
        }
        Ok(())
    }

    // ========================================================================
    // Layout interpretation
    // ========================================================================

    fn dump_ops(
        &self,
        ops: &[LayoutOp],
        address: Address,
        out: &mut Vec<u8>,
    ) -> EngineResult<Address> {
        let mut cursor = address;
        for op in ops {
            match op {
                LayoutOp::Memcpy(size) => {
                    out.extend_from_slice(&self.read(cursor, *size)?);
                    cursor = cursor.offset(*size);
                }
                LayoutOp::Array { len, body } => {
                    for _ in 0..*len {
                        cursor = self.dump_ops(body, cursor, out)?;
                    }
                }
                LayoutOp::Container { element, body } => {
                    let slot = self.slot_at(cursor)?;
                    out.extend_from_slice(&(slot.len as u64).to_le_bytes());
                    for i in 0..slot.len {
                        self.dump_ops(body, slot.element(i, element.size())?, out)?;
                    }
                    cursor = cursor.offset(DEFAULT_CONTAINER_SIZE);
                }
            }
        }
        Ok(cursor)
    }

    fn load_ops(
        &mut self,
        ops: &[LayoutOp],
        address: Address,
        bytes: &[u8],
        pos: &mut usize,
    ) -> EngineResult<Address> {
        let mut cursor = address;
        for op in ops {
            match op {
                LayoutOp::Memcpy(size) => {
                    let chunk = take(bytes, pos, *size)?;
                    self.write(cursor, chunk)?;
                    cursor = cursor.offset(*size);
                }
                LayoutOp::Array { len, body } => {
                    for _ in 0..*len {
                        cursor = self.load_ops(body, cursor, bytes, pos)?;
                    }
                }
                LayoutOp::Container { element, body } => {
                    let mut count = [0u8; 8];
                    count.copy_from_slice(take(bytes, pos, 8)?);
                    let count = u64::from_le_bytes(count) as usize;

                    // Refuse counts the remaining bytes cannot possibly hold
                    // before allocating for them
                    let needed = count.saturating_mul(min_dump_size(body));
                    let available = bytes.len() - *pos;
                    if needed > available {
                        return Err(EngineError::Truncated {
                            needed: pos.saturating_add(needed),
                            available: bytes.len(),
                        });
                    }

                    self.resize_slot(element, cursor, count)?;
                    let slot = self.slot_at(cursor)?;
                    for i in 0..count {
                        self.load_ops(body, slot.element(i, element.size())?, bytes, pos)?;
                    }
                    cursor = cursor.offset(DEFAULT_CONTAINER_SIZE);
                }
            }
        }
        Ok(cursor)
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> EngineResult<&'a [u8]> {
    let end = *pos + len;
    if end > bytes.len() {
        return Err(EngineError::Truncated {
            needed: end,
            available: bytes.len(),
        });
    }
    let chunk = &bytes[*pos..end];
    *pos = end;
    Ok(chunk)
}

/// Smallest number of dumped bytes one application of `ops` produces
fn min_dump_size(ops: &[LayoutOp]) -> usize {
    ops.iter()
        .map(|op| match op {
            LayoutOp::Memcpy(size) => *size,
            LayoutOp::Array { len, body } => len * min_dump_size(body),
            LayoutOp::Container { .. } => 8,
        })
        .sum()
}

impl MemoryEngine for HeapEngine {
    fn allocate(&mut self, ty: &TypeDefinition) -> EngineResult<Address> {
        let base = self.alloc_block(1, ty.size())?;
        trace!("Allocated {} at {:#x}", ty.name(), base);
        Ok(Address::new(base))
    }

    fn release(&mut self, ty: &TypeDefinition, address: Address) -> EngineResult<()> {
        if !self.blocks.contains_key(&address.get()) {
            return Err(EngineError::InvalidAddress { address, len: 0 });
        }
        self.release_nested(ty, address)?;
        self.free_block(address.get())?;
        trace!("Released {} at {}", ty.name(), address);
        Ok(())
    }

    fn is_valid(&self, address: Address, len: usize) -> bool {
        self.locate(address, len).is_ok()
    }

    fn read(&self, address: Address, len: usize) -> EngineResult<Vec<u8>> {
        let (base, offset) = self.locate(address, len)?;
        Ok(self.blocks[&base][offset..offset + len].to_vec())
    }

    fn write(&mut self, address: Address, bytes: &[u8]) -> EngineResult<()> {
        let (base, offset) = self.locate(address, bytes.len())?;
        if let Some(block) = self.blocks.get_mut(&base) {
            block[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn copy_value(&mut self, ty: &TypeDefinition, dst: Address, src: Address) -> EngineResult<()> {
        if dst == src {
            return Ok(());
        }
        if !ty.flags().contains(TypeFlags::CONTAINS_CONTAINERS) {
            let bytes = self.read(src, ty.size())?;
            return self.write(dst, &bytes);
        }

        match ty.kind() {
            TypeKind::Compound(compound) => {
                for field in compound.fields() {
                    self.copy_value(
                        field.type_def(),
                        dst.offset(field.offset()),
                        src.offset(field.offset()),
                    )?;
                }
            }
            TypeKind::Array { element, len } => {
                let size = element.size();
                for i in 0..*len {
                    self.copy_value(element, dst.offset(i * size), src.offset(i * size))?;
                }
            }
            TypeKind::Container { element, .. } => {
                let size = element.size();
                let from = self.slot_at(src)?;
                self.resize_slot(element, dst, from.len)?;
                let to = self.slot_at(dst)?;
                for i in 0..from.len {
                    self.copy_value(element, to.element(i, size)?, from.element(i, size)?)?;
                }
                let extra = ty.size().saturating_sub(DEFAULT_CONTAINER_SIZE);
                if extra > 0 {
                    let bytes = self.read(src.offset(DEFAULT_CONTAINER_SIZE), extra)?;
                    self.write(dst.offset(DEFAULT_CONTAINER_SIZE), &bytes)?;
                }
            }
            _ => {
                let bytes = self.read(src, ty.size())?;
                self.write(dst, &bytes)?;
            }
        }
        Ok(())
    }

    fn values_equal(&self, ty: &TypeDefinition, a: Address, b: Address) -> EngineResult<bool> {
        match ty.kind() {
            TypeKind::Null => Ok(true),
            TypeKind::Compound(compound) => {
                for field in compound.fields() {
                    let offset = field.offset();
                    if !self.values_equal(field.type_def(), a.offset(offset), b.offset(offset))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TypeKind::Array { element, len } => {
                let size = element.size();
                for i in 0..*len {
                    if !self.values_equal(element, a.offset(i * size), b.offset(i * size))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TypeKind::Container { element, .. } => {
                let (left, right) = (self.slot_at(a)?, self.slot_at(b)?);
                if left.len != right.len {
                    return Ok(false);
                }
                let size = element.size();
                for i in 0..left.len {
                    let (x, y) = (left.element(i, size)?, right.element(i, size)?);
                    if !self.values_equal(element, x, y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(self.read(a, ty.size())? == self.read(b, ty.size())?),
        }
    }

    fn container_len(&self, ty: &TypeDefinition, address: Address) -> EngineResult<usize> {
        Self::element_type(ty)?;
        Ok(self.slot_at(address)?.len)
    }

    fn container_identity(
        &self,
        ty: &TypeDefinition,
        address: Address,
    ) -> EngineResult<MemoryIdentity> {
        Self::element_type(ty)?;
        Ok(self.slot_at(address)?.identity())
    }

    fn container_element(
        &self,
        ty: &TypeDefinition,
        address: Address,
        index: usize,
    ) -> EngineResult<Address> {
        let element = Self::element_type(ty)?;
        let slot = self.slot_at(address)?;
        if index >= slot.len {
            return Err(EngineError::OutOfBounds {
                type_name: ty.name().to_string(),
                index,
                len: slot.len,
            });
        }
        slot.element(index, element.size())
    }

    fn container_push(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        value: Option<Address>,
    ) -> EngineResult<Address> {
        let element = Self::element_type(ty)?.clone();
        let size = element.size();

        // Stage the new element outside the container first: `value` may
        // live inside the buffer that is about to move
        let staged = match value {
            Some(src) => {
                let tmp = self.alloc_block(1, size)?;
                if let Err(err) = self.copy_value(&element, Address::new(tmp), src) {
                    self.release_nested(&element, Address::new(tmp))?;
                    self.free_block(tmp)?;
                    return Err(err);
                }
                Some(tmp)
            }
            None => None,
        };

        let mut slot = self.slot_at(address)?;
        if slot.len == slot.capacity {
            slot = self.grow(slot, slot.len + 1, size)?;
        }
        let dst = slot.element(slot.len, size)?;
        slot.len += 1;
        self.store_slot(address, slot)?;

        // Raw move: the staged element's own buffers change owner
        if let Some(tmp) = staged {
            if size > 0 {
                let bytes = self.read(Address::new(tmp), size)?;
                self.write(dst, &bytes)?;
            }
            self.free_block(tmp)?;
        }
        Ok(dst)
    }

    fn container_erase(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        indices: &[usize],
    ) -> EngineResult<()> {
        let element = Self::element_type(ty)?.clone();
        let size = element.size();
        let mut slot = self.slot_at(address)?;

        let mut doomed = indices.to_vec();
        doomed.sort_unstable();
        doomed.dedup();
        if let Some(&index) = doomed.iter().find(|&&i| i >= slot.len) {
            return Err(EngineError::OutOfBounds {
                type_name: ty.name().to_string(),
                index,
                len: slot.len,
            });
        }
        if doomed.is_empty() {
            return Ok(());
        }

        for &i in &doomed {
            self.release_nested(&element, slot.element(i, size)?)?;
        }

        if size > 0 {
            let region = self.read(Address::new(slot.base), slot.len.saturating_mul(size))?;
            let mut kept = Vec::with_capacity(region.len());
            for (i, chunk) in region.chunks(size).enumerate() {
                if doomed.binary_search(&i).is_err() {
                    kept.extend_from_slice(chunk);
                }
            }
            kept.resize(region.len(), 0);
            self.write(Address::new(slot.base), &kept)?;
        }

        slot.len -= doomed.len();
        self.store_slot(address, slot)
    }

    fn container_clear(&mut self, ty: &TypeDefinition, address: Address) -> EngineResult<()> {
        let element = Self::element_type(ty)?.clone();
        self.resize_slot(&element, address, 0)
    }

    fn container_resize(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        len: usize,
    ) -> EngineResult<()> {
        let element = Self::element_type(ty)?.clone();
        self.resize_slot(&element, address, len)
    }

    fn memory_layout(&self, ty: &TypeDefinition) -> EngineResult<Arc<MemoryLayout>> {
        if let Some(layout) = self.layouts.get(&ty.uid()) {
            return Ok(layout.clone());
        }
        let layout = Arc::new(MemoryLayout::of(ty)?);
        self.layouts.insert(ty.uid(), layout.clone());
        Ok(layout)
    }

    fn forget_types(&mut self, uids: &[TypeUid]) {
        self.layouts.retain(|uid, _| !uids.contains(uid));
    }

    fn dump(&self, ty: &TypeDefinition, address: Address) -> EngineResult<Vec<u8>> {
        let layout = self.memory_layout(ty)?;
        let mut out = Vec::with_capacity(ty.size());
        self.dump_ops(layout.ops(), address, &mut out)?;
        Ok(out)
    }

    fn load(&mut self, ty: &TypeDefinition, address: Address, bytes: &[u8]) -> EngineResult<usize> {
        let layout = self.memory_layout(ty)?;
        let mut pos = 0;
        self.load_ops(layout.ops(), address, bytes, &mut pos)?;
        Ok(pos)
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            blocks: self.blocks.len(),
            bytes: self.blocks.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use typelib_schema::{CompoundBuilder, Registry};

    use super::*;
    use crate::Scalar;

    fn setup() -> (Registry, HeapEngine) {
        (Registry::with_standard_types(), HeapEngine::default())
    }

    fn push_int(engine: &mut HeapEngine, vector: &TypeDefinition, at: Address, value: i64) {
        let int = vector.element().unwrap().clone();
        let element = engine.container_push(vector, at, None).unwrap();
        engine.write_scalar(&int, element, Scalar::Int(value)).unwrap();
    }

    fn ints(engine: &HeapEngine, vector: &TypeDefinition, at: Address) -> Vec<i64> {
        let int = vector.element().unwrap();
        (0..engine.container_len(vector, at).unwrap())
            .map(|i| {
                let element = engine.container_element(vector, at, i).unwrap();
                engine.read_scalar(int, element).unwrap().as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_allocation_is_zeroed_and_bounded() {
        let (mut registry, mut engine) = setup();
        let ty = registry.build("/int32_t[4]").unwrap();
        let at = engine.allocate(&ty).unwrap();

        assert_eq!(engine.read(at, 16).unwrap(), vec![0; 16]);
        assert!(engine.is_valid(at, 16));
        assert!(!engine.is_valid(at, 17));
        assert!(!engine.is_valid(Address::NULL, 1));
    }

    #[test]
    fn test_released_address_stays_invalid() {
        let (mut registry, mut engine) = setup();
        let ty = registry.build("/double").unwrap();
        let at = engine.allocate(&ty).unwrap();
        engine.release(&ty, at).unwrap();

        let again = engine.allocate(&ty).unwrap();
        assert_ne!(at, again);
        assert!(matches!(
            engine.read(at, 8),
            Err(EngineError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_push_relocates_when_full() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</int32_t>").unwrap();
        let at = engine.allocate(&vector).unwrap();

        assert_eq!(
            engine.container_identity(&vector, at).unwrap(),
            MemoryIdentity::EMPTY
        );
        push_int(&mut engine, &vector, at, 1);
        let first = engine.container_identity(&vector, at).unwrap();
        assert_eq!(first.capacity, 4);

        for v in 2..=4 {
            push_int(&mut engine, &vector, at, v);
        }
        assert_eq!(engine.container_identity(&vector, at).unwrap(), first);

        push_int(&mut engine, &vector, at, 5);
        let moved = engine.container_identity(&vector, at).unwrap();
        assert_ne!(moved, first);
        assert_eq!(moved.capacity, 8);
        assert_eq!(ints(&engine, &vector, at), [1, 2, 3, 4, 5]);
        assert!(!engine.is_valid(first.base, 1));
    }

    #[test]
    fn test_erase_compacts_in_place() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</int32_t>").unwrap();
        let at = engine.allocate(&vector).unwrap();
        for v in 0..5 {
            push_int(&mut engine, &vector, at, v);
        }
        let identity = engine.container_identity(&vector, at).unwrap();

        engine.container_erase(&vector, at, &[3, 1, 3]).unwrap();
        assert_eq!(ints(&engine, &vector, at), [0, 2, 4]);
        assert_eq!(engine.container_identity(&vector, at).unwrap(), identity);

        assert!(matches!(
            engine.container_erase(&vector, at, &[3]),
            Err(EngineError::OutOfBounds { index: 3, len: 3, .. })
        ));
    }

    #[test]
    fn test_push_copy_of_own_element() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</int32_t>").unwrap();
        let at = engine.allocate(&vector).unwrap();
        for v in 0..4 {
            push_int(&mut engine, &vector, at, v * 10);
        }

        // The source element moves with the buffer during this push
        let src = engine.container_element(&vector, at, 2).unwrap();
        engine.container_push(&vector, at, Some(src)).unwrap();
        assert_eq!(ints(&engine, &vector, at), [0, 10, 20, 30, 20]);
    }

    #[test]
    fn test_deep_copy_and_equality() {
        let (mut registry, mut engine) = setup();
        let ty = registry
            .create_compound(
                CompoundBuilder::new("/Holder")
                    .field("id", "/int32_t")
                    .field("values", "/std/vector</int32_t>"),
            )
            .unwrap();
        let vector = registry.get("/std/vector</int32_t>").unwrap();
        let offset = ty.field("values").unwrap().offset();

        let a = engine.allocate(&ty).unwrap();
        let b = engine.allocate(&ty).unwrap();
        push_int(&mut engine, &vector, a.offset(offset), 7);
        push_int(&mut engine, &vector, a.offset(offset), 8);

        assert!(!engine.values_equal(&ty, a, b).unwrap());
        engine.copy_value(&ty, b, a).unwrap();
        assert!(engine.values_equal(&ty, a, b).unwrap());

        // Deep: the copies do not share a buffer
        let ia = engine.container_identity(&vector, a.offset(offset)).unwrap();
        let ib = engine.container_identity(&vector, b.offset(offset)).unwrap();
        assert_ne!(ia.base, ib.base);
    }

    #[test]
    fn test_release_frees_nested_buffers() {
        let (mut registry, mut engine) = setup();
        let ty = registry.build("/std/vector</std/vector</int8_t>>").unwrap();
        let inner = registry.get("/std/vector</int8_t>").unwrap();
        let at = engine.allocate(&ty).unwrap();
        for _ in 0..3 {
            let element = engine.container_push(&ty, at, None).unwrap();
            engine.container_resize(&inner, element, 5).unwrap();
        }
        assert_eq!(engine.stats().blocks, 5);

        engine.release(&ty, at).unwrap();
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_dump_load() {
        let (mut registry, mut engine) = setup();
        let ty = registry
            .create_compound(
                CompoundBuilder::new("/Rec")
                    .field("a", "/int16_t")
                    .field("v", "/std/vector</int32_t>"),
            )
            .unwrap();
        let vector = registry.get("/std/vector</int32_t>").unwrap();
        let int16 = registry.get("/int16_t").unwrap();
        let offset = ty.field("v").unwrap().offset();

        let src = engine.allocate(&ty).unwrap();
        engine.write_scalar(&int16, src, Scalar::Int(-3)).unwrap();
        push_int(&mut engine, &vector, src.offset(offset), 42);

        let bytes = engine.dump(&ty, src).unwrap();
        // 8 bytes of `a` + padding, u64 count, one element
        assert_eq!(bytes.len(), 8 + 8 + 4);
        assert_eq!(&bytes[8..16], &1u64.to_le_bytes());

        let dst = engine.allocate(&ty).unwrap();
        assert_eq!(engine.load(&ty, dst, &bytes).unwrap(), bytes.len());
        assert!(engine.values_equal(&ty, src, dst).unwrap());

        assert!(matches!(
            engine.load(&ty, dst, &bytes[..bytes.len() - 1]),
            Err(EngineError::Truncated { .. })
        ));
    }

    #[test]
    fn test_huge_resize_is_rejected() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</double>").unwrap();
        let at = engine.allocate(&vector).unwrap();
        engine.container_resize(&vector, at, 3).unwrap();
        let before = engine.container_identity(&vector, at).unwrap();

        for len in [usize::MAX / 4, usize::MAX, usize::MAX / 16] {
            assert!(matches!(
                engine.container_resize(&vector, at, len),
                Err(EngineError::TooLarge { element_size: 8, .. })
            ));
        }

        assert_eq!(engine.container_len(&vector, at).unwrap(), 3);
        assert_eq!(engine.container_identity(&vector, at).unwrap(), before);
    }

    #[test]
    fn test_block_limit_applies_to_allocation() {
        let (mut registry, _) = setup();
        let mut engine = HeapEngine::new(HeapEngineConfig {
            max_block_size: 64,
            ..Default::default()
        });
        let small = registry.build("/double[8]").unwrap();
        let large = registry.build("/double[9]").unwrap();

        assert!(engine.allocate(&small).is_ok());
        assert!(matches!(
            engine.allocate(&large),
            Err(EngineError::TooLarge { count: 1, element_size: 72 })
        ));
    }

    #[test]
    fn test_forget_types_drops_cached_layouts() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</int32_t>").unwrap();
        let array = registry.build("/int32_t[4]").unwrap();
        let first = engine.memory_layout(&vector).unwrap();
        engine.memory_layout(&array).unwrap();
        assert_eq!(engine.layouts.len(), 2);

        engine.forget_types(&[vector.uid()]);
        assert_eq!(engine.layouts.len(), 1);
        let again = engine.memory_layout(&vector).unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(first.ops().len(), again.ops().len());
    }

    #[test]
    fn test_load_rejects_absurd_counts() {
        let (mut registry, mut engine) = setup();
        let vector = registry.build("/std/vector</int32_t>").unwrap();
        let at = engine.allocate(&vector).unwrap();
        let bytes = u64::MAX.to_le_bytes();
        assert!(matches!(
            engine.load(&vector, at, &bytes),
            Err(EngineError::Truncated { .. })
        ));
    }
}
