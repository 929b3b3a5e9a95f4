//! typelib engine - Memory Engine Contract
//!
//! This crate defines how typelib values reach the memory they describe:
//! - [`MemoryEngine`]: the contract every backing store implements
//! - [`HeapEngine`]: an in-process reference engine with a simulated
//!   address space
//! - [`MemoryLayout`]: the flattened copy program used by dump and load
//!
//! # Architecture
//!
//! ```text
//!   typelib-core (Value proxies)
//!          │  Address + &TypeDefinition
//!          ▼
//!   ┌──────────────────┐
//!   │   MemoryEngine   │  read / write / containers / dump / load
//!   └──────────────────┘
//!          │
//!          ▼
//!     HeapEngine (blocks)   or any foreign address space
//! ```
//!
//! Engines never see proxies. They operate on an address and the definition
//! of the value stored there, which keeps them free of any caching or
//! invalidation concerns.

pub mod address;
pub mod config;
pub mod error;
pub mod heap;
pub mod layout;
pub mod scalar;

use std::sync::Arc;

use typelib_schema::{TypeDefinition, TypeUid};

pub use address::{Address, MemoryIdentity};
pub use config::HeapEngineConfig;
pub use error::{EngineError, EngineResult};
pub use heap::HeapEngine;
pub use layout::{LayoutOp, MemoryLayout};
pub use scalar::Scalar;

/// Allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Live blocks, container buffers included
    pub blocks: usize,
    /// Bytes held by live blocks
    pub bytes: usize,
}

/// Backing store for typed values
///
/// Container operations take the container's definition and the address of
/// its slot. Element addresses returned by an engine are only valid until
/// the next operation that changes the container's [`MemoryIdentity`].
pub trait MemoryEngine: Send {
    /// Allocate zero-initialized memory for one value of `ty`
    fn allocate(&mut self, ty: &TypeDefinition) -> EngineResult<Address>;

    /// Free a value obtained from [`allocate`](Self::allocate), including
    /// every container buffer it owns
    fn release(&mut self, ty: &TypeDefinition, address: Address) -> EngineResult<()>;

    /// Whether `[address, address + len)` is live memory
    fn is_valid(&self, address: Address, len: usize) -> bool;

    fn read(&self, address: Address, len: usize) -> EngineResult<Vec<u8>>;

    fn write(&mut self, address: Address, bytes: &[u8]) -> EngineResult<()>;

    /// Read a numeric, enum or pointer value
    fn read_scalar(&self, ty: &TypeDefinition, address: Address) -> EngineResult<Scalar> {
        let bytes = self.read(address, ty.size())?;
        scalar::decode(ty, &bytes)
    }

    /// Write a numeric, enum or pointer value, refusing out-of-range input
    fn write_scalar(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        value: Scalar,
    ) -> EngineResult<()> {
        let bytes = scalar::encode(ty, value)?;
        self.write(address, &bytes)
    }

    /// Deep copy: containers in `dst` end up with their own buffers
    fn copy_value(&mut self, ty: &TypeDefinition, dst: Address, src: Address) -> EngineResult<()>;

    /// Structural equality (padding is ignored)
    fn values_equal(&self, ty: &TypeDefinition, a: Address, b: Address) -> EngineResult<bool>;

    fn container_len(&self, ty: &TypeDefinition, address: Address) -> EngineResult<usize>;

    fn container_identity(
        &self,
        ty: &TypeDefinition,
        address: Address,
    ) -> EngineResult<MemoryIdentity>;

    fn container_element(
        &self,
        ty: &TypeDefinition,
        address: Address,
        index: usize,
    ) -> EngineResult<Address>;

    /// Append an element, deep-copied from `value` or zero-initialized.
    /// Returns the new element's address.
    fn container_push(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        value: Option<Address>,
    ) -> EngineResult<Address>;

    /// Remove the elements at `indices` (any order, duplicates allowed)
    fn container_erase(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        indices: &[usize],
    ) -> EngineResult<()>;

    fn container_clear(&mut self, ty: &TypeDefinition, address: Address) -> EngineResult<()>;

    /// Truncate or extend with zero-initialized elements
    fn container_resize(
        &mut self,
        ty: &TypeDefinition,
        address: Address,
        len: usize,
    ) -> EngineResult<()>;

    fn memory_layout(&self, ty: &TypeDefinition) -> EngineResult<Arc<MemoryLayout>>;

    /// Drop anything cached for these types; called when a resize replaces
    /// their definitions
    fn forget_types(&mut self, _uids: &[TypeUid]) {}

    /// Serialize the value at `address` following its memory layout
    fn dump(&self, ty: &TypeDefinition, address: Address) -> EngineResult<Vec<u8>>;

    /// Overwrite the value at `address` from a dump; returns the number of
    /// bytes consumed
    fn load(&mut self, ty: &TypeDefinition, address: Address, bytes: &[u8]) -> EngineResult<usize>;

    fn stats(&self) -> EngineStats {
        EngineStats::default()
    }
}
