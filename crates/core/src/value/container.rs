//! Container operations and cache synchronization
//!
//! Container mutations may move a buffer (growth) or shorten it (erase,
//! clear, resize). Element proxies handed out earlier point into that
//! buffer, so every mutation syncs the cached containers below the mutated
//! value against the engine before and after the operation:
//!
//! ```text
//!   identity changed  ──► invalidate every cached element
//!   length shrank     ──► invalidate cached elements at index >= len
//!   otherwise         ──► keep the cache
//! ```

use std::sync::Arc;

use tracing::debug;
use typelib_engine::{EngineResult, MemoryEngine};
use typelib_schema::{Specialization, TypeDefinition, TypeFlags};

use super::{StateFlags, Value};
use crate::accessor::Accessor;
use crate::convert::{HostValue, TypeMatcher};
use crate::error::{Error, Result};

impl Value {
    fn expect_container(&self) -> Result<&Arc<TypeDefinition>> {
        let ty = self.type_def();
        ty.element()
            .filter(|_| ty.is_container())
            .ok_or_else(|| Error::mismatch(ty.name(), "not a container"))
    }

    /// Compare the container's buffer with the one last observed and drop
    /// cached elements that no longer point into it
    pub(crate) fn sync_container(&self) -> Result<()> {
        let ty = self.type_def();
        let address = self.address();
        let (identity, len) = self.runtime().with_engine(|engine| {
            Ok((
                engine.container_identity(ty, address)?,
                engine.container_len(ty, address)?,
            ))
        })?;

        let (moved, stale) = {
            let mut state = self.inner.state.lock();
            if state.flags.contains(StateFlags::INVALIDATED) {
                return Ok(());
            }
            let moved = state.identity.is_some_and(|seen| seen != identity);
            state.identity = Some(identity);
            let stale = if moved {
                state.children.take_all()
            } else {
                state.children.split_from(len)
            };
            (moved, stale)
        };

        if !stale.is_empty() {
            debug!(
                "{} at {}: dropping {} cached elements ({})",
                ty.name(),
                address,
                stale.len(),
                if moved { "buffer moved" } else { "shrunk" }
            );
            for element in stale {
                element.invalidate();
            }
        }
        Ok(())
    }

    /// Run an engine operation that may reshape containers inside this value
    pub(crate) fn mutate_containers<R>(
        &self,
        op: impl FnOnce(&mut dyn MemoryEngine) -> EngineResult<R>,
    ) -> Result<R> {
        let ty = self.type_def();
        if !ty.is_container() && !ty.flags().contains(TypeFlags::CONTAINS_CONTAINERS) {
            return self.runtime().with_engine(op);
        }

        let tracked = Accessor::find_in_type(ty, &TypeMatcher::kind(Specialization::Container))
            .resolve_cached(self);
        for container in &tracked {
            container.sync_container()?;
        }

        let result = self.runtime().with_engine(op);

        for container in &tracked {
            container.sync_container()?;
        }
        result
    }

    /// Invalidate cached elements at `index` and after
    fn drop_cached_from(&self, index: usize) {
        let stale = self.inner.state.lock().children.split_from(index);
        for element in stale {
            element.invalidate();
        }
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Proxies on every element of an array or container
    pub fn raw_each(&self) -> Result<Vec<Value>> {
        self.check_live()?;
        let len = match self.type_def().specialization() {
            Specialization::Array | Specialization::Container => self.len()?,
            _ => {
                return Err(Error::mismatch(
                    self.type_def().name(),
                    "not an array or container",
                ))
            }
        };
        (0..len).map(|index| self.raw_get(index)).collect()
    }

    /// Every element converted to a host value
    pub fn each(&self) -> Result<Vec<HostValue>> {
        self.raw_each()?.iter().map(Value::to_host).collect()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Append a value converted from the host side
    ///
    /// If the conversion fails the new element is removed again.
    pub fn push(&self, value: impl Into<HostValue>) -> Result<()> {
        self.check_mutable()?;
        let element = self.expect_container()?.clone();
        let host = value.into();
        if let HostValue::Proxy(source) = &host {
            if source.type_def().name() == element.name() {
                return self.raw_push(source);
            }
        }

        let (ty, address) = (self.type_def(), self.address());
        let len = self.mutate_containers(|engine| {
            engine.container_push(ty, address, None)?;
            engine.container_len(ty, address)
        })?;

        let index = len - 1;
        if let Err(err) = self.raw_get(index).and_then(|slot| slot.assign(&host)) {
            debug!("{}: rolling back push ({})", ty.name(), err);
            self.erase_at(&[index])?;
            return Err(err);
        }
        Ok(())
    }

    /// Append a deep copy of `value`
    pub fn raw_push(&self, value: &Value) -> Result<()> {
        self.check_mutable()?;
        let element = self.expect_container()?;
        value.check_live()?;
        if value.type_def().name() != element.name() {
            return Err(Error::mismatch(
                self.type_def().name(),
                format!("cannot push a {}", value.type_def().name()),
            ));
        }
        let (ty, address, source) = (self.type_def(), self.address(), value.address());
        self.mutate_containers(|engine| engine.container_push(ty, address, Some(source)))?;
        Ok(())
    }

    /// Remove the elements at `indices`
    ///
    /// Elements after the first removed index shift, so their cached proxies
    /// are invalidated.
    pub fn erase_at(&self, indices: &[usize]) -> Result<()> {
        self.check_mutable()?;
        self.expect_container()?;
        let Some(&first) = indices.iter().min() else {
            return Ok(());
        };
        let (ty, address) = (self.type_def(), self.address());
        self.mutate_containers(|engine| engine.container_erase(ty, address, indices))?;
        self.drop_cached_from(first);
        Ok(())
    }

    /// Remove every element equal to `value`; returns how many were removed
    pub fn erase(&self, value: impl Into<HostValue>) -> Result<usize> {
        self.check_mutable()?;
        let element = self.expect_container()?.clone();
        let probe = match value.into() {
            HostValue::Proxy(probe) => probe,
            host => {
                let probe = self.runtime().new_value_of(&element)?;
                probe.assign(&host)?;
                probe
            }
        };
        probe.check_live()?;
        if probe.type_def().name() != element.name() {
            return Err(Error::mismatch(
                self.type_def().name(),
                format!("cannot compare elements with a {}", probe.type_def().name()),
            ));
        }

        let len = self.len()?;
        let (ty, address) = (self.type_def(), self.address());
        let matching = self.runtime().with_engine(|engine| {
            let mut matching = Vec::new();
            for index in 0..len {
                let at = engine.container_element(ty, address, index)?;
                if engine.values_equal(&element, at, probe.address())? {
                    matching.push(index);
                }
            }
            Ok(matching)
        })?;

        self.erase_at(&matching)?;
        Ok(matching.len())
    }

    /// Remove the elements for which `predicate` holds
    ///
    /// The predicate sees the cached element proxies.
    pub fn delete_if<F>(&self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&Value) -> Result<bool>,
    {
        self.check_mutable()?;
        self.expect_container()?;
        let mut doomed = Vec::new();
        for (index, element) in self.raw_each()?.iter().enumerate() {
            if predicate(element)? {
                doomed.push(index);
            }
        }
        self.erase_at(&doomed)?;
        Ok(doomed.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.check_mutable()?;
        self.expect_container()?;
        let (ty, address) = (self.type_def(), self.address());
        self.mutate_containers(|engine| engine.container_clear(ty, address))
    }

    /// Truncate, or extend with zero-initialized elements
    pub fn resize(&self, len: usize) -> Result<()> {
        self.check_mutable()?;
        self.expect_container()?;
        let (ty, address) = (self.type_def(), self.address());
        self.mutate_containers(|engine| engine.container_resize(ty, address, len))
    }
}
