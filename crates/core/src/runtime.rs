//! Runtime context
//!
//! A [`Runtime`] ties together the three collaborators every value needs:
//!
//! ```text
//!                   ┌───────────────────────────┐
//!                   │          Runtime          │
//!                   │  RwLock<Registry>         │  schema lookups, resize
//!                   │  Mutex<dyn MemoryEngine>  │  all memory access
//!                   │  Arc<ConversionRegistry>  │  global or private rules
//!                   └─────────────┬─────────────┘
//!                                 │ cloned into
//!                                 ▼
//!                      Value proxies (Arc<ValueInner>)
//! ```
//!
//! The engine lock is only held for the duration of one engine call; user
//! code (conversion transforms, predicates) never runs under it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use typelib_engine::{Address, EngineResult, EngineStats, HeapEngine, MemoryEngine};
use typelib_schema::{Registry, TypeDefinition, TypeUid};

use crate::config::CoreConfig;
use crate::convert::{ConversionRegistry, Resolution};
use crate::error::{Error, Result};
use crate::simple::SimpleValueOptions;
use crate::value::Value;

struct RuntimeInner {
    registry: RwLock<Registry>,
    engine: Mutex<Box<dyn MemoryEngine>>,
    conversions: Arc<ConversionRegistry>,
    resolution: Resolution,
    simple_value: SimpleValueOptions,
}

/// Shared handle to a registry, a memory engine and conversion rules
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Builder for [`Runtime`]
pub struct RuntimeBuilder {
    registry: Registry,
    engine: Option<Box<dyn MemoryEngine>>,
    conversions: Option<Arc<ConversionRegistry>>,
    config: CoreConfig,
}

impl RuntimeBuilder {
    /// Use this engine instead of a [`HeapEngine`]
    pub fn engine(mut self, engine: impl MemoryEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Use a private rule set instead of [`ConversionRegistry::global`]
    pub fn conversions(mut self, conversions: Arc<ConversionRegistry>) -> Self {
        self.conversions = Some(conversions);
        self
    }

    pub fn config(mut self, config: &CoreConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn build(self) -> Runtime {
        let engine = self
            .engine
            .unwrap_or_else(|| Box::new(HeapEngine::new(self.config.engine.clone())));
        let conversions = self.conversions.unwrap_or_else(ConversionRegistry::global);

        info!("Runtime created with {} registered types", self.registry.len());
        Runtime {
            inner: Arc::new(RuntimeInner {
                registry: RwLock::new(self.registry),
                engine: Mutex::new(engine),
                conversions,
                resolution: self.config.conversions.resolution,
                simple_value: self.config.simple_value,
            }),
        }
    }
}

impl Runtime {
    /// Runtime over a heap engine and the global conversion rules
    pub fn new(registry: Registry) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Registry) -> RuntimeBuilder {
        RuntimeBuilder {
            registry,
            engine: None,
            conversions: None,
            config: CoreConfig::default(),
        }
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.registry.read()
    }

    pub fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.registry.write()
    }

    /// Look up a type, deriving `T[N]`, `T*` and `K<T>` names on demand
    pub fn type_def(&self, name: &str) -> Result<Arc<TypeDefinition>> {
        if let Ok(ty) = self.registry().get(name) {
            return Ok(ty);
        }
        Ok(self.registry_mut().build(name)?)
    }

    /// Resize types and rebuild their dependents
    ///
    /// Values that already exist keep the layout they were created with.
    pub fn resize(&self, sizes: &[(&str, usize)]) -> Result<Vec<String>> {
        let (rebuilt, replaced) = {
            let mut registry = self.registry_mut();
            let before: HashMap<String, TypeUid> = registry
                .names()
                .zip(registry.iter())
                .map(|(name, ty)| (name.to_string(), ty.uid()))
                .collect();
            let rebuilt = registry.resize(sizes)?;
            let replaced: Vec<TypeUid> = rebuilt
                .iter()
                .filter_map(|name| before.get(name).copied())
                .collect();
            (rebuilt, replaced)
        };
        self.with_engine(|engine| {
            engine.forget_types(&replaced);
            Ok(())
        })?;
        debug!("Resize rebuilt {} types", rebuilt.len());
        Ok(rebuilt)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    pub fn conversions(&self) -> &Arc<ConversionRegistry> {
        &self.inner.conversions
    }

    pub fn resolution(&self) -> Resolution {
        self.inner.resolution
    }

    /// Options configured for `to_simple_value`
    pub fn simple_value_options(&self) -> &SimpleValueOptions {
        &self.inner.simple_value
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Fresh zero-initialized value, released when its last proxy drops
    pub fn new_value(&self, type_name: &str) -> Result<Value> {
        let ty = self.type_def(type_name)?;
        self.new_value_of(&ty)
    }

    pub fn new_value_of(&self, ty: &Arc<TypeDefinition>) -> Result<Value> {
        let address = self.with_engine(|engine| engine.allocate(ty))?;
        let owner = Arc::new(Allocation {
            runtime: self.clone(),
            ty: ty.clone(),
            address,
        });
        Value::new_root(self.clone(), ty.clone(), address, Some(owner))
    }

    /// Proxy over memory the engine already holds; the memory is not
    /// released by the proxy
    pub fn wrap(&self, type_name: &str, address: Address) -> Result<Value> {
        let ty = self.type_def(type_name)?;
        self.wrap_type(&ty, address)
    }

    pub fn wrap_type(&self, ty: &Arc<TypeDefinition>, address: Address) -> Result<Value> {
        let size = ty.size();
        if !self.with_engine(|engine| Ok(engine.is_valid(address, size)))? {
            return Err(Error::Engine(typelib_engine::EngineError::InvalidAddress {
                address,
                len: size,
            }));
        }
        Value::new_root(self.clone(), ty.clone(), address, None)
    }

    /// Rebuild a value from the output of [`Value::to_byte_array`]
    pub fn from_buffer(&self, type_name: &str, bytes: &[u8]) -> Result<Value> {
        let value = self.new_value(type_name)?;
        value.load(bytes)?;
        Ok(value)
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.inner.engine.lock().stats()
    }

    /// Run one engine call under the engine lock
    pub(crate) fn with_engine<R>(
        &self,
        op: impl FnOnce(&mut dyn MemoryEngine) -> EngineResult<R>,
    ) -> Result<R> {
        let mut engine = self.inner.engine.lock();
        op(engine.as_mut()).map_err(Error::from)
    }
}

/// Memory allocated for a value tree, released on drop
pub(crate) struct Allocation {
    runtime: Runtime,
    ty: Arc<TypeDefinition>,
    address: Address,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let (ty, address) = (&self.ty, self.address);
        if let Err(err) = self.runtime.with_engine(|engine| engine.release(ty, address)) {
            warn!("Failed to release {} at {}: {}", ty.name(), address, err);
        }
    }
}
