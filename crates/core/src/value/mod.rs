//! Value proxies
//!
//! A [`Value`] is a typed window on memory held by the runtime's engine. It
//! never owns the bytes it shows; the root of a freshly allocated tree holds
//! an [`Allocation`] that every descendant shares, so memory is released
//! when the last proxy into it drops.
//!
//! ```text
//!   root (Compound)                     ProxyState
//!    ├── "pos"  ──► child (Array)        flags      FROZEN | INVALIDATED
//!    │              ├── [0] ──► child    parent     weak link upwards
//!    │              └── [1] ──► child    children   field or index cache
//!    └── "path" ──► child (Container)    aliases    views made by cast()
//!                   └── [0] ──► child    identity   container buffer seen
//! ```
//!
//! Children are cached: accessing the same field twice yields the same
//! proxy. Freezing and invalidation walk the cache and the aliases, so they
//! reach exactly the proxies that were handed out.

mod container;
mod state;
mod write;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};
use typelib_engine::{Address, Scalar};
use typelib_schema::{TypeDefinition, TypeKind};

use crate::convert::{HostValue, ToHostPlan};
use crate::error::{Error, Result};
use crate::runtime::{Allocation, Runtime};

pub use state::StateFlags;
use state::ProxyState;

/// Child selector: a field name or an element index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key<'a> {
    Field(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Key::Field(name)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(name: &'a String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, ".{name}"),
            Key::Index(index) => write!(f, "[{index}]"),
        }
    }
}

pub(crate) struct ValueInner {
    runtime: Runtime,
    ty: Arc<TypeDefinition>,
    address: Address,
    owner: Option<Arc<Allocation>>,
    state: Mutex<ProxyState>,
}

/// Typed proxy over engine memory
#[derive(Clone)]
pub struct Value {
    inner: Arc<ValueInner>,
}

impl Value {
    // ========================================================================
    // Construction
    // ========================================================================

    pub(crate) fn new_root(
        runtime: Runtime,
        ty: Arc<TypeDefinition>,
        address: Address,
        owner: Option<Arc<Allocation>>,
    ) -> Result<Value> {
        Self::build(runtime, ty, address, owner, ProxyState::new(StateFlags::empty(), None))
    }

    fn build(
        runtime: Runtime,
        ty: Arc<TypeDefinition>,
        address: Address,
        owner: Option<Arc<Allocation>>,
        mut state: ProxyState,
    ) -> Result<Value> {
        if ty.is_container() {
            state.identity =
                Some(runtime.with_engine(|engine| engine.container_identity(&ty, address))?);
        }
        Ok(Value {
            inner: Arc::new(ValueInner {
                runtime,
                ty,
                address,
                owner,
                state: Mutex::new(state),
            }),
        })
    }

    /// Proxy sharing this one's allocation; frozen if this one is
    fn derive(&self, ty: Arc<TypeDefinition>, address: Address, child: bool) -> Result<Value> {
        let flags = self.inner.state.lock().flags & StateFlags::FROZEN;
        let parent = child.then(|| Arc::downgrade(&self.inner));
        Self::build(
            self.inner.runtime.clone(),
            ty,
            address,
            self.inner.owner.clone(),
            ProxyState::new(flags, parent),
        )
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn type_def(&self) -> &Arc<TypeDefinition> {
        &self.inner.ty
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn flags(&self) -> StateFlags {
        self.inner.state.lock().flags
    }

    pub fn is_frozen(&self) -> bool {
        self.flags().contains(StateFlags::FROZEN)
    }

    pub fn is_invalidated(&self) -> bool {
        self.flags().contains(StateFlags::INVALIDATED)
    }

    /// Whether both handles are the same proxy
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Proxy this one was obtained from, if it is still alive
    pub fn parent(&self) -> Option<Value> {
        let parent = self.inner.state.lock().parent.clone()?;
        parent.upgrade().map(|inner| Value { inner })
    }

    /// Field names of a compound, in layout order
    pub fn field_names(&self) -> Vec<&str> {
        self.inner.ty.fields().iter().map(|f| f.name()).collect()
    }

    pub(crate) fn check_live(&self) -> Result<()> {
        if self.is_invalidated() {
            return Err(Error::InvalidatedAccess {
                type_name: self.inner.ty.name().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_mutable(&self) -> Result<()> {
        let flags = self.flags();
        if flags.contains(StateFlags::INVALIDATED) {
            return Err(Error::InvalidatedAccess {
                type_name: self.inner.ty.name().to_string(),
            });
        }
        if flags.contains(StateFlags::FROZEN) {
            return Err(Error::FrozenViolation {
                type_name: self.inner.ty.name().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn cached_child(&self, key: Key<'_>) -> Option<Value> {
        self.inner.state.lock().children.get(key)
    }

    pub(crate) fn cached_children(&self) -> Vec<Value> {
        self.inner.state.lock().children.values()
    }

    #[cfg(test)]
    pub(crate) fn cached_len(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    #[cfg(test)]
    pub(crate) fn alias_count(&self) -> usize {
        self.inner.state.lock().aliases.len()
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Proxy on a field or element, cached so repeated calls return the same
    /// proxy
    pub fn raw_get<'k>(&self, key: impl Into<Key<'k>>) -> Result<Value> {
        let key = key.into();
        self.check_live()?;
        if self.inner.ty.is_container() {
            self.sync_container()?;
        }

        if let Some(child) = self.cached_child(key) {
            if !child.is_invalidated() {
                return Ok(child);
            }
        }

        let (ty, address) = self.locate(key)?;
        let child = self.derive(ty, address, true)?;
        trace!("{}{}: new child proxy at {}", self.inner.ty.name(), key, address);

        let mut state = self.inner.state.lock();
        if state.flags.contains(StateFlags::INVALIDATED) {
            return Err(Error::InvalidatedAccess {
                type_name: self.inner.ty.name().to_string(),
            });
        }
        state.children.insert(key, child.clone());
        Ok(child)
    }

    /// Field or element converted to a host value
    pub fn get<'k>(&self, key: impl Into<Key<'k>>) -> Result<HostValue> {
        self.raw_get(key)?.to_host()
    }

    /// Convert `value` through from-host rules and store it in a field or
    /// element
    pub fn set<'k>(&self, key: impl Into<Key<'k>>, value: impl Into<HostValue>) -> Result<()> {
        self.check_mutable()?;
        self.raw_get(key)?.assign(&value.into())
    }

    /// Copy another value into a field or element
    pub fn raw_set<'k>(&self, key: impl Into<Key<'k>>, value: &Value) -> Result<()> {
        self.check_mutable()?;
        self.raw_get(key)?.copy_from(value)
    }

    fn locate(&self, key: Key<'_>) -> Result<(Arc<TypeDefinition>, Address)> {
        let ty = &self.inner.ty;
        match (ty.kind(), key) {
            (TypeKind::Compound(compound), Key::Field(name)) => {
                let field = compound.field(name).ok_or_else(|| Error::NoSuchField {
                    type_name: ty.name().to_string(),
                    field: name.to_string(),
                })?;
                Ok((field.type_def().clone(), self.inner.address.offset(field.offset())))
            }
            (TypeKind::Array { element, len }, Key::Index(index)) => {
                if index >= *len {
                    return Err(Error::OutOfBounds {
                        type_name: ty.name().to_string(),
                        index,
                        len: *len,
                    });
                }
                Ok((element.clone(), self.inner.address.offset(index * element.size())))
            }
            (TypeKind::Container { element, .. }, Key::Index(index)) => {
                let address = self.inner.runtime.with_engine(|engine| {
                    engine.container_element(ty, self.inner.address, index)
                })?;
                Ok((element.clone(), address))
            }
            (TypeKind::Compound(_), Key::Index(_)) => {
                Err(Error::mismatch(ty.name(), "compound fields are selected by name"))
            }
            (TypeKind::Array { .. } | TypeKind::Container { .. }, Key::Field(name)) => Err(
                Error::mismatch(ty.name(), format!("elements are selected by index, not '{name}'")),
            ),
            _ => Err(Error::mismatch(ty.name(), "value has no fields or elements")),
        }
    }

    /// Number of fields or elements
    pub fn len(&self) -> Result<usize> {
        self.check_live()?;
        let ty = &self.inner.ty;
        match ty.kind() {
            TypeKind::Compound(compound) => Ok(compound.fields().len()),
            TypeKind::Array { len, .. } => Ok(*len),
            TypeKind::Container { .. } => {
                self.sync_container()?;
                self.inner
                    .runtime
                    .with_engine(|engine| engine.container_len(ty, self.inner.address))
            }
            _ => Err(Error::mismatch(ty.name(), "value has no fields or elements")),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Reject writes through this proxy, its cached descendants and its casts
    pub fn freeze(&self) -> Result<()> {
        self.check_live()?;
        self.freeze_tree();
        debug!("Froze {} at {}", self.inner.ty.name(), self.inner.address);
        Ok(())
    }

    fn freeze_tree(&self) {
        let reached = {
            let mut state = self.inner.state.lock();
            if state.flags.contains(StateFlags::INVALIDATED) {
                return;
            }
            state.flags.insert(StateFlags::FROZEN);
            let mut reached = state.children.values();
            reached.extend(
                state
                    .aliases
                    .iter()
                    .filter_map(Weak::upgrade)
                    .map(|inner| Value { inner }),
            );
            reached
        };
        for value in reached {
            value.freeze_tree();
        }
    }

    /// Make this proxy, its cached descendants and its casts unusable
    ///
    /// Idempotent. The memory itself is untouched.
    pub fn invalidate(&self) {
        let reached = {
            let mut state = self.inner.state.lock();
            if state.flags.contains(StateFlags::INVALIDATED) {
                return;
            }
            state.flags.insert(StateFlags::INVALIDATED);
            state.parent = None;
            state.identity = None;
            let mut reached = state.children.take_all();
            reached.extend(
                state
                    .aliases
                    .drain(..)
                    .filter_map(|alias| alias.upgrade())
                    .map(|inner| Value { inner }),
            );
            reached
        };
        trace!(
            "Invalidated {} at {} ({} dependents)",
            self.inner.ty.name(),
            self.inner.address,
            reached.len()
        );
        for value in reached {
            value.invalidate();
        }
    }

    /// Deep copy into a fresh, unfrozen allocation
    pub fn dup(&self) -> Result<Value> {
        self.check_live()?;
        let runtime = &self.inner.runtime;
        let copy = runtime.new_value_of(&self.inner.ty)?;
        runtime.with_engine(|engine| {
            engine.copy_value(&self.inner.ty, copy.address(), self.inner.address)
        })?;
        Ok(copy)
    }

    /// View the same memory as another type that fits in it
    pub fn cast(&self, type_name: &str) -> Result<Value> {
        self.check_live()?;
        let target = self.inner.runtime.type_def(type_name)?;
        if target.size() > self.inner.ty.size() {
            return Err(Error::mismatch(
                self.inner.ty.name(),
                format!(
                    "cannot view {} bytes as {} ({} bytes)",
                    self.inner.ty.size(),
                    target.name(),
                    target.size()
                ),
            ));
        }

        let alias = self.derive(target, self.inner.address, false)?;
        {
            let mut state = self.inner.state.lock();
            state.aliases.retain(|a| a.strong_count() > 0);
            state.aliases.push(Arc::downgrade(&alias.inner));
        }
        debug!("Cast {} to {}", self.inner.ty.name(), alias.type_def().name());
        Ok(alias)
    }

    // ========================================================================
    // Conversion to host
    // ========================================================================

    /// Host value through to-host rules
    ///
    /// Without an applicable rule, numbers and enums become numbers and
    /// symbols; anything else stays a proxy.
    pub fn to_host(&self) -> Result<HostValue> {
        self.check_live()?;
        let runtime = &self.inner.runtime;
        match runtime
            .conversions()
            .resolve_to_host(&self.inner.ty, runtime.resolution())?
        {
            ToHostPlan::Rule(rule) => rule.convert(self),
            ToHostPlan::Elements => Ok(HostValue::List(self.each()?)),
            ToHostPlan::Native => self.native_host(),
        }
    }

    fn native_host(&self) -> Result<HostValue> {
        Ok(match self.inner.ty.kind() {
            TypeKind::Null => HostValue::Null,
            TypeKind::Numeric(_) => match self.to_scalar()? {
                Scalar::Int(v) => HostValue::Int(v),
                Scalar::UInt(v) => HostValue::UInt(v),
                Scalar::Float(v) => HostValue::Float(v),
            },
            TypeKind::Enum(_) => match self.symbol()? {
                Some(symbol) => HostValue::Symbol(symbol),
                None => HostValue::Int(self.to_i64()?),
            },
            _ => HostValue::Proxy(self.clone()),
        })
    }

    // ========================================================================
    // Scalars, enums and pointers
    // ========================================================================

    fn expect_scalar(&self) -> Result<()> {
        if self.inner.ty.is_scalar() || self.inner.ty.is_pointer() {
            Ok(())
        } else {
            Err(Error::mismatch(self.inner.ty.name(), "not a numeric, enum or pointer value"))
        }
    }

    pub fn to_scalar(&self) -> Result<Scalar> {
        self.check_live()?;
        self.expect_scalar()?;
        self.inner
            .runtime
            .with_engine(|engine| engine.read_scalar(&self.inner.ty, self.inner.address))
    }

    pub fn to_i64(&self) -> Result<i64> {
        let scalar = self.to_scalar()?;
        scalar.as_i64().ok_or_else(|| {
            Error::mismatch(self.inner.ty.name(), format!("{scalar} is not an i64"))
        })
    }

    pub fn to_u64(&self) -> Result<u64> {
        let scalar = self.to_scalar()?;
        scalar.as_u64().ok_or_else(|| {
            Error::mismatch(self.inner.ty.name(), format!("{scalar} is not a u64"))
        })
    }

    pub fn to_f64(&self) -> Result<f64> {
        Ok(self.to_scalar()?.as_f64())
    }

    /// Store a number, refusing values the type cannot hold
    pub fn set_scalar(&self, value: impl Into<Scalar>) -> Result<()> {
        self.check_mutable()?;
        self.expect_scalar()?;
        let value = value.into();
        self.inner.runtime.with_engine(|engine| {
            engine.write_scalar(&self.inner.ty, self.inner.address, value)
        })
    }

    /// Symbol of the stored enum value, `None` when it has no name
    pub fn symbol(&self) -> Result<Option<String>> {
        let Some(def) = self.inner.ty.as_enum() else {
            return Err(Error::mismatch(self.inner.ty.name(), "not an enum"));
        };
        let value = self.to_i64()?;
        Ok(def.name_of(value).map(str::to_string))
    }

    pub fn set_symbol(&self, symbol: &str) -> Result<()> {
        let Some(def) = self.inner.ty.as_enum() else {
            return Err(Error::mismatch(self.inner.ty.name(), "not an enum"));
        };
        let value = def.value_of(symbol).ok_or_else(|| {
            Error::mismatch(self.inner.ty.name(), format!("unknown symbol '{symbol}'"))
        })?;
        self.set_scalar(value)
    }

    fn expect_pointer(&self) -> Result<&Arc<TypeDefinition>> {
        self.inner
            .ty
            .pointer_target()
            .ok_or_else(|| Error::mismatch(self.inner.ty.name(), "not a pointer"))
    }

    pub fn is_null(&self) -> Result<bool> {
        self.expect_pointer()?;
        Ok(self.to_u64()? == 0)
    }

    /// Proxy on the pointed-to value; frozen if this pointer is
    pub fn deref(&self) -> Result<Value> {
        let target = self.expect_pointer()?.clone();
        let address = Address::new(self.to_u64()?);
        if address.is_null() {
            return Err(Error::mismatch(self.inner.ty.name(), "null pointer dereference"));
        }
        let value = self.inner.runtime.wrap_type(&target, address)?;
        if self.is_frozen() {
            value.freeze_tree();
        }
        Ok(value)
    }

    /// Store the address of `target`
    pub fn point_to(&self, target: &Value) -> Result<()> {
        let pointee = self.expect_pointer()?;
        target.check_live()?;
        if pointee.name() != target.type_def().name() {
            return Err(Error::mismatch(
                self.inner.ty.name(),
                format!("cannot point to {}", target.type_def().name()),
            ));
        }
        self.set_scalar(target.address().get())
    }

    // ========================================================================
    // Byte images
    // ========================================================================

    /// Self-contained byte image, container contents included
    pub fn to_byte_array(&self) -> Result<Vec<u8>> {
        self.check_live()?;
        self.inner
            .runtime
            .with_engine(|engine| engine.dump(&self.inner.ty, self.inner.address))
    }

    /// Restore from [`Value::to_byte_array`] output; the image must be
    /// consumed exactly
    pub fn load(&self, bytes: &[u8]) -> Result<()> {
        self.check_mutable()?;
        let ty = &self.inner.ty;
        let consumed = self.mutate_containers(|engine| engine.load(ty, self.inner.address, bytes))?;
        if consumed != bytes.len() {
            return Err(Error::Engine(typelib_engine::EngineError::InvalidSize {
                type_name: ty.name().to_string(),
                expected: consumed,
                actual: bytes.len(),
            }));
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} @ {}", self.inner.ty.name(), self.inner.address)?;
        let flags = self.flags();
        if !flags.is_empty() {
            write!(f, " {flags:?}")?;
        }
        write!(f, ")")
    }
}
