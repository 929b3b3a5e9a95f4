//! Per-proxy bookkeeping: lifecycle flags, cached children and aliases

use std::collections::{BTreeMap, HashMap};
use std::sync::Weak;

use bitflags::bitflags;
use typelib_engine::MemoryIdentity;

use super::{Key, Value, ValueInner};

bitflags! {
    /// Lifecycle flags of a proxy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u8 {
        /// Writes are rejected
        const FROZEN = 1 << 0;
        /// Every access is rejected; set once, never cleared
        const INVALIDATED = 1 << 1;
    }
}

/// Children handed out by a proxy, so repeated accesses return the same proxy
pub(crate) enum ChildCache {
    None,
    Fields(HashMap<String, Value>),
    Elements(BTreeMap<usize, Value>),
}

impl ChildCache {
    pub fn get(&self, key: Key<'_>) -> Option<Value> {
        match (self, key) {
            (ChildCache::Fields(fields), Key::Field(name)) => fields.get(name).cloned(),
            (ChildCache::Elements(elements), Key::Index(index)) => elements.get(&index).cloned(),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: Key<'_>, child: Value) {
        match key {
            Key::Field(name) => {
                if !matches!(self, ChildCache::Fields(_)) {
                    *self = ChildCache::Fields(HashMap::new());
                }
                if let ChildCache::Fields(fields) = self {
                    fields.insert(name.to_string(), child);
                }
            }
            Key::Index(index) => {
                if !matches!(self, ChildCache::Elements(_)) {
                    *self = ChildCache::Elements(BTreeMap::new());
                }
                if let ChildCache::Elements(elements) = self {
                    elements.insert(index, child);
                }
            }
        }
    }

    /// Cached children, elements in index order
    pub fn values(&self) -> Vec<Value> {
        match self {
            ChildCache::None => Vec::new(),
            ChildCache::Fields(fields) => fields.values().cloned().collect(),
            ChildCache::Elements(elements) => elements.values().cloned().collect(),
        }
    }

    pub fn take_all(&mut self) -> Vec<Value> {
        let children = self.values();
        *self = ChildCache::None;
        children
    }

    /// Remove cached elements at `index` and after
    pub fn split_from(&mut self, index: usize) -> Vec<Value> {
        match self {
            ChildCache::Elements(elements) => elements.split_off(&index).into_values().collect(),
            _ => Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        match self {
            ChildCache::None => 0,
            ChildCache::Fields(fields) => fields.len(),
            ChildCache::Elements(elements) => elements.len(),
        }
    }
}

pub(crate) struct ProxyState {
    pub flags: StateFlags,
    pub parent: Option<Weak<ValueInner>>,
    pub children: ChildCache,
    /// Views created by `cast`, frozen and invalidated along with this proxy
    /// while the caller still holds them
    pub aliases: Vec<Weak<ValueInner>>,
    /// Container buffer last observed; `None` for non-containers
    pub identity: Option<MemoryIdentity>,
}

impl ProxyState {
    pub fn new(flags: StateFlags, parent: Option<Weak<ValueInner>>) -> Self {
        Self {
            flags,
            parent,
            children: ChildCache::None,
            aliases: Vec::new(),
            identity: None,
        }
    }
}
