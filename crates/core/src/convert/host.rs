//! Host values
//!
//! [`HostValue`] is what a value looks like on the application side once
//! conversions ran: plain data, a proxy left as is, or an arbitrary Rust
//! object produced by a conversion rule.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use typelib_engine::Scalar;

use crate::error::{Error, Result};
use crate::value::Value;

/// Class of a host value, used to select from-host rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostClass {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    String,
    Symbol,
    Bytes,
    List,
    Map,
    Proxy,
    /// A Rust type carried by [`HostValue::Custom`]
    Custom(TypeId, &'static str),
}

impl HostClass {
    pub fn of<T: Any>() -> Self {
        HostClass::Custom(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostClass::Null => "null",
            HostClass::Bool => "bool",
            HostClass::Int => "int",
            HostClass::UInt => "uint",
            HostClass::Float => "float",
            HostClass::String => "string",
            HostClass::Symbol => "symbol",
            HostClass::Bytes => "bytes",
            HostClass::List => "list",
            HostClass::Map => "map",
            HostClass::Proxy => "proxy",
            HostClass::Custom(_, name) => name,
        }
    }
}

impl fmt::Display for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust object carried through the host side
#[derive(Clone)]
pub struct CustomValue {
    class: HostClass,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn class(&self) -> HostClass {
        self.class
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.class)
    }
}

/// Application-side representation of a value
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Enum symbol
    Symbol(String),
    Bytes(Vec<u8>),
    List(Vec<HostValue>),
    /// Name-keyed mapping, in insertion order
    Map(IndexMap<String, HostValue>),
    /// A proxy that no conversion applied to
    Proxy(Value),
    Custom(CustomValue),
}

impl HostValue {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        HostValue::Custom(CustomValue {
            class: HostClass::of::<T>(),
            value: Arc::new(value),
        })
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        HostValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn class(&self) -> HostClass {
        match self {
            HostValue::Null => HostClass::Null,
            HostValue::Bool(_) => HostClass::Bool,
            HostValue::Int(_) => HostClass::Int,
            HostValue::UInt(_) => HostClass::UInt,
            HostValue::Float(_) => HostClass::Float,
            HostValue::String(_) => HostClass::String,
            HostValue::Symbol(_) => HostClass::Symbol,
            HostValue::Bytes(_) => HostClass::Bytes,
            HostValue::List(_) => HostClass::List,
            HostValue::Map(_) => HostClass::Map,
            HostValue::Proxy(_) => HostClass::Proxy,
            HostValue::Custom(custom) => custom.class,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Numeric view of numbers and booleans
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            HostValue::Bool(b) => Some(Scalar::UInt(*b as u64)),
            HostValue::Int(v) => Some(Scalar::Int(*v)),
            HostValue::UInt(v) => Some(Scalar::UInt(*v)),
            HostValue::Float(v) => Some(Scalar::Float(*v)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar()?.as_i64()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().map(Scalar::as_f64)
    }

    /// Text of strings and symbols
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) | HostValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, HostValue>> {
        match self {
            HostValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Value> {
        match self {
            HostValue::Proxy(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            HostValue::Custom(custom) => custom.downcast_ref(),
            _ => None,
        }
    }

    /// JSON rendering of plain data
    ///
    /// Proxies and custom objects have no JSON form. Non-finite floats become
    /// `null`, as JSON has no spelling for them.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        use serde_json::Value as Json;

        Ok(match self {
            HostValue::Null => Json::Null,
            HostValue::Bool(b) => Json::Bool(*b),
            HostValue::Int(v) => Json::from(*v),
            HostValue::UInt(v) => Json::from(*v),
            HostValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            HostValue::String(s) | HostValue::Symbol(s) => Json::String(s.clone()),
            HostValue::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            HostValue::List(items) => Json::Array(
                items
                    .iter()
                    .map(HostValue::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            HostValue::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                Json::Object(out)
            }
            HostValue::Proxy(value) => {
                return Err(Error::conversion(
                    value.type_def().name(),
                    "proxies have no JSON form",
                ))
            }
            HostValue::Custom(custom) => {
                return Err(Error::conversion(
                    custom.class.name(),
                    "custom host objects have no JSON form",
                ))
            }
        })
    }
}

impl PartialEq for HostValue {
    /// Proxies and custom objects compare by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::UInt(a), HostValue::UInt(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Symbol(a), HostValue::Symbol(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Proxy(a), HostValue::Proxy(b)) => a.ptr_eq(b),
            (HostValue::Custom(a), HostValue::Custom(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false,
        }
    }
}

macro_rules! host_from {
    ($($ty:ty => $variant:ident as $as:ty),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(value: $ty) -> Self {
                    HostValue::$variant(value as $as)
                }
            }
        )*
    };
}

host_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<Value> for HostValue {
    fn from(value: Value) -> Self {
        HostValue::Proxy(value)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}
