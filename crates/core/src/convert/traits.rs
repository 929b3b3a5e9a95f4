//! Rust types as host values
//!
//! [`ToHost`] reads a Rust value out of a proxy and [`FromHost`] writes one
//! into it. `#[derive(HostCompound)]` builds both for structs mirroring a
//! compound, field by field, on top of the implementations below.

use super::host::HostValue;
use crate::error::{Error, Result};
use crate::value::Value;

/// Rust types that can be read from a value
pub trait ToHost: Sized {
    fn to_host(value: &Value) -> Result<Self>;
}

/// Rust types that can be written into a value
pub trait FromHost {
    fn from_host(&self, target: &Value) -> Result<()>;
}

macro_rules! integer_host {
    ($($ty:ty => $read:ident),* $(,)?) => {
        $(
            impl ToHost for $ty {
                fn to_host(value: &Value) -> Result<Self> {
                    let raw = value.$read()?;
                    <$ty>::try_from(raw).map_err(|_| {
                        Error::conversion(
                            value.type_def().name(),
                            format!("{raw} does not fit in {}", stringify!($ty)),
                        )
                    })
                }
            }

            impl FromHost for $ty {
                fn from_host(&self, target: &Value) -> Result<()> {
                    target.set_scalar(*self)
                }
            }
        )*
    };
}

integer_host! {
    i8 => to_i64,
    i16 => to_i64,
    i32 => to_i64,
    i64 => to_i64,
    u8 => to_u64,
    u16 => to_u64,
    u32 => to_u64,
    u64 => to_u64,
}

impl ToHost for f64 {
    fn to_host(value: &Value) -> Result<Self> {
        value.to_f64()
    }
}

impl FromHost for f64 {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.set_scalar(*self)
    }
}

impl ToHost for f32 {
    fn to_host(value: &Value) -> Result<Self> {
        Ok(value.to_f64()? as f32)
    }
}

impl FromHost for f32 {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.set_scalar(*self)
    }
}

impl ToHost for bool {
    fn to_host(value: &Value) -> Result<Self> {
        Ok(value.to_u64()? != 0)
    }
}

impl FromHost for bool {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.set_scalar(*self as u64)
    }
}

/// Enum symbols
impl ToHost for String {
    fn to_host(value: &Value) -> Result<Self> {
        value.symbol()?.ok_or_else(|| {
            Error::conversion(value.type_def().name(), "value has no symbol")
        })
    }
}

impl FromHost for String {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.set_symbol(self)
    }
}

impl FromHost for str {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.set_symbol(self)
    }
}

impl<T: ToHost> ToHost for Vec<T> {
    fn to_host(value: &Value) -> Result<Self> {
        value.raw_each()?.iter().map(T::to_host).collect()
    }
}

impl<T: FromHost> FromHost for [T] {
    fn from_host(&self, target: &Value) -> Result<()> {
        let ty = target.type_def();
        if ty.is_container() {
            target.resize(self.len())?;
        } else if let Some(len) = ty.array_len() {
            if len != self.len() {
                return Err(Error::OutOfBounds {
                    type_name: ty.name().to_string(),
                    index: self.len(),
                    len,
                });
            }
        } else {
            return Err(Error::mismatch(ty.name(), "not an array or container"));
        }
        for (index, item) in self.iter().enumerate() {
            item.from_host(&target.raw_get(index)?)?;
        }
        Ok(())
    }
}

impl<T: FromHost> FromHost for Vec<T> {
    fn from_host(&self, target: &Value) -> Result<()> {
        self.as_slice().from_host(target)
    }
}

impl<T: ToHost, const N: usize> ToHost for [T; N] {
    fn to_host(value: &Value) -> Result<Self> {
        let items = Vec::<T>::to_host(value)?;
        let len = items.len();
        items.try_into().map_err(|_| {
            Error::conversion(
                value.type_def().name(),
                format!("expected {N} elements, found {len}"),
            )
        })
    }
}

impl<T: FromHost, const N: usize> FromHost for [T; N] {
    fn from_host(&self, target: &Value) -> Result<()> {
        self.as_slice().from_host(target)
    }
}

impl ToHost for HostValue {
    fn to_host(value: &Value) -> Result<Self> {
        value.to_host()
    }
}

impl FromHost for HostValue {
    fn from_host(&self, target: &Value) -> Result<()> {
        target.assign(self)
    }
}

#[cfg(test)]
mod tests {
    use typelib_schema::Registry;

    use super::*;
    use crate::runtime::Runtime;

    fn runtime() -> Runtime {
        let mut registry = Registry::with_standard_types();
        registry
            .create_enum("/Color", 1, [("RED", 0), ("GREEN", 1)])
            .unwrap();
        Runtime::new(registry)
    }

    #[test]
    fn test_integers_check_range() {
        let rt = runtime();
        let value = rt.new_value("/int32_t").unwrap();
        (-5i32).from_host(&value).unwrap();
        assert_eq!(i16::to_host(&value).unwrap(), -5);
        assert!(u32::to_host(&value).is_err());
        assert!(300u16.from_host(&rt.new_value("/uint8_t").unwrap()).is_err());
    }

    #[test]
    fn test_sequences() {
        let rt = runtime();
        let vector = rt.new_value("/std/vector</float>").unwrap();
        vec![0.5f32, 1.5].from_host(&vector).unwrap();
        assert_eq!(Vec::<f32>::to_host(&vector).unwrap(), vec![0.5, 1.5]);

        let array = rt.new_value("/uint16_t[3]").unwrap();
        [1u16, 2, 3].from_host(&array).unwrap();
        assert_eq!(<[u16; 3]>::to_host(&array).unwrap(), [1, 2, 3]);
        assert!(<[u16; 2]>::to_host(&array).is_err());
        assert!(vec![1u16].from_host(&array).is_err());
    }

    #[test]
    fn test_enum_strings() {
        let rt = runtime();
        let color = rt.new_value("/Color").unwrap();
        "GREEN".from_host(&color).unwrap();
        assert_eq!(String::to_host(&color).unwrap(), "GREEN");
        assert!(String::from("BLUE").from_host(&color).is_err());
    }
}
