//! Scalar values read from and written to numeric memory

use std::fmt;

use typelib_schema::{NumericCategory, TypeDefinition, TypeKind};

use crate::error::{EngineError, EngineResult};

/// A number as held by a numeric, enum or pointer value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    /// Integer view; `None` for floats with a fractional part or values
    /// outside the i64 range
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(v),
            Scalar::UInt(v) => i64::try_from(v).ok(),
            Scalar::Float(v) => {
                (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64)
                    .then_some(v as i64)
            }
        }
    }

    pub fn as_u64(self) -> Option<u64> {
        match self {
            Scalar::Int(v) => u64::try_from(v).ok(),
            Scalar::UInt(v) => Some(v),
            Scalar::Float(v) => {
                (v.fract() == 0.0 && v >= 0.0 && v < u64::MAX as f64).then_some(v as u64)
            }
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $as:ty),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value as $as)
                }
            }
        )*
    };
}

scalar_from! {
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

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Decode little-endian bytes according to `ty`
pub(crate) fn decode(ty: &TypeDefinition, bytes: &[u8]) -> EngineResult<Scalar> {
    match ty.kind() {
        TypeKind::Numeric(NumericCategory::Float) => match bytes.len() {
            4 => Ok(Scalar::Float(f32::from_le_bytes(fixed(bytes)) as f64)),
            8 => Ok(Scalar::Float(f64::from_le_bytes(fixed(bytes)))),
            n => Err(EngineError::mismatch(
                ty.name(),
                format!("{n}-byte floats are not supported"),
            )),
        },
        TypeKind::Numeric(NumericCategory::Uint) => Ok(Scalar::UInt(read_unsigned(bytes))),
        TypeKind::Numeric(NumericCategory::Sint) | TypeKind::Enum(_) => {
            Ok(Scalar::Int(read_signed(bytes)))
        }
        TypeKind::Pointer { .. } => Ok(Scalar::UInt(read_unsigned(bytes))),
        _ => Err(EngineError::mismatch(ty.name(), "not a scalar type")),
    }
}

/// Encode `value` as `ty`, refusing values the type cannot represent
pub(crate) fn encode(ty: &TypeDefinition, value: Scalar) -> EngineResult<Vec<u8>> {
    let size = ty.size();
    let out_of_range = || EngineError::mismatch(ty.name(), format!("{value} out of range"));

    match ty.kind() {
        TypeKind::Numeric(NumericCategory::Float) => match size {
            4 => Ok((value.as_f64() as f32).to_le_bytes().to_vec()),
            8 => Ok(value.as_f64().to_le_bytes().to_vec()),
            n => Err(EngineError::mismatch(
                ty.name(),
                format!("{n}-byte floats are not supported"),
            )),
        },
        TypeKind::Numeric(NumericCategory::Uint) | TypeKind::Pointer { .. } => {
            let v = value.as_u64().ok_or_else(out_of_range)?;
            if size < 8 && v >> (size * 8) != 0 {
                return Err(out_of_range());
            }
            Ok(v.to_le_bytes()[..size].to_vec())
        }
        TypeKind::Numeric(NumericCategory::Sint) | TypeKind::Enum(_) => {
            let v = value.as_i64().ok_or_else(out_of_range)?;
            if size < 8 {
                let bits = size * 8;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if v < min || v > max {
                    return Err(out_of_range());
                }
            }
            Ok(v.to_le_bytes()[..size].to_vec())
        }
        _ => Err(EngineError::mismatch(ty.name(), "not a scalar type")),
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn read_unsigned(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

fn read_signed(bytes: &[u8]) -> i64 {
    let n = bytes.len().min(8);
    if n == 0 {
        return 0;
    }
    let raw = read_unsigned(bytes);
    let shift = 64 - n * 8;
    ((raw << shift) as i64) >> shift
}
