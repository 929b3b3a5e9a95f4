//! Simple values
//!
//! A simple value is plain host data with no proxies and no custom objects:
//! numbers, enum symbols, name-keyed maps for compounds and lists for
//! arrays and containers. It is what gets stored in JSON or config files;
//! [`Value::apply`] writes it back.
//!
//! With `pack_simple_arrays`, numeric arrays and containers are emitted as
//!
//! ```text
//!   { "size": 3, "pack_code": "s<", "data": "<base64 of the raw bytes>" }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use typelib_engine::Scalar;
use typelib_schema::{NumericCategory, TypeDefinition, TypeKind};

use crate::convert::HostValue;
use crate::error::{Error, Result};
use crate::value::Value;

/// Handling of NaN and infinities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialFloats {
    /// Refuse to convert
    #[default]
    Error,
    /// Emit null
    Null,
    /// Emit "NaN", "Infinity" or "-Infinity"
    String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleValueOptions {
    /// Emit numeric arrays and containers as packed base64 blobs
    pub pack_simple_arrays: bool,
    pub special_float_values: SpecialFloats,
    /// Emit enums as their integer value instead of their symbol
    pub enum_as_integer: bool,
}

impl Value {
    /// Plain host data for this value tree; conversion rules are not applied
    pub fn to_simple_value(&self, options: &SimpleValueOptions) -> Result<HostValue> {
        self.check_live()?;
        simple_value(self, options)
    }

    /// Field map of a compound
    pub fn to_h(&self, options: &SimpleValueOptions) -> Result<IndexMap<String, HostValue>> {
        if !self.type_def().is_compound() {
            return Err(Error::mismatch(self.type_def().name(), "not a compound"));
        }
        match self.to_simple_value(options)? {
            HostValue::Map(map) => Ok(map),
            _ => Err(Error::mismatch(self.type_def().name(), "not a compound")),
        }
    }
}

fn simple_value(value: &Value, options: &SimpleValueOptions) -> Result<HostValue> {
    let ty = value.type_def();
    match ty.kind() {
        TypeKind::Null => Ok(HostValue::Null),
        TypeKind::Numeric(_) => match value.to_scalar()? {
            Scalar::Int(v) => Ok(HostValue::Int(v)),
            Scalar::UInt(v) => Ok(HostValue::UInt(v)),
            Scalar::Float(v) if v.is_finite() => Ok(HostValue::Float(v)),
            Scalar::Float(v) => special_float(ty, v, options.special_float_values),
        },
        TypeKind::Enum(_) => {
            if !options.enum_as_integer {
                if let Some(symbol) = value.symbol()? {
                    return Ok(HostValue::Symbol(symbol));
                }
            }
            Ok(HostValue::Int(value.to_i64()?))
        }
        TypeKind::Compound(compound) => {
            let mut map = IndexMap::with_capacity(compound.fields().len());
            for field in compound.fields() {
                let child = value.raw_get(field.name())?;
                map.insert(field.name().to_string(), simple_value(&child, options)?);
            }
            Ok(HostValue::Map(map))
        }
        TypeKind::Array { element, .. } | TypeKind::Container { element, .. } => {
            if options.pack_simple_arrays && pack_code(element).is_some() {
                return packed(value);
            }
            value
                .raw_each()?
                .iter()
                .map(|e| simple_value(e, options))
                .collect::<Result<Vec<_>>>()
                .map(HostValue::List)
        }
        TypeKind::Pointer { .. } | TypeKind::Opaque => Err(Error::conversion(
            ty.name(),
            "pointers and opaque types have no simple value",
        )),
    }
}

fn special_float(ty: &TypeDefinition, v: f64, mode: SpecialFloats) -> Result<HostValue> {
    match mode {
        SpecialFloats::Error => Err(Error::conversion(
            ty.name(),
            format!("{v} has no simple value (see special_float_values)"),
        )),
        SpecialFloats::Null => Ok(HostValue::Null),
        SpecialFloats::String => Ok(HostValue::String(
            if v.is_nan() {
                "NaN"
            } else if v > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            }
            .to_string(),
        )),
    }
}

/// Inverse of the `String` spelling of special floats; plain numbers in
/// text form are accepted too
pub(crate) fn parse_special_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

// ============================================================================
// Packed arrays
// ============================================================================

/// Little-endian pack directive for a numeric element type
pub fn pack_code(ty: &TypeDefinition) -> Option<&'static str> {
    let code = match (ty.numeric_category()?, ty.size()) {
        (NumericCategory::Sint, 1) => "c",
        (NumericCategory::Uint, 1) => "C",
        (NumericCategory::Sint, 2) => "s<",
        (NumericCategory::Uint, 2) => "S<",
        (NumericCategory::Sint, 4) => "l<",
        (NumericCategory::Uint, 4) => "L<",
        (NumericCategory::Sint, 8) => "q<",
        (NumericCategory::Uint, 8) => "Q<",
        (NumericCategory::Float, 4) => "e",
        (NumericCategory::Float, 8) => "E",
        _ => return None,
    };
    Some(code)
}

/// Element count and address of the first element
fn element_run(value: &Value) -> Result<(usize, typelib_engine::Address)> {
    let ty = value.type_def();
    let len = value.len()?;
    if ty.is_container() && len > 0 {
        let address = value.address();
        let first = value
            .runtime()
            .with_engine(|engine| engine.container_element(ty, address, 0))?;
        return Ok((len, first));
    }
    Ok((len, value.address()))
}

fn packed(value: &Value) -> Result<HostValue> {
    let ty = value.type_def();
    let element = ty
        .element()
        .ok_or_else(|| Error::mismatch(ty.name(), "not an array or container"))?;
    let code = pack_code(element)
        .ok_or_else(|| Error::conversion(ty.name(), "elements are not numeric"))?;

    let (len, first) = element_run(value)?;
    let bytes = if len == 0 {
        Vec::new()
    } else {
        value
            .runtime()
            .with_engine(|engine| engine.read(first, len * element.size()))?
    };

    Ok(HostValue::map([
        ("size", HostValue::UInt(len as u64)),
        ("pack_code", HostValue::String(code.to_string())),
        ("data", HostValue::String(STANDARD.encode(bytes))),
    ]))
}

pub(crate) fn is_packed(entries: &IndexMap<String, HostValue>) -> bool {
    entries.contains_key("pack_code") && entries.contains_key("data")
}

pub(crate) fn write_packed(value: &Value, entries: &IndexMap<String, HostValue>) -> Result<()> {
    let ty = value.type_def();
    let element = ty
        .element()
        .ok_or_else(|| Error::mismatch(ty.name(), "not an array or container"))?;
    let expected = pack_code(element)
        .ok_or_else(|| Error::conversion(ty.name(), "elements are not numeric"))?;

    let code = entries.get("pack_code").and_then(HostValue::as_str);
    if code != Some(expected) {
        return Err(Error::conversion(
            ty.name(),
            format!("pack code {code:?} does not match {expected}"),
        ));
    }
    let data = entries
        .get("data")
        .and_then(HostValue::as_str)
        .ok_or_else(|| Error::conversion(ty.name(), "packed data must be a string"))?;
    let bytes = STANDARD
        .decode(data)
        .map_err(|err| Error::conversion(ty.name(), format!("invalid packed data: {err}")))?;

    let size = match entries.get("size") {
        Some(size) => size
            .as_scalar()
            .and_then(Scalar::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::conversion(ty.name(), "packed size must be a count"))?,
        None => bytes.len().checked_div(element.size()).unwrap_or(0),
    };
    let expected = size
        .checked_mul(element.size())
        .ok_or_else(|| Error::conversion(ty.name(), "packed size too large"))?;
    if bytes.len() != expected {
        return Err(Error::conversion(
            ty.name(),
            format!(
                "{} bytes of data for {size} elements of {} bytes",
                bytes.len(),
                element.size()
            ),
        ));
    }

    if let Some(len) = ty.array_len() {
        if len != size {
            return Err(Error::OutOfBounds {
                type_name: ty.name().to_string(),
                index: size,
                len,
            });
        }
    } else {
        value.resize(size)?;
    }
    if size == 0 {
        return Ok(());
    }

    let (_, first) = element_run(value)?;
    value
        .runtime()
        .with_engine(|engine| engine.write(first, &bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use typelib_schema::{CompoundBuilder, Registry};

    use super::*;
    use crate::convert::ConversionRegistry;
    use crate::runtime::Runtime;

    fn runtime() -> Runtime {
        let mut registry = Registry::with_standard_types();
        registry
            .create_enum("/Level", 4, [("LOW", 1), ("HIGH", 2)])
            .unwrap();
        registry
            .create_compound(
                CompoundBuilder::new("/Reading")
                    .field("level", "/Level")
                    .field("value", "/float")
                    .field("samples", "/int16_t[3]")
                    .field("history", "/std/vector</double>"),
            )
            .unwrap();
        Runtime::builder(registry)
            .conversions(Arc::new(ConversionRegistry::new()))
            .build()
    }

    fn reading(rt: &Runtime) -> Value {
        let value = rt.new_value("/Reading").unwrap();
        value
            .apply(&HostValue::map([
                ("level", HostValue::Symbol("HIGH".into())),
                ("value", HostValue::Float(0.25)),
                ("samples", HostValue::from(vec![-1i16, 0, 1])),
                ("history", HostValue::from(vec![1.5, 2.5])),
            ]))
            .unwrap();
        value
    }

    #[test]
    fn test_plain_simple_value() {
        let rt = runtime();
        let value = reading(&rt);
        let simple = value.to_simple_value(&SimpleValueOptions::default()).unwrap();
        assert_eq!(
            simple.to_json().unwrap(),
            serde_json::json!({
                "level": "HIGH",
                "value": 0.25,
                "samples": [-1, 0, 1],
                "history": [1.5, 2.5],
            })
        );

        let copy = rt.new_value("/Reading").unwrap();
        copy.apply(&simple).unwrap();
        assert_eq!(copy.to_byte_array().unwrap(), value.to_byte_array().unwrap());
    }

    #[test]
    fn test_enum_as_integer() {
        let rt = runtime();
        let options = SimpleValueOptions {
            enum_as_integer: true,
            ..Default::default()
        };
        let map = reading(&rt).to_h(&options).unwrap();
        assert_eq!(map["level"], HostValue::Int(2));
    }

    #[test]
    fn test_packed_arrays_round_trip() {
        let rt = runtime();
        let value = reading(&rt);
        let options = SimpleValueOptions {
            pack_simple_arrays: true,
            ..Default::default()
        };
        let map = value.to_h(&options).unwrap();
        let samples = map["samples"].as_map().unwrap();
        assert_eq!(samples["size"], HostValue::UInt(3));
        assert_eq!(samples["pack_code"], HostValue::String("s<".into()));
        assert_eq!(
            samples["data"],
            HostValue::String(STANDARD.encode([0xff, 0xff, 0, 0, 1, 0]))
        );

        let copy = rt.new_value("/Reading").unwrap();
        copy.apply(&HostValue::Map(map)).unwrap();
        assert_eq!(copy.raw_get("history").unwrap().len().unwrap(), 2);
        assert_eq!(copy.to_byte_array().unwrap(), value.to_byte_array().unwrap());
    }

    #[test]
    fn test_special_floats() {
        let rt = runtime();
        let value = reading(&rt);
        value.raw_get("value").unwrap().set_scalar(f64::INFINITY).unwrap();

        assert!(matches!(
            value.to_simple_value(&SimpleValueOptions::default()),
            Err(Error::Conversion { .. })
        ));

        let mut options = SimpleValueOptions {
            special_float_values: SpecialFloats::Null,
            ..Default::default()
        };
        assert_eq!(value.to_h(&options).unwrap()["value"], HostValue::Null);

        options.special_float_values = SpecialFloats::String;
        let map = value.to_h(&options).unwrap();
        assert_eq!(map["value"], HostValue::String("Infinity".into()));

        let copy = rt.new_value("/Reading").unwrap();
        copy.apply(&HostValue::Map(map)).unwrap();
        assert_eq!(copy.raw_get("value").unwrap().to_f64().unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_pack_mismatch_is_rejected() {
        let rt = runtime();
        let value = rt.new_value("/int16_t[3]").unwrap();
        let bad = HostValue::map([
            ("size", HostValue::UInt(3)),
            ("pack_code", HostValue::String("l<".into())),
            ("data", HostValue::String(STANDARD.encode([0u8; 12]))),
        ]);
        assert!(matches!(value.apply(&bad), Err(Error::Conversion { .. })));
        assert!(rt.new_value("/double*").unwrap().to_simple_value(&Default::default()).is_err());
    }

    #[test]
    fn test_oversized_pack_count_is_rejected() {
        let rt = runtime();
        let value = rt.new_value("/std/vector</int16_t>").unwrap();
        value.push(7i16).unwrap();
        let huge = HostValue::map([
            ("size", HostValue::UInt((usize::MAX / 2 + 1) as u64)),
            ("pack_code", HostValue::String("s<".into())),
            ("data", HostValue::String(String::new())),
        ]);
        assert!(matches!(value.apply(&huge), Err(Error::Conversion { .. })));
        assert_eq!(value.len().unwrap(), 1);
    }
}
