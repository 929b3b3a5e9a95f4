//! Writing host values into memory
//!
//! `assign` consults from-host conversion rules at every level of the
//! structure; `apply` takes plain data (as produced by `to_simple_value`)
//! and skips them.

use typelib_engine::Scalar;
use typelib_schema::{NumericCategory, TypeDefinition, TypeKind};

use super::Value;
use crate::convert::HostValue;
use crate::error::{Error, Result};
use crate::simple;

impl Value {
    /// Store a host value, converting through from-host rules
    pub fn assign(&self, host: &HostValue) -> Result<()> {
        self.write_host(host, true)
    }

    /// Store plain data as produced by `to_simple_value`
    pub fn apply(&self, simple: &HostValue) -> Result<()> {
        self.write_host(simple, false)
    }

    /// Deep copy another value of the same type into this one
    pub fn copy_from(&self, source: &Value) -> Result<()> {
        self.check_mutable()?;
        source.check_live()?;
        let ty = self.type_def();
        if !same_layout(ty, source.type_def()) {
            return Err(Error::mismatch(
                ty.name(),
                format!("cannot copy a {}", source.type_def().name()),
            ));
        }
        if source.address() == self.address() {
            return Ok(());
        }
        let (dst, src) = (self.address(), source.address());
        self.mutate_containers(|engine| engine.copy_value(ty, dst, src))
    }

    fn write_host(&self, host: &HostValue, convert: bool) -> Result<()> {
        self.check_mutable()?;
        let ty = self.type_def().clone();

        if let HostValue::Proxy(source) = host {
            if ty.pointer_target().is_some_and(|t| t.name() == source.type_def().name()) {
                return self.point_to(source);
            }
            return self.copy_from(source);
        }

        if convert {
            let runtime = self.runtime();
            if let Some(rule) =
                runtime
                    .conversions()
                    .resolve_from_host(host.class(), &ty, runtime.resolution())?
            {
                return rule.apply(host, self);
            }
        }

        let unexpected = || {
            Error::mismatch(
                ty.name(),
                format!("cannot store a {} host value", host.class()),
            )
        };

        match ty.kind() {
            TypeKind::Numeric(category) => self.set_scalar(number(&ty, *category, host)?),
            TypeKind::Enum(_) => match host {
                HostValue::String(symbol) | HostValue::Symbol(symbol) => self.set_symbol(symbol),
                _ => self.set_scalar(host.as_scalar().ok_or_else(unexpected)?),
            },
            TypeKind::Compound(compound) => match host {
                HostValue::List(items) => {
                    if items.len() != compound.fields().len() {
                        return Err(Error::mismatch(
                            ty.name(),
                            format!(
                                "expected {} field values, got {}",
                                compound.fields().len(),
                                items.len()
                            ),
                        ));
                    }
                    for (field, item) in compound.fields().iter().zip(items) {
                        self.raw_get(field.name())?.write_host(item, convert)?;
                    }
                    Ok(())
                }
                HostValue::Map(entries) => {
                    for (name, item) in entries {
                        self.raw_get(name)?.write_host(item, convert)?;
                    }
                    Ok(())
                }
                _ => Err(unexpected()),
            },
            TypeKind::Array { len, .. } => match host {
                HostValue::List(items) => {
                    if items.len() != *len {
                        return Err(Error::OutOfBounds {
                            type_name: ty.name().to_string(),
                            index: items.len(),
                            len: *len,
                        });
                    }
                    for (index, item) in items.iter().enumerate() {
                        self.raw_get(index)?.write_host(item, convert)?;
                    }
                    Ok(())
                }
                HostValue::Map(entries) if simple::is_packed(entries) => {
                    simple::write_packed(self, entries)
                }
                _ => Err(unexpected()),
            },
            TypeKind::Container { .. } => match host {
                HostValue::List(items) => {
                    self.resize(items.len())?;
                    for (index, item) in items.iter().enumerate() {
                        self.raw_get(index)?.write_host(item, convert)?;
                    }
                    Ok(())
                }
                HostValue::Map(entries) if simple::is_packed(entries) => {
                    simple::write_packed(self, entries)
                }
                _ => Err(unexpected()),
            },
            TypeKind::Pointer { .. } => match host {
                HostValue::Null => self.set_scalar(0u64),
                HostValue::UInt(address) => self.set_scalar(*address),
                _ => Err(unexpected()),
            },
            TypeKind::Opaque => match host {
                HostValue::Bytes(bytes) if bytes.len() == ty.size() => {
                    let address = self.address();
                    self.runtime()
                        .with_engine(|engine| engine.write(address, bytes))
                }
                _ => Err(unexpected()),
            },
            TypeKind::Null => Err(unexpected()),
        }
    }
}

/// Number to store for `host`; floats also accept `null` and the spelled
/// special values
fn number(ty: &TypeDefinition, category: NumericCategory, host: &HostValue) -> Result<Scalar> {
    if category == NumericCategory::Float {
        match host {
            HostValue::Null => return Ok(Scalar::Float(f64::NAN)),
            HostValue::String(text) => {
                return simple::parse_special_float(text)
                    .map(Scalar::Float)
                    .ok_or_else(|| Error::mismatch(ty.name(), format!("'{text}' is not a number")));
            }
            _ => {}
        }
    }
    host.as_scalar().ok_or_else(|| {
        Error::mismatch(
            ty.name(),
            format!("expected a number, got a {} host value", host.class()),
        )
    })
}

/// Same type, or types that only differ by registration (after a resize the
/// name is shared but the uid is not)
fn same_layout(a: &TypeDefinition, b: &TypeDefinition) -> bool {
    a.uid() == b.uid() || (a.name() == b.name() && a.size() == b.size())
}
