//! Type-preserving msgpack codec
//!
//! Values are encoded against the type declared at their schema position.
//! At a pseudo-typed position the concrete type travels with the payload as a
//! two element array: the JSON type descriptor (as binary) followed by the
//! value encoded against that concrete type. Unknown values are the
//! extension type 0.

use super::number::{self, WireNumber};
use super::{Type, Value};
use crate::error::{PlugkitError, Result};
use crate::types::{AttributePath, AttributePathStep};
use rmpv::Value as Mp;
use std::collections::BTreeMap;

const UNKNOWN_EXT: i8 = 0;

/// Encodes `value` at a position declared as `ty`.
pub fn marshal(value: &Value, ty: &Type) -> Result<Vec<u8>> {
    let mp = encode(value, ty, &AttributePath::root())?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &mp)
        .map_err(|e| PlugkitError::EncodingError(format!("msgpack: {}", e)))?;
    Ok(buf)
}

/// Decodes bytes produced for a position declared as `ty`.
pub fn unmarshal(data: &[u8], ty: &Type) -> Result<Value> {
    let mut reader = data;
    let mp = rmpv::decode::read_value(&mut reader)
        .map_err(|e| PlugkitError::DecodingError(format!("msgpack: {}", e)))?;
    if !reader.is_empty() {
        return Err(PlugkitError::DecodingError(format!(
            "msgpack: {} trailing bytes after value",
            reader.len()
        )));
    }
    decode(mp, ty, &AttributePath::root())
}

fn unknown_marker() -> Mp {
    Mp::Ext(UNKNOWN_EXT, vec![0])
}

fn mismatch(path: &AttributePath, ty: &Type, value: &Value) -> PlugkitError {
    PlugkitError::TypeMismatch {
        path: path.clone(),
        expected: ty.to_string(),
        actual: value.ty().to_string(),
    }
}

fn encode(value: &Value, ty: &Type, path: &AttributePath) -> Result<Mp> {
    if ty.is_dynamic() {
        return match value {
            Value::Unknown(t) | Value::Null(t) if t.is_dynamic() => Ok(if value.is_null() {
                Mp::Nil
            } else {
                unknown_marker()
            }),
            _ => {
                let concrete = value.ty();
                Ok(Mp::Array(vec![
                    Mp::Binary(concrete.marshal_json()),
                    encode(value, &concrete, path)?,
                ]))
            }
        };
    }

    match (value, ty) {
        (Value::Unknown(t), _) if t.is_dynamic() || ty.accepts(t) => Ok(unknown_marker()),
        (Value::Null(t), _) if t.is_dynamic() || ty.accepts(t) => Ok(Mp::Nil),
        (Value::Bool(b), Type::Bool) => Ok(Mp::Boolean(*b)),
        (Value::String(s), Type::String) => Ok(Mp::from(s.as_str())),
        (Value::Number(n), Type::Number) => Ok(match number::wire_form(n) {
            WireNumber::Int(i) => Mp::from(i),
            WireNumber::Float(f) => Mp::F64(f),
            WireNumber::Text(s) => Mp::from(s),
        }),
        (Value::List(_, items), Type::List(et)) | (Value::Set(_, items), Type::Set(et)) => {
            let encoded = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    encode(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Mp::Array(encoded))
        }
        (Value::Map(_, items), Type::Map(et)) => {
            let encoded = items
                .iter()
                .map(|(k, v)| {
                    let child = path.with_step(AttributePathStep::ElementKeyString(k.clone()));
                    Ok((Mp::from(k.as_str()), encode(v, et, &child)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Mp::Map(encoded))
        }
        (Value::Tuple(items), Type::Tuple(ets)) if items.len() == ets.len() => {
            let encoded = items
                .iter()
                .zip(ets)
                .enumerate()
                .map(|(i, (item, et))| {
                    encode(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Mp::Array(encoded))
        }
        (Value::Object(attrs), Type::Object(ats)) => {
            if let Some(extra) = attrs.keys().find(|k| !ats.contains_key(*k)) {
                return Err(PlugkitError::EncodingError(format!(
                    "{}: unsupported attribute {:?}",
                    display_path(path),
                    extra
                )));
            }
            let encoded = ats
                .iter()
                .map(|(name, at)| {
                    let child = path.with_step(AttributePathStep::AttributeName(name.clone()));
                    let attr = attrs.get(name).ok_or_else(|| {
                        PlugkitError::EncodingError(format!(
                            "{}: missing attribute {:?}",
                            display_path(path),
                            name
                        ))
                    })?;
                    Ok((Mp::from(name.as_str()), encode(attr, at, &child)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Mp::Map(encoded))
        }
        _ => Err(mismatch(path, ty, value)),
    }
}

fn display_path(path: &AttributePath) -> String {
    if path.is_root() {
        "value".to_string()
    } else {
        path.to_string()
    }
}

fn describe(mp: &Mp) -> &'static str {
    match mp {
        Mp::Nil => "nil",
        Mp::Boolean(_) => "boolean",
        Mp::Integer(_) => "integer",
        Mp::F32(_) | Mp::F64(_) => "float",
        Mp::String(_) => "string",
        Mp::Binary(_) => "binary data",
        Mp::Array(_) => "array",
        Mp::Map(_) => "map",
        Mp::Ext(..) => "extension",
    }
}

fn unexpected(path: &AttributePath, ty: &Type, found: &Mp) -> PlugkitError {
    let wrapped = match found {
        Mp::Binary(_) => true,
        Mp::Array(parts) => parts.len() == 2 && matches!(parts[0], Mp::Binary(_)),
        _ => false,
    };
    let hint = if wrapped {
        "; a dynamic type descriptor was sent where a concrete value was expected"
    } else {
        ""
    };
    PlugkitError::DecodingError(format!(
        "{}: expected {}, found {}{}",
        display_path(path),
        ty,
        describe(found),
        hint
    ))
}

fn decode(mp: Mp, ty: &Type, path: &AttributePath) -> Result<Value> {
    if let Mp::Ext(..) = mp {
        return Ok(Value::Unknown(ty.clone()));
    }
    if ty.is_dynamic() {
        return decode_dynamic(mp, path);
    }
    if let Mp::Nil = mp {
        return Ok(Value::Null(ty.clone()));
    }

    match ty {
        Type::Bool => match mp {
            Mp::Boolean(b) => Ok(Value::Bool(b)),
            other => Err(unexpected(path, ty, &other)),
        },
        Type::String => match mp {
            Mp::String(s) => s.into_str().map(Value::String).ok_or_else(|| {
                PlugkitError::DecodingError(format!(
                    "{}: string is not valid UTF-8",
                    display_path(path)
                ))
            }),
            other => Err(unexpected(path, ty, &other)),
        },
        Type::Number => match mp {
            Mp::Integer(i) => {
                if let Some(v) = i.as_i64() {
                    Ok(Value::from(v))
                } else if let Some(v) = i.as_u64() {
                    Ok(Value::Number(v.into()))
                } else {
                    Err(unexpected(path, ty, &Mp::Integer(i)))
                }
            }
            Mp::F64(f) => number::from_f64(f).map(Value::Number),
            Mp::F32(f) => number::from_f64(f64::from(f)).map(Value::Number),
            Mp::String(s) => match s.as_str() {
                Some(text) => number::parse(text).map(Value::Number),
                None => Err(PlugkitError::DecodingError(format!(
                    "{}: number text is not valid UTF-8",
                    display_path(path)
                ))),
            },
            other => Err(unexpected(path, ty, &other)),
        },
        Type::List(et) | Type::Set(et) => {
            let items = match mp {
                Mp::Array(items) => items,
                other => return Err(unexpected(path, ty, &other)),
            };
            let values = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    decode(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            let element = unify(et, values.iter(), path)?;
            Ok(match ty {
                Type::Set(_) => Value::set(element, values),
                _ => Value::List(element, values),
            })
        }
        Type::Map(et) => {
            let entries = match mp {
                Mp::Map(entries) => entries,
                other => return Err(unexpected(path, ty, &other)),
            };
            let mut values = BTreeMap::new();
            for (k, v) in entries {
                let key = match k {
                    Mp::String(s) => s.into_str().ok_or_else(|| {
                        PlugkitError::DecodingError(format!(
                            "{}: map key is not valid UTF-8",
                            display_path(path)
                        ))
                    })?,
                    other => {
                        return Err(PlugkitError::DecodingError(format!(
                            "{}: map keys must be strings, found {}",
                            display_path(path),
                            describe(&other)
                        )))
                    }
                };
                let child = path.with_step(AttributePathStep::ElementKeyString(key.clone()));
                values.insert(key, decode(v, et, &child)?);
            }
            let element = unify(et, values.values(), path)?;
            Ok(Value::Map(element, values))
        }
        Type::Tuple(ets) => {
            let items = match mp {
                Mp::Array(items) => items,
                other => return Err(unexpected(path, ty, &other)),
            };
            if items.len() != ets.len() {
                return Err(PlugkitError::DecodingError(format!(
                    "{}: tuple requires {} elements, found {}",
                    display_path(path),
                    ets.len(),
                    items.len()
                )));
            }
            let values = items
                .into_iter()
                .zip(ets)
                .enumerate()
                .map(|(i, (item, et))| {
                    decode(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Tuple(values))
        }
        Type::Object(ats) => {
            let entries = match mp {
                Mp::Map(entries) => entries,
                other => return Err(unexpected(path, ty, &other)),
            };
            let mut attrs = BTreeMap::new();
            for (k, v) in entries {
                let name = k.as_str().map(str::to_string).ok_or_else(|| {
                    PlugkitError::DecodingError(format!(
                        "{}: object attribute names must be strings",
                        display_path(path)
                    ))
                })?;
                let at = ats.get(&name).ok_or_else(|| {
                    PlugkitError::DecodingError(format!(
                        "{}: unsupported attribute {:?}",
                        display_path(path),
                        name
                    ))
                })?;
                let child = path.with_step(AttributePathStep::AttributeName(name.clone()));
                attrs.insert(name, decode(v, at, &child)?);
            }
            if let Some(missing) = ats.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(PlugkitError::DecodingError(format!(
                    "{}: missing attribute {:?}",
                    display_path(path),
                    missing
                )));
            }
            Ok(Value::Object(attrs))
        }
        Type::Dynamic => unreachable!("dynamic positions are handled before the type match"),
    }
}

fn decode_dynamic(mp: Mp, path: &AttributePath) -> Result<Value> {
    let mut parts = match mp {
        Mp::Nil => return Ok(Value::Null(Type::Dynamic)),
        Mp::Array(parts) if parts.len() == 2 => parts,
        Mp::Array(parts) => {
            return Err(PlugkitError::DecodingError(format!(
                "{}: dynamic value array must have exactly two elements, found {}",
                display_path(path),
                parts.len()
            )))
        }
        other => {
            return Err(PlugkitError::DecodingError(format!(
                "{}: dynamic value must be a [type, value] array, found {}",
                display_path(path),
                describe(&other)
            )))
        }
    };
    let payload = parts.pop().unwrap_or(Mp::Nil);
    let descriptor = match parts.pop() {
        Some(Mp::Binary(bytes)) => bytes,
        Some(Mp::String(s)) => s.into_bytes(),
        Some(other) => {
            return Err(PlugkitError::DecodingError(format!(
                "{}: dynamic type descriptor must be bytes, found {}",
                display_path(path),
                describe(&other)
            )))
        }
        None => Vec::new(),
    };
    let concrete = Type::unmarshal_json(&descriptor)?;
    decode(payload, &concrete, path)
}

/// Resolves the element type recorded for a decoded collection. Collections
/// declared with a pseudo element type take the single concrete type their
/// elements share.
fn unify<'a>(
    declared: &Type,
    values: impl Iterator<Item = &'a Value>,
    path: &AttributePath,
) -> Result<Type> {
    if !declared.has_dynamic() {
        return Ok(declared.clone());
    }
    let mut found: Option<Type> = None;
    for value in values {
        let ty = value.ty();
        if ty.is_dynamic() {
            continue;
        }
        match &found {
            None => found = Some(ty),
            Some(existing) if *existing == ty => {}
            Some(existing) => {
                return Err(PlugkitError::DecodingError(format!(
                    "{}: collection elements must share one type, found {} and {}",
                    display_path(path),
                    existing,
                    ty
                )))
            }
        }
    }
    Ok(found.unwrap_or_else(|| declared.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value, ty: &Type) -> Value {
        let bytes = marshal(value, ty).unwrap();
        unmarshal(&bytes, ty).unwrap()
    }

    #[test]
    fn object_with_dynamic_attribute_preserves_tuple_type() {
        let ty = Type::object([("dyn", Type::Dynamic)]);
        let value = Value::object([(
            "dyn",
            Value::tuple(vec!["hey".into(), "there".into(), "tuple".into()]),
        )]);

        let decoded = round_trip(&value, &ty);

        assert_eq!(decoded, value);
        assert_eq!(
            decoded.get_attr("dyn").unwrap().ty(),
            Type::tuple(vec![Type::String, Type::String, Type::String])
        );
    }

    #[test]
    fn dynamic_encoding_carries_type_descriptor() {
        let bytes = marshal(&Value::bool(true), &Type::Dynamic).unwrap();
        // fixarray(2), bin8 "\"bool\"", true
        assert_eq!(bytes[0], 0x92);
        assert_eq!(bytes[1], 0xc4);
        assert_eq!(&bytes[3..9], b"\"bool\"");
        assert_eq!(bytes[9], 0xc3);
    }

    #[test]
    fn unknown_is_extension_zero() {
        let bytes = marshal(&Value::unknown(Type::String), &Type::String).unwrap();
        assert_eq!(bytes, vec![0xd4, 0x00, 0x00]);
        assert_eq!(
            unmarshal(&bytes, &Type::String).unwrap(),
            Value::unknown(Type::String)
        );
    }

    #[test]
    fn wholly_unknown_dynamic_stays_untyped() {
        let value = Value::unknown(Type::Dynamic);
        let decoded = round_trip(&value, &Type::Dynamic);
        assert_eq!(decoded, Value::unknown(Type::Dynamic));
    }

    #[test]
    fn null_of_concrete_type_at_dynamic_position_keeps_type() {
        let value = Value::null(Type::list(Type::String));
        let decoded = round_trip(&value, &Type::Dynamic);
        assert_eq!(decoded, value);
    }

    #[test]
    fn descriptor_at_concrete_position_gets_descriptive_error() {
        let bytes = marshal(&Value::from("x"), &Type::Dynamic).unwrap();
        let err = unmarshal(&bytes, &Type::list(Type::String)).unwrap_err();
        let message = err.to_string();
        assert!(!message.contains("code=c4"));

        let obj_bytes = marshal(
            &Value::object([("bar", Value::from("x"))]),
            &Type::object([("bar", Type::Dynamic)]),
        )
        .unwrap();
        let err = unmarshal(&obj_bytes, &Type::object([("bar", Type::String)])).unwrap_err();
        assert!(err.to_string().contains("dynamic type descriptor"));
    }

    #[test]
    fn high_precision_number_round_trips() {
        let value: Value = "0.1000000000000000000000000000001".parse().unwrap();
        assert_eq!(round_trip(&value, &Type::Number), value);
    }

    #[test]
    fn list_of_dynamic_unifies_element_type() {
        let ty = Type::list(Type::Dynamic);
        let value = Value::list(Type::Number, vec![Value::from(1), Value::from(2)]);
        let decoded = round_trip(&value, &ty);
        assert_eq!(decoded.ty(), Type::list(Type::Number));
    }

    #[test]
    fn object_rejects_extra_and_missing_attributes() {
        let ty = Type::object([("a", Type::String)]);
        let bytes = marshal(
            &Value::object([("b", Value::from("x"))]),
            &Type::object([("b", Type::String)]),
        )
        .unwrap();
        assert!(unmarshal(&bytes, &ty).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = marshal(&Value::bool(true), &Type::Bool).unwrap();
        bytes.push(0xc0);
        assert!(unmarshal(&bytes, &Type::Bool).is_err());
    }
}
