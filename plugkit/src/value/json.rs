//! JSON codec for values
//!
//! Used for raw state during upgrades. Pseudo-typed positions are written as
//! `{"value": ..., "type": ...}`. Unknown values have no JSON form.

use super::number;
use super::{Type, Value};
use crate::error::{PlugkitError, Result};
use crate::types::{AttributePath, AttributePathStep};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Decoding switches for [`unmarshal_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    /// Drop object attributes that the target type does not declare instead
    /// of failing. Used when reading state written by an older schema.
    pub ignore_undefined_attributes: bool,
}

pub fn marshal(value: &Value, ty: &Type) -> Result<Vec<u8>> {
    let json = to_json(value, ty, &AttributePath::root())?;
    serde_json::to_vec(&json)
        .map_err(|e| PlugkitError::EncodingError(format!("json: {}", e)))
}

pub fn unmarshal(data: &[u8], ty: &Type) -> Result<Value> {
    unmarshal_with(data, ty, JsonOptions::default())
}

pub fn unmarshal_with(data: &[u8], ty: &Type, options: JsonOptions) -> Result<Value> {
    let json: Json = serde_json::from_slice(data)?;
    from_json(json, ty, &AttributePath::root(), options)
}

fn err(path: &AttributePath, message: impl std::fmt::Display) -> PlugkitError {
    if path.is_root() {
        PlugkitError::DecodingError(message.to_string())
    } else {
        PlugkitError::DecodingError(format!("{}: {}", path, message))
    }
}

pub fn to_json(value: &Value, ty: &Type, path: &AttributePath) -> Result<Json> {
    if value.is_unknown() {
        return Err(PlugkitError::EncodingError(format!(
            "{}: unknown values cannot be serialized to JSON",
            if path.is_root() {
                "value".to_string()
            } else {
                path.to_string()
            }
        )));
    }
    if ty.is_dynamic() {
        if let Value::Null(t) = value {
            if t.is_dynamic() {
                return Ok(Json::Null);
            }
        }
        let concrete = value.ty();
        let mut wrapper = Map::new();
        wrapper.insert("value".to_string(), to_json(value, &concrete, path)?);
        wrapper.insert("type".to_string(), concrete.to_json());
        return Ok(Json::Object(wrapper));
    }

    match (value, ty) {
        (Value::Null(_), _) => Ok(Json::Null),
        (Value::Bool(b), Type::Bool) => Ok(Json::Bool(*b)),
        (Value::String(s), Type::String) => Ok(Json::String(s.clone())),
        (Value::Number(n), Type::Number) => Number::from_str(&number::to_text(n))
            .map(Json::Number)
            .map_err(|e| PlugkitError::EncodingError(format!("json number: {}", e))),
        (Value::List(_, items), Type::List(et)) | (Value::Set(_, items), Type::Set(et)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                to_json(
                    v,
                    et,
                    &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                )
            })
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        (Value::Tuple(items), Type::Tuple(ets)) if items.len() == ets.len() => items
            .iter()
            .zip(ets)
            .enumerate()
            .map(|(i, (v, et))| {
                to_json(
                    v,
                    et,
                    &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                )
            })
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        (Value::Map(_, items), Type::Map(et)) => {
            let mut out = Map::new();
            for (k, v) in items {
                let child = path.with_step(AttributePathStep::ElementKeyString(k.clone()));
                out.insert(k.clone(), to_json(v, et, &child)?);
            }
            Ok(Json::Object(out))
        }
        (Value::Object(attrs), Type::Object(ats)) => {
            let mut out = Map::new();
            for (name, at) in ats {
                let child = path.with_step(AttributePathStep::AttributeName(name.clone()));
                let json = match attrs.get(name) {
                    Some(v) => to_json(v, at, &child)?,
                    None => Json::Null,
                };
                out.insert(name.clone(), json);
            }
            Ok(Json::Object(out))
        }
        _ => Err(PlugkitError::TypeMismatch {
            path: path.clone(),
            expected: ty.to_string(),
            actual: value.ty().to_string(),
        }),
    }
}

pub fn from_json(json: Json, ty: &Type, path: &AttributePath, options: JsonOptions) -> Result<Value> {
    if ty.is_dynamic() {
        return match json {
            Json::Null => Ok(Value::Null(Type::Dynamic)),
            Json::Object(mut wrapper) => {
                let type_json = wrapper
                    .remove("type")
                    .ok_or_else(|| err(path, "dynamic value is missing its \"type\" property"))?;
                let concrete = Type::from_json(&type_json)?;
                let payload = wrapper.remove("value").unwrap_or(Json::Null);
                from_json(payload, &concrete, path, options)
            }
            other => Err(err(
                path,
                format!("dynamic value must be a {{value, type}} object, found {}", other),
            )),
        };
    }
    if json.is_null() {
        return Ok(Value::Null(ty.clone()));
    }

    match ty {
        Type::Bool => match json {
            Json::Bool(b) => Ok(Value::Bool(b)),
            // State written by older providers may carry string booleans.
            Json::String(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
            other => Err(err(path, format!("expected bool, found {}", other))),
        },
        Type::Number => match json {
            Json::Number(n) => number::parse(&n.to_string()).map(Value::Number),
            Json::String(s) => number::parse(&s).map(Value::Number),
            other => Err(err(path, format!("expected number, found {}", other))),
        },
        Type::String => match json {
            Json::String(s) => Ok(Value::String(s)),
            Json::Number(n) => Ok(Value::String(n.to_string())),
            Json::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(err(path, format!("expected string, found {}", other))),
        },
        Type::List(et) | Type::Set(et) => {
            let items = match json {
                Json::Array(items) => items,
                other => return Err(err(path, format!("expected {}, found {}", ty, other))),
            };
            let values = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    from_json(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                        options,
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            let element = element_type(et, values.iter(), path)?;
            Ok(match ty {
                Type::Set(_) => Value::set(element, values),
                _ => Value::List(element, values),
            })
        }
        Type::Map(et) => {
            let entries = match json {
                Json::Object(entries) => entries,
                other => return Err(err(path, format!("expected {}, found {}", ty, other))),
            };
            let mut values = BTreeMap::new();
            for (k, v) in entries {
                let child = path.with_step(AttributePathStep::ElementKeyString(k.clone()));
                let decoded = from_json(v, et, &child, options)?;
                values.insert(k, decoded);
            }
            let element = element_type(et, values.values(), path)?;
            Ok(Value::Map(element, values))
        }
        Type::Tuple(ets) => {
            let items = match json {
                Json::Array(items) if items.len() == ets.len() => items,
                other => return Err(err(path, format!("expected {}, found {}", ty, other))),
            };
            items
                .into_iter()
                .zip(ets)
                .enumerate()
                .map(|(i, (item, et))| {
                    from_json(
                        item,
                        et,
                        &path.with_step(AttributePathStep::ElementKeyInt(i as i64)),
                        options,
                    )
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Tuple)
        }
        Type::Object(ats) => {
            let mut entries = match json {
                Json::Object(entries) => entries,
                other => return Err(err(path, format!("expected {}, found {}", ty, other))),
            };
            if !options.ignore_undefined_attributes {
                if let Some(extra) = entries.keys().find(|k| !ats.contains_key(*k)) {
                    return Err(err(path, format!("unsupported attribute {:?}", extra)));
                }
            }
            let mut attrs = BTreeMap::new();
            for (name, at) in ats {
                let child = path.with_step(AttributePathStep::AttributeName(name.clone()));
                let decoded = match entries.remove(name) {
                    Some(v) => from_json(v, at, &child, options)?,
                    None => Value::Null(at.clone()),
                };
                attrs.insert(name.clone(), decoded);
            }
            Ok(Value::Object(attrs))
        }
        Type::Dynamic => unreachable!("dynamic positions are handled before the type match"),
    }
}

fn element_type<'a>(
    declared: &Type,
    values: impl Iterator<Item = &'a Value>,
    path: &AttributePath,
) -> Result<Type> {
    if !declared.has_dynamic() {
        return Ok(declared.clone());
    }
    let mut found: Option<Type> = None;
    for ty in values.map(Value::ty).filter(|t| !t.is_dynamic()) {
        match &found {
            Some(existing) if *existing != ty => {
                return Err(err(
                    path,
                    format!("collection elements must share one type, found {} and {}", existing, ty),
                ))
            }
            Some(_) => {}
            None => found = Some(ty),
        }
    }
    Ok(found.unwrap_or_else(|| declared.clone()))
}
