//! The type universe shared by schemas and values
//!
//! Types serialize to the engine's JSON type descriptor format:
//! `"string"`, `"number"`, `"bool"`, `"dynamic"`, `["list", T]`, `["set", T]`,
//! `["map", T]`, `["tuple", [T...]]` and `["object", {name: T}]`.

use crate::error::{PlugkitError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

/// A type in the engine's type system.
///
/// `Dynamic` is the pseudo-type: it only appears in schemas and means the
/// concrete type travels alongside the value on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Tuple(Vec<Type>),
    Object(BTreeMap<String, Type>),
    Dynamic,
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn set(element: Type) -> Self {
        Type::Set(Box::new(element))
    }

    pub fn map(element: Type) -> Self {
        Type::Map(Box::new(element))
    }

    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::Tuple(elements)
    }

    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Type)>) -> Self {
        Type::Object(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Set(t) | Type::Map(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true when the pseudo-type appears anywhere inside this type.
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::Bool | Type::Number | Type::String => false,
            Type::List(t) | Type::Set(t) | Type::Map(t) => t.has_dynamic(),
            Type::Tuple(ts) => ts.iter().any(Type::has_dynamic),
            Type::Object(attrs) => attrs.values().any(Type::has_dynamic),
        }
    }

    /// Assignment compatibility at the wire boundary: a value of type `other`
    /// may be placed at a position declared as `self`.
    ///
    /// This is not value equality; two values are only equal when their
    /// recorded types are equal.
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Dynamic, _) => true,
            (Type::Bool, Type::Bool) | (Type::Number, Type::Number) | (Type::String, Type::String) => {
                true
            }
            (Type::List(a), Type::List(b))
            | (Type::Set(a), Type::Set(b))
            | (Type::Map(a), Type::Map(b)) => a.accepts(b),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.accepts(y))
            }
            (Type::Object(a), Type::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(name, t)| b.get(name).is_some_and(|other| t.accepts(other)))
            }
            _ => false,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Type::Bool => Json::from("bool"),
            Type::Number => Json::from("number"),
            Type::String => Json::from("string"),
            Type::Dynamic => Json::from("dynamic"),
            Type::List(t) => Json::Array(vec![Json::from("list"), t.to_json()]),
            Type::Set(t) => Json::Array(vec![Json::from("set"), t.to_json()]),
            Type::Map(t) => Json::Array(vec![Json::from("map"), t.to_json()]),
            Type::Tuple(ts) => Json::Array(vec![
                Json::from("tuple"),
                Json::Array(ts.iter().map(Type::to_json).collect()),
            ]),
            Type::Object(attrs) => Json::Array(vec![
                Json::from("object"),
                Json::Object(
                    attrs
                        .iter()
                        .map(|(k, t)| (k.clone(), t.to_json()))
                        .collect(),
                ),
            ]),
        }
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::String(name) => match name.as_str() {
                "bool" => Ok(Type::Bool),
                "number" => Ok(Type::Number),
                "string" => Ok(Type::String),
                "dynamic" => Ok(Type::Dynamic),
                other => Err(PlugkitError::DecodingError(format!(
                    "invalid primitive type name {:?}",
                    other
                ))),
            },
            Json::Array(parts) if parts.len() == 2 => {
                let kind = parts[0].as_str().ok_or_else(|| {
                    PlugkitError::DecodingError("type constructor must be a string".to_string())
                })?;
                match kind {
                    "list" => Ok(Type::list(Type::from_json(&parts[1])?)),
                    "set" => Ok(Type::set(Type::from_json(&parts[1])?)),
                    "map" => Ok(Type::map(Type::from_json(&parts[1])?)),
                    "tuple" => {
                        let elems = parts[1].as_array().ok_or_else(|| {
                            PlugkitError::DecodingError(
                                "tuple type requires an array of element types".to_string(),
                            )
                        })?;
                        Ok(Type::Tuple(
                            elems.iter().map(Type::from_json).collect::<Result<_>>()?,
                        ))
                    }
                    "object" => {
                        let attrs = parts[1].as_object().ok_or_else(|| {
                            PlugkitError::DecodingError(
                                "object type requires a map of attribute types".to_string(),
                            )
                        })?;
                        Ok(Type::Object(
                            attrs
                                .iter()
                                .map(|(k, v)| Ok((k.clone(), Type::from_json(v)?)))
                                .collect::<Result<_>>()?,
                        ))
                    }
                    other => Err(PlugkitError::DecodingError(format!(
                        "invalid type constructor {:?}",
                        other
                    ))),
                }
            }
            // Objects with optional attributes carry a third element we do not model.
            Json::Array(parts) if parts.len() == 3 && parts[0] == "object" => {
                Type::from_json(&Json::Array(parts[..2].to_vec()))
            }
            other => Err(PlugkitError::DecodingError(format!(
                "invalid type descriptor {}",
                other
            ))),
        }
    }

    /// The compact JSON descriptor carried next to pseudo-typed values.
    pub fn marshal_json(&self) -> Vec<u8> {
        // Serializing an in-memory serde_json::Value cannot fail.
        serde_json::to_vec(&self.to_json()).unwrap_or_default()
    }

    pub fn unmarshal_json(data: &[u8]) -> Result<Self> {
        let json: Json = serde_json::from_slice(data).map_err(|e| {
            PlugkitError::DecodingError(format!("invalid type descriptor: {}", e))
        })?;
        Type::from_json(&json)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Dynamic => write!(f, "dynamic pseudo-type"),
            Type::List(t) => write!(f, "list of {}", t),
            Type::Set(t) => write!(f, "set of {}", t),
            Type::Map(t) => write!(f, "map of {}", t),
            Type::Tuple(ts) => {
                write!(f, "tuple[")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "]")
            }
            Type::Object(attrs) => {
                write!(f, "object{{")?;
                for (i, (name, t)) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, t)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Type {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = Json::deserialize(deserializer)?;
        Type::from_json(&json).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_descriptor_round_trips_nested_types() {
        let ty = Type::object([
            ("names", Type::list(Type::String)),
            ("pairs", Type::tuple(vec![Type::Number, Type::Bool])),
            ("anything", Type::Dynamic),
        ]);
        let bytes = ty.marshal_json();
        assert_eq!(Type::unmarshal_json(&bytes).unwrap(), ty);
    }

    #[test]
    fn descriptor_format_matches_engine() {
        let ty = Type::map(Type::set(Type::String));
        assert_eq!(
            String::from_utf8(ty.marshal_json()).unwrap(),
            r#"["map",["set","string"]]"#
        );
    }

    #[test]
    fn dynamic_accepts_everything_but_is_not_equal() {
        assert!(Type::Dynamic.accepts(&Type::String));
        assert_ne!(Type::Dynamic, Type::String);
        assert!(!Type::String.accepts(&Type::Dynamic));
        assert_eq!(Type::Dynamic, Type::Dynamic);
    }

    #[test]
    fn has_dynamic_is_transitive() {
        let ty = Type::list(Type::object([("bar", Type::Dynamic)]));
        assert!(ty.has_dynamic());
        assert!(!Type::list(Type::String).has_dynamic());
    }

    #[test]
    fn rejects_unknown_constructor() {
        assert!(Type::unmarshal_json(br#"["vector","string"]"#).is_err());
        assert!(Type::unmarshal_json(br#""float""#).is_err());
    }
}
