//! Value & type model
//!
//! [`Value`] pairs a [`Type`] with a payload, `Null` or `Unknown`. Values are
//! converted to and from the wire with the type-preserving msgpack codec in
//! [`msgpack`] and the JSON codec in [`json`] (used for raw state).

pub mod json;
pub mod msgpack;
pub mod number;
mod ty;

pub use ty::Type;

use crate::error::{PlugkitError, Result};
use crate::types::{AttributePath, AttributePathStep};
use bigdecimal::BigDecimal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A typed value.
///
/// Known payloads record their type structurally: a tuple's type is derived
/// from its elements and an object's from its attributes, while collections
/// carry their element type explicitly so empty collections stay typed.
#[derive(Debug, Clone)]
pub enum Value {
    Null(Type),
    Unknown(Type),
    Bool(bool),
    Number(BigDecimal),
    String(String),
    List(Type, Vec<Value>),
    Set(Type, Vec<Value>),
    Map(Type, BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn null(ty: Type) -> Self {
        Value::Null(ty)
    }

    pub fn unknown(ty: Type) -> Self {
        Value::Unknown(ty)
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn number(n: impl Into<BigDecimal>) -> Self {
        Value::Number(n.into())
    }

    /// Builds a number from a float; non-finite inputs have no representation.
    pub fn from_f64(f: f64) -> Option<Self> {
        number::from_f64(f).ok().map(Value::Number)
    }

    pub fn list(element: Type, items: Vec<Value>) -> Self {
        Value::List(element, items)
    }

    /// Builds a set, dropping duplicate members.
    pub fn set(element: Type, items: Vec<Value>) -> Self {
        let mut members: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !members.contains(&item) {
                members.push(item);
            }
        }
        Value::Set(element, members)
    }

    pub fn map<K: Into<String>>(element: Type, items: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(
            element,
            items.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }

    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// An object whose every attribute is null, shaped by an object type.
    pub fn null_object(ty: &Type) -> Self {
        match ty {
            Type::Object(attrs) => Value::Object(
                attrs
                    .iter()
                    .map(|(k, t)| (k.clone(), Value::Null(t.clone())))
                    .collect(),
            ),
            other => Value::Null(other.clone()),
        }
    }

    /// The type recorded for this value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) | Value::Unknown(t) => t.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(t, _) => Type::list(t.clone()),
            Value::Set(t, _) => Type::set(t.clone()),
            Value::Map(t, _) => Type::map(t.clone()),
            Value::Tuple(items) => Type::Tuple(items.iter().map(Value::ty).collect()),
            Value::Object(attrs) => Type::Object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.ty()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    /// True when neither this value nor anything nested in it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                items.iter().all(Value::is_wholly_known)
            }
            Value::Map(_, items) | Value::Object(items) => {
                items.values().all(Value::is_wholly_known)
            }
            _ => true,
        }
    }

    /// True when a value may be placed at a position of type `ty`.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match self {
            Value::Null(t) | Value::Unknown(t) => t.is_dynamic() || ty.accepts(t),
            Value::List(_, items) | Value::Set(_, items) => match (self, ty) {
                (_, Type::Dynamic) => true,
                (Value::List(..), Type::List(et)) | (Value::Set(..), Type::Set(et)) => {
                    items.iter().all(|v| v.conforms_to(et))
                }
                _ => false,
            },
            Value::Map(_, items) => match ty {
                Type::Dynamic => true,
                Type::Map(et) => items.values().all(|v| v.conforms_to(et)),
                _ => false,
            },
            Value::Tuple(items) => match ty {
                Type::Dynamic => true,
                Type::Tuple(ts) => {
                    ts.len() == items.len() && items.iter().zip(ts).all(|(v, t)| v.conforms_to(t))
                }
                _ => false,
            },
            Value::Object(attrs) => match ty {
                Type::Dynamic => true,
                Type::Object(ts) => {
                    ts.len() == attrs.len()
                        && ts
                            .iter()
                            .all(|(k, t)| attrs.get(k).is_some_and(|v| v.conforms_to(t)))
                }
                _ => false,
            },
            _ => ty.accepts(&self.ty()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&BigDecimal> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Integer view of a number; fractional numbers have none.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(number::to_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(number::to_f64)
    }

    /// Elements of a list, set or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Entries of a map or attributes of an object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(_, items) | Value::Object(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(attrs) => attrs.get(name),
            _ => None,
        }
    }

    /// Replaces an object attribute, returning the modified object.
    pub fn with_attr(mut self, name: &str, value: Value) -> Self {
        if let Value::Object(attrs) = &mut self {
            attrs.insert(name.to_string(), value);
        }
        self
    }

    pub fn get_path(&self, path: &AttributePath) -> Option<&Value> {
        let mut current = self;
        for step in &path.steps {
            current = current.step(step)?;
        }
        Some(current)
    }

    fn step(&self, step: &AttributePathStep) -> Option<&Value> {
        match (self, step) {
            (Value::Object(attrs), AttributePathStep::AttributeName(name)) => attrs.get(name),
            (Value::Map(_, items), AttributePathStep::ElementKeyString(key)) => items.get(key),
            (
                Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items),
                AttributePathStep::ElementKeyInt(idx),
            ) => usize::try_from(*idx).ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    fn step_mut(&mut self, step: &AttributePathStep) -> Option<&mut Value> {
        match (self, step) {
            (Value::Object(attrs), AttributePathStep::AttributeName(name)) => attrs.get_mut(name),
            (Value::Map(_, items), AttributePathStep::ElementKeyString(key)) => items.get_mut(key),
            (
                Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items),
                AttributePathStep::ElementKeyInt(idx),
            ) => usize::try_from(*idx).ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
    }

    /// Replaces the value at `path`. The path must already exist, except that
    /// the final step may name a new map key.
    pub fn set_path(&mut self, path: &AttributePath, new_value: Value) -> Result<()> {
        let Some((last, parents)) = path.steps.split_last() else {
            *self = new_value;
            return Ok(());
        };
        let mut current = self;
        for step in parents {
            current = current.step_mut(step).ok_or_else(|| {
                PlugkitError::Custom(format!("path {} does not exist", path))
            })?;
        }
        match (current, last) {
            (Value::Map(_, items), AttributePathStep::ElementKeyString(key)) => {
                items.insert(key.clone(), new_value);
                Ok(())
            }
            (current, step) => {
                let slot = current.step_mut(step).ok_or_else(|| {
                    PlugkitError::Custom(format!("path {} does not exist", path))
                })?;
                *slot = new_value;
                Ok(())
            }
        }
    }

    /// Type-safe accessors for handler code
    pub fn get_string(&self, path: &AttributePath) -> Result<String> {
        let value = self.navigate(path)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(path, "string", value))
    }

    pub fn get_bool(&self, path: &AttributePath) -> Result<bool> {
        let value = self.navigate(path)?;
        value.as_bool().ok_or_else(|| mismatch(path, "bool", value))
    }

    pub fn get_number(&self, path: &AttributePath) -> Result<BigDecimal> {
        let value = self.navigate(path)?;
        value
            .as_number()
            .cloned()
            .ok_or_else(|| mismatch(path, "number", value))
    }

    pub fn get_i64(&self, path: &AttributePath) -> Result<i64> {
        let value = self.navigate(path)?;
        value
            .as_i64()
            .ok_or_else(|| mismatch(path, "whole number", value))
    }

    /// Optional string: null yields `None`, any other non-string is an error.
    pub fn get_optional_string(&self, path: &AttributePath) -> Result<Option<String>> {
        match self.navigate(path)? {
            Value::Null(_) => Ok(None),
            value => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| mismatch(path, "string", value)),
        }
    }

    fn navigate(&self, path: &AttributePath) -> Result<&Value> {
        self.get_path(path)
            .ok_or_else(|| PlugkitError::Custom(format!("attribute '{}' not found", path)))
    }
}

fn mismatch(path: &AttributePath, expected: &str, actual: &Value) -> PlugkitError {
    let actual = match actual {
        Value::Null(_) => "null".to_string(),
        Value::Unknown(_) => "unknown value".to_string(),
        other => other.ty().to_string(),
    };
    PlugkitError::TypeMismatch {
        path: path.clone(),
        expected: expected.to_string(),
        actual,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null(a), Value::Null(b)) | (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(ta, a), Value::List(tb, b)) => ta == tb && a == b,
            (Value::Set(ta, a), Value::Set(tb, b)) => {
                ta == tb && a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (Value::Map(ta, a), Value::Map(tb, b)) => ta == tb && a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(BigDecimal::from(n))
    }
}

impl FromStr for Value {
    type Err = PlugkitError;

    /// Parses a decimal literal into a number value.
    fn from_str(s: &str) -> Result<Self> {
        number::parse(s).map(Value::Number)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "null"),
            Value::Unknown(_) => write!(f, "(known after apply)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n.normalized()),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(_, items) | Value::Object(items) => {
                write!(f, "{{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_type_is_derived_from_elements() {
        let v = Value::tuple(vec!["hey".into(), "there".into(), "tuple".into()]);
        assert_eq!(
            v.ty(),
            Type::tuple(vec![Type::String, Type::String, Type::String])
        );
    }

    #[test]
    fn null_and_unknown_compare_by_type() {
        assert_eq!(Value::null(Type::String), Value::null(Type::String));
        assert_ne!(Value::null(Type::String), Value::null(Type::Number));
        assert_ne!(Value::null(Type::String), Value::unknown(Type::String));
    }

    #[test]
    fn sets_compare_unordered_and_deduplicate() {
        let a = Value::set(Type::String, vec!["a".into(), "b".into(), "a".into()]);
        let b = Value::set(Type::String, vec!["b".into(), "a".into()]);
        assert_eq!(a, b);
        assert_eq!(a.elements().unwrap().len(), 2);
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!("1.0".parse::<Value>().unwrap(), Value::from(1));
        assert_eq!(Value::from(200).as_i64(), Some(200));
        assert_eq!("1.5".parse::<Value>().unwrap().as_i64(), None);
    }

    #[test]
    fn path_navigation_and_mutation() {
        let mut v = Value::object([
            (
                "tags",
                Value::map(Type::String, [("env", Value::from("dev"))]),
            ),
            ("names", Value::list(Type::String, vec!["a".into()])),
        ]);
        let env = AttributePath::new("tags").key("env");
        assert_eq!(v.get_string(&env).unwrap(), "dev");

        v.set_path(&AttributePath::new("tags").key("team"), "core".into())
            .unwrap();
        v.set_path(&AttributePath::new("names").index(0), "b".into())
            .unwrap();

        assert_eq!(
            v.get_string(&AttributePath::new("tags").key("team")).unwrap(),
            "core"
        );
        assert_eq!(
            v.get_string(&AttributePath::new("names").index(0)).unwrap(),
            "b"
        );
        assert!(v
            .set_path(&AttributePath::new("missing").attribute("x"), Value::from(1))
            .is_err());
    }

    #[test]
    fn accessor_reports_type_mismatch() {
        let v = Value::object([("flag", Value::bool(true))]);
        let err = v.get_string(&AttributePath::new("flag")).unwrap_err();
        assert!(matches!(err, PlugkitError::TypeMismatch { .. }));
    }

    #[test]
    fn wholly_known_is_recursive() {
        let v = Value::object([(
            "inner",
            Value::list(Type::String, vec![Value::unknown(Type::String)]),
        )]);
        assert!(v.is_known());
        assert!(!v.is_wholly_known());
    }

    #[test]
    fn conformance_to_schema_types() {
        let ty = Type::object([("dyn", Type::Dynamic), ("name", Type::String)]);
        let v = Value::object([
            ("dyn", Value::tuple(vec![Value::from(1)])),
            ("name", Value::null(Type::String)),
        ]);
        assert!(v.conforms_to(&ty));
        assert!(!Value::object([("name", Value::from("x"))]).conforms_to(&ty));
    }
}
