//! Semantic equality helpers
//!
//! Element-level adapters lifted to collections: each element is brought to
//! its canonical form before comparison, so a set of values that differ only
//! in spelling compares equal.

use crate::schema::ValueAdapter;
use crate::types::{AttributePath, AttributePathStep, Diagnostics};
use crate::value::number::{parse, to_f32};
use crate::value::Value;
use std::sync::Arc;

/// Applies an element adapter to every element of a list, set or map.
pub struct ElementsAdapter {
    inner: Arc<dyn ValueAdapter>,
}

impl ElementsAdapter {
    pub fn create(inner: Arc<dyn ValueAdapter>) -> Arc<dyn ValueAdapter> {
        Arc::new(Self { inner })
    }
}

impl ValueAdapter for ElementsAdapter {
    fn description(&self) -> String {
        format!("each element: {}", self.inner.description())
    }

    fn canonicalize(&self, value: &Value) -> Value {
        match value {
            Value::List(ty, items) => Value::List(
                ty.clone(),
                items.iter().map(|v| self.inner.canonicalize(v)).collect(),
            ),
            Value::Set(ty, items) => Value::set(
                ty.clone(),
                items.iter().map(|v| self.inner.canonicalize(v)).collect(),
            ),
            Value::Map(ty, items) => Value::Map(
                ty.clone(),
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), self.inner.canonicalize(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn validate(&self, value: &Value, path: &AttributePath) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        match value {
            Value::List(_, items) | Value::Set(_, items) => {
                for (i, item) in items.iter().enumerate() {
                    let p = path.with_step(AttributePathStep::ElementKeyInt(i as i64));
                    diagnostics.extend(self.inner.validate(item, &p));
                }
            }
            Value::Map(_, items) => {
                for (k, item) in items {
                    let p = path.with_step(AttributePathStep::ElementKeyString(k.clone()));
                    diagnostics.extend(self.inner.validate(item, &p));
                }
            }
            _ => {}
        }
        diagnostics
    }
}

/// Numbers stored as 32-bit floats. Values compare equal when they narrow to
/// the same `f32`.
pub struct Float32Adapter;

impl Float32Adapter {
    pub fn create() -> Arc<dyn ValueAdapter> {
        Arc::new(Self)
    }
}

impl ValueAdapter for Float32Adapter {
    fn description(&self) -> String {
        "32-bit floating point number".to_string()
    }

    fn canonicalize(&self, value: &Value) -> Value {
        let narrowed = value
            .as_number()
            .and_then(|n| to_f32(n).ok())
            .and_then(|f| parse(&format!("{}", f)).ok());
        match narrowed {
            Some(n) => Value::Number(n),
            None => value.clone(),
        }
    }

    fn validate(&self, value: &Value, path: &AttributePath) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Some(Err(e)) = value.as_number().map(to_f32) {
            diagnostics.add_attribute_error(path.clone(), "Invalid Float32 Value", e.to_string());
        }
        diagnostics
    }
}

/// Semantic equality for any value under an optional adapter.
pub fn values_equal(adapter: Option<&Arc<dyn ValueAdapter>>, a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match adapter {
        Some(adapter) if a.is_wholly_known() && b.is_wholly_known() => {
            !a.is_null() && !b.is_null() && adapter.semantic_equal(a, b)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    struct CaseInsensitive;

    impl ValueAdapter for CaseInsensitive {
        fn description(&self) -> String {
            "case-insensitive string".to_string()
        }

        fn canonicalize(&self, value: &Value) -> Value {
            match value.as_str() {
                Some(s) => Value::from(s.to_lowercase()),
                None => value.clone(),
            }
        }
    }

    #[test]
    fn set_elements_compare_in_canonical_form() {
        let adapter = ElementsAdapter::create(Arc::new(CaseInsensitive));
        let a = Value::set(Type::String, vec!["A".into(), "b".into()]);
        let b = Value::set(Type::String, vec!["B".into(), "a".into()]);

        assert!(values_equal(Some(&adapter), &a, &b));
        assert!(!values_equal(None, &a, &b));
    }

    #[test]
    fn float32_compares_after_narrowing() {
        let adapter = Float32Adapter::create();
        let exact = Value::number(parse("1.1").unwrap());
        let widened = Value::number(parse("1.100000023841858").unwrap());
        assert!(values_equal(Some(&adapter), &exact, &widened));
        assert!(!values_equal(Some(&adapter), &exact, &Value::number(parse("1.2").unwrap())));

        let huge = Value::number(parse("1e39").unwrap());
        let errors = adapter.validate(&huge, &AttributePath::new("ratio"));
        assert_eq!(errors.errors().next().unwrap().summary, "Invalid Float32 Value");
    }

    #[test]
    fn null_is_never_semantically_equal_to_a_value() {
        let adapter: Arc<dyn ValueAdapter> = Arc::new(CaseInsensitive);
        assert!(!values_equal(
            Some(&adapter),
            &Value::null(Type::String),
            &Value::from("")
        ));
    }
}
