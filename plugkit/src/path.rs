//! Path expressions
//!
//! An [`Expression`] names one or more attribute positions symbolically, for
//! example "every element of `rules`, attribute `port`". Validators and plan
//! modifiers resolve expressions against a concrete value to get the
//! matching [`AttributePath`]s.

use crate::types::{AttributePath, AttributePathStep};
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpressionStep {
    AttributeName(String),
    ElementKeyString(String),
    ElementKeyInt(i64),
    AnyElement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Expression {
    steps: Vec<ExpressionStep>,
}

impl Expression {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn at_name(mut self, name: &str) -> Self {
        self.steps
            .push(ExpressionStep::AttributeName(name.to_string()));
        self
    }

    pub fn at_map_key(mut self, key: &str) -> Self {
        self.steps
            .push(ExpressionStep::ElementKeyString(key.to_string()));
        self
    }

    pub fn at_list_index(mut self, index: i64) -> Self {
        self.steps.push(ExpressionStep::ElementKeyInt(index));
        self
    }

    /// Matches every element of a list, set or map, and every tuple slot.
    pub fn at_any_element(mut self) -> Self {
        self.steps.push(ExpressionStep::AnyElement);
        self
    }

    pub fn steps(&self) -> &[ExpressionStep] {
        &self.steps
    }

    pub fn matches(&self, path: &AttributePath) -> bool {
        self.steps.len() == path.steps.len()
            && self
                .steps
                .iter()
                .zip(&path.steps)
                .all(|(expr, step)| match (expr, step) {
                    (ExpressionStep::AnyElement, AttributePathStep::AttributeName(_)) => false,
                    (ExpressionStep::AnyElement, _) => true,
                    (ExpressionStep::AttributeName(a), AttributePathStep::AttributeName(b)) => a == b,
                    (ExpressionStep::ElementKeyString(a), AttributePathStep::ElementKeyString(b)) => {
                        a == b
                    }
                    (ExpressionStep::ElementKeyInt(a), AttributePathStep::ElementKeyInt(b)) => a == b,
                    _ => false,
                })
    }

    /// Expands the expression into the concrete paths present in `value`.
    ///
    /// Paths through null or unknown intermediate values are dropped; the
    /// final position itself may be null or unknown.
    pub fn resolve(&self, value: &Value) -> Vec<AttributePath> {
        let mut frontier = vec![(AttributePath::root(), value)];
        for (depth, step) in self.steps.iter().enumerate() {
            let last = depth + 1 == self.steps.len();
            let mut next = Vec::new();
            for (path, current) in frontier {
                expand(step, &path, current, &mut next);
            }
            if !last {
                next.retain(|(_, v)| v.is_known() && !v.is_null());
            }
            frontier = next;
        }
        frontier.into_iter().map(|(path, _)| path).collect()
    }
}

fn expand<'a>(
    step: &ExpressionStep,
    path: &AttributePath,
    value: &'a Value,
    out: &mut Vec<(AttributePath, &'a Value)>,
) {
    match (step, value) {
        (ExpressionStep::AttributeName(name), Value::Object(attrs)) => {
            if let Some(v) = attrs.get(name) {
                out.push((path.with_step(AttributePathStep::AttributeName(name.clone())), v));
            }
        }
        (ExpressionStep::ElementKeyString(key), Value::Map(_, items)) => {
            if let Some(v) = items.get(key) {
                out.push((path.with_step(AttributePathStep::ElementKeyString(key.clone())), v));
            }
        }
        (ExpressionStep::ElementKeyInt(idx), _) => {
            let item = value
                .elements()
                .and_then(|items| usize::try_from(*idx).ok().and_then(|i| items.get(i)));
            if let Some(v) = item {
                out.push((path.with_step(AttributePathStep::ElementKeyInt(*idx)), v));
            }
        }
        (ExpressionStep::AnyElement, Value::Map(_, items)) => {
            for (k, v) in items {
                out.push((path.with_step(AttributePathStep::ElementKeyString(k.clone())), v));
            }
        }
        (ExpressionStep::AnyElement, _) => {
            if let Some(items) = value.elements() {
                for (i, v) in items.iter().enumerate() {
                    out.push((path.with_step(AttributePathStep::ElementKeyInt(i as i64)), v));
                }
            }
        }
        _ => {}
    }
}

impl From<&AttributePath> for Expression {
    fn from(path: &AttributePath) -> Self {
        Self {
            steps: path
                .steps
                .iter()
                .map(|step| match step {
                    AttributePathStep::AttributeName(n) => ExpressionStep::AttributeName(n.clone()),
                    AttributePathStep::ElementKeyString(k) => {
                        ExpressionStep::ElementKeyString(k.clone())
                    }
                    AttributePathStep::ElementKeyInt(i) => ExpressionStep::ElementKeyInt(*i),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                ExpressionStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                ExpressionStep::AttributeName(name) => write!(f, ".{}", name)?,
                ExpressionStep::ElementKeyString(key) => write!(f, "[{:?}]", key)?,
                ExpressionStep::ElementKeyInt(idx) => write!(f, "[{}]", idx)?,
                ExpressionStep::AnyElement => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn rules() -> Value {
        let rule_ty = Type::object([("port", Type::Number)]);
        Value::object([
            ("name", Value::from("web")),
            (
                "rules",
                Value::list(
                    rule_ty,
                    vec![
                        Value::object([("port", Value::from(80))]),
                        Value::object([("port", Value::from(443))]),
                    ],
                ),
            ),
        ])
    }

    #[test]
    fn wildcard_resolves_every_element() {
        let expr = Expression::root()
            .at_name("rules")
            .at_any_element()
            .at_name("port");
        let paths = expr.resolve(&rules());

        assert_eq!(
            paths,
            vec![
                AttributePath::new("rules").index(0).attribute("port"),
                AttributePath::new("rules").index(1).attribute("port"),
            ]
        );
        assert!(expr.matches(&paths[1]));
        assert_eq!(expr.to_string(), "rules[*].port");
    }

    #[test]
    fn missing_attribute_resolves_to_nothing() {
        let expr = Expression::root().at_name("absent");
        assert!(expr.resolve(&rules()).is_empty());
    }

    #[test]
    fn null_leaf_still_resolves() {
        let value = Value::object([("name", Value::null(Type::String))]);
        let expr = Expression::root().at_name("name");
        assert_eq!(expr.resolve(&value), vec![AttributePath::new("name")]);
    }

    #[test]
    fn attribute_path_converts_to_exact_expression() {
        let path = AttributePath::new("rules").index(1).attribute("port");
        let expr = Expression::from(&path);
        assert!(expr.matches(&path));
        assert!(!expr.matches(&AttributePath::new("rules").index(0).attribute("port")));
    }
}
