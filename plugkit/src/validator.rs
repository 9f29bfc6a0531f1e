//! Built-in attribute and resource-level validators
//!
//! Attribute validators skip null and unknown values; requiredness is
//! enforced by the schema and unknown values are checked again at apply.

use crate::path::Expression;
use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{AttributePath, Diagnostics};
use crate::value::Value;
use bigdecimal::BigDecimal;
use std::sync::Arc;

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLengthValidator {
    pub fn create(min: Option<usize>, max: Option<usize>) -> Arc<dyn Validator> {
        Arc::new(Self { min, max })
    }
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("string length must be between {} and {}", min, max),
            (Some(min), None) => format!("string length must be at least {}", min),
            (None, Some(max)) => format!("string length must be at most {}", max),
            (None, None) => "string of any length".to_string(),
        }
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(s) = request.config_value.as_str() {
            let len = s.chars().count();
            if self.min.is_some_and(|min| len < min) || self.max.is_some_and(|max| len > max) {
                diagnostics.add_attribute_error(
                    request.path.clone(),
                    "Invalid Attribute Value Length",
                    format!(
                        "Attribute {} {}, got: {}",
                        request.path,
                        self.description(),
                        len
                    ),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl StringPatternValidator {
    pub fn create(pattern: regex::Regex, description: &str) -> Arc<dyn Validator> {
        Arc::new(Self {
            pattern,
            description: description.to_string(),
        })
    }
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        format!("value must match {}", self.description)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(s) = request.config_value.as_str() {
            if !self.pattern.is_match(s) {
                diagnostics.add_attribute_error(
                    request.path.clone(),
                    "Invalid Attribute Value Match",
                    format!(
                        "Attribute {} must match {}, got: {:?}",
                        request.path, self.description, s
                    ),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<BigDecimal>,
    pub max: Option<BigDecimal>,
}

impl NumberRangeValidator {
    pub fn create(min: Option<i64>, max: Option<i64>) -> Arc<dyn Validator> {
        Arc::new(Self {
            min: min.map(BigDecimal::from),
            max: max.map(BigDecimal::from),
        })
    }
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => format!("value must be between {} and {}", min, max),
            (Some(min), None) => format!("value must be at least {}", min),
            (None, Some(max)) => format!("value must be at most {}", max),
            (None, None) => "any number".to_string(),
        }
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(n) = request.config_value.as_number() {
            let below = self.min.as_ref().is_some_and(|min| n < min);
            let above = self.max.as_ref().is_some_and(|max| n > max);
            if below || above {
                diagnostics.add_attribute_error(
                    request.path.clone(),
                    "Invalid Attribute Value",
                    format!(
                        "Attribute {} {}, got: {}",
                        request.path,
                        self.description(),
                        n.normalized()
                    ),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Bounds the element count of a list, set or map.
pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl ListLengthValidator {
    pub fn create(min: Option<usize>, max: Option<usize>) -> Arc<dyn Validator> {
        Arc::new(Self { min, max })
    }
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("must contain between {} and {} elements", min, max),
            (Some(min), None) => format!("must contain at least {} elements", min),
            (None, Some(max)) => format!("must contain at most {} elements", max),
            (None, None) => "any number of elements".to_string(),
        }
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Diagnostics::new();
        let len = match &request.config_value {
            Value::List(_, items) | Value::Set(_, items) => Some(items.len()),
            Value::Map(_, items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = len {
            if self.min.is_some_and(|min| len < min) || self.max.is_some_and(|max| len > max) {
                diagnostics.add_attribute_error(
                    request.path.clone(),
                    "Invalid Attribute Value",
                    format!(
                        "Attribute {} {}, got: {}",
                        request.path,
                        self.description(),
                        len
                    ),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Accepts only the listed string values.
pub struct OneOfValidator {
    pub values: Vec<String>,
}

impl OneOfValidator {
    pub fn create(values: &[&str]) -> Arc<dyn Validator> {
        Arc::new(Self {
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }
}

impl Validator for OneOfValidator {
    fn description(&self) -> String {
        format!("value must be one of: {:?}", self.values)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(s) = request.config_value.as_str() {
            if !self.values.iter().any(|v| v == s) {
                diagnostics.add_attribute_error(
                    request.path.clone(),
                    "Invalid Attribute Value Match",
                    format!(
                        "Attribute {} {}, got: {:?}",
                        request.path,
                        self.description(),
                        s
                    ),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Validates a whole configuration, typically relationships between attributes
pub trait ConfigValidator: Send + Sync {
    fn description(&self) -> String;
    fn validate(&self, config: &Value) -> Diagnostics;
}

/// Resolves expressions into the configured (non-null) positions. Returns
/// `None` when any referenced position is still unknown.
fn configured_paths(expressions: &[Expression], config: &Value) -> Option<Vec<AttributePath>> {
    let mut configured = Vec::new();
    for expr in expressions {
        for path in expr.resolve(config) {
            match config.get_path(&path) {
                Some(v) if v.is_unknown() => return None,
                Some(v) if !v.is_null() => configured.push(path),
                _ => {}
            }
        }
    }
    Some(configured)
}

fn render(expressions: &[Expression]) -> String {
    expressions
        .iter()
        .map(|e| format!("[{}]", e))
        .collect::<Vec<_>>()
        .join(",")
}

/// At most one of the expressions may be configured.
pub struct ConflictingAttributes {
    pub expressions: Vec<Expression>,
}

impl ConflictingAttributes {
    pub fn create(expressions: Vec<Expression>) -> Arc<dyn ConfigValidator> {
        Arc::new(Self { expressions })
    }
}

impl ConfigValidator for ConflictingAttributes {
    fn description(&self) -> String {
        format!(
            "These attributes cannot be configured together: {}",
            render(&self.expressions)
        )
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Some(configured) = configured_paths(&self.expressions, config) {
            if configured.len() > 1 {
                diagnostics.add_attribute_error(
                    configured[0].clone(),
                    "Invalid Attribute Combination",
                    self.description(),
                );
            }
        }
        diagnostics
    }
}

/// Either all or none of the expressions must be configured.
pub struct RequiredTogether {
    pub expressions: Vec<Expression>,
}

impl RequiredTogether {
    pub fn create(expressions: Vec<Expression>) -> Arc<dyn ConfigValidator> {
        Arc::new(Self { expressions })
    }
}

impl ConfigValidator for RequiredTogether {
    fn description(&self) -> String {
        format!(
            "These attributes must be configured together: {}",
            render(&self.expressions)
        )
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Some(configured) = configured_paths(&self.expressions, config) {
            let expected = self
                .expressions
                .iter()
                .map(|e| e.resolve(config).len())
                .sum::<usize>()
                .max(self.expressions.len());
            if !configured.is_empty() && configured.len() < expected {
                diagnostics.add_error("Invalid Attribute Combination", self.description());
            }
        }
        diagnostics
    }
}

/// At least one of the expressions must be configured.
pub struct AtLeastOneOf {
    pub expressions: Vec<Expression>,
}

impl AtLeastOneOf {
    pub fn create(expressions: Vec<Expression>) -> Arc<dyn ConfigValidator> {
        Arc::new(Self { expressions })
    }
}

impl ConfigValidator for AtLeastOneOf {
    fn description(&self) -> String {
        format!(
            "At least one of these attributes must be configured: {}",
            render(&self.expressions)
        )
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Some(configured) = configured_paths(&self.expressions, config) {
            if configured.is_empty() {
                diagnostics.add_error("Missing Attribute Configuration", self.description());
            }
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn run(validator: &dyn Validator, value: Value) -> Diagnostics {
        validator
            .validate(ValidatorRequest {
                config_value: value,
                path: AttributePath::new("test_field"),
            })
            .diagnostics
    }

    #[test]
    fn string_length_validator_accepts_valid_length() {
        let validator = StringLengthValidator::create(Some(3), Some(10));
        assert!(run(validator.as_ref(), "hello".into()).is_empty());
    }

    #[test]
    fn string_length_validator_rejects_too_short() {
        let validator = StringLengthValidator::create(Some(5), None);
        let diags = run(validator.as_ref(), "hi".into());

        assert_eq!(diags.errors().count(), 1);
        let diag = diags.iter().next().unwrap();
        assert!(diag.detail.contains("at least 5"));
        assert_eq!(diag.attribute, Some(AttributePath::new("test_field")));
    }

    #[test]
    fn validators_skip_null_and_unknown() {
        let validator = StringLengthValidator::create(Some(5), None);
        assert!(run(validator.as_ref(), Value::null(Type::String)).is_empty());
        assert!(run(validator.as_ref(), Value::unknown(Type::String)).is_empty());
    }

    #[test]
    fn string_pattern_validator_rejects_non_matching() {
        let validator = StringPatternValidator::create(
            regex::Regex::new(r"^\d{3}-\d{3}-\d{4}$").unwrap(),
            "phone number format",
        );

        assert!(run(validator.as_ref(), "123-456-7890".into()).is_empty());
        let diags = run(validator.as_ref(), "invalid".into());
        assert!(diags.iter().next().unwrap().detail.contains("phone number format"));
    }

    #[test]
    fn number_range_validator_uses_exact_comparison() {
        let validator = NumberRangeValidator::create(Some(10), Some(100));

        assert!(run(validator.as_ref(), Value::from(10)).is_empty());
        assert!(!run(validator.as_ref(), "9.999999999999999999999".parse().unwrap()).is_empty());
        assert!(!run(validator.as_ref(), Value::from(101)).is_empty());
    }

    #[test]
    fn list_length_validator_counts_sets_and_maps() {
        let validator = ListLengthValidator::create(Some(1), Some(2));

        let set = Value::set(Type::String, vec!["a".into(), "b".into(), "c".into()]);
        assert!(!run(validator.as_ref(), set).is_empty());

        let map = Value::map(Type::String, [("k", Value::from("v"))]);
        assert!(run(validator.as_ref(), map).is_empty());
    }

    #[test]
    fn one_of_validator() {
        let validator = OneOfValidator::create(&["a", "b"]);
        assert!(run(validator.as_ref(), "a".into()).is_empty());
        assert!(!run(validator.as_ref(), "c".into()).is_empty());
    }

    fn config(a: Value, b: Value) -> Value {
        Value::object([("a", a), ("b", b)])
    }

    fn exprs() -> Vec<Expression> {
        vec![
            Expression::root().at_name("a"),
            Expression::root().at_name("b"),
        ]
    }

    #[test]
    fn conflicting_attributes() {
        let validator = ConflictingAttributes::create(exprs());
        let null = Value::null(Type::String);

        assert!(validator.validate(&config("x".into(), null.clone())).is_empty());
        assert!(validator.validate(&config("x".into(), "y".into())).has_errors());
        // Unknown values defer the decision to a later round.
        assert!(validator
            .validate(&config("x".into(), Value::unknown(Type::String)))
            .is_empty());
    }

    #[test]
    fn required_together() {
        let validator = RequiredTogether::create(exprs());
        let null = Value::null(Type::String);

        assert!(validator.validate(&config(null.clone(), null.clone())).is_empty());
        assert!(validator.validate(&config("x".into(), "y".into())).is_empty());
        assert!(validator.validate(&config("x".into(), null)).has_errors());
    }

    #[test]
    fn at_least_one_of() {
        let validator = AtLeastOneOf::create(exprs());
        let null = Value::null(Type::String);

        assert!(validator.validate(&config(null.clone(), null.clone())).has_errors());
        assert!(validator.validate(&config(null, "y".into())).is_empty());
    }
}
