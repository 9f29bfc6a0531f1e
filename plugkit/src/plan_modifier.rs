//! Built-in plan modifiers
//!
//! The framework runs these per attribute during planning, after computed
//! attributes without configuration have been marked unknown.

use crate::schema::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
use crate::types::Diagnostics;
use std::sync::Arc;

/// Marks an attribute as requiring replacement when it changes
pub struct RequiresReplaceIfChanged;

impl RequiresReplaceIfChanged {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for RequiresReplaceIfChanged {
    fn description(&self) -> String {
        "If the value of this attribute changes, the resource will be replaced.".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.creating
            && !(request.state_value.is_null() && request.plan_value.is_null())
            && request.state_value.is_known()
            && request.plan_value.is_known()
            && request.state_value != request.plan_value;

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Uses the prior state value when the planned value is unknown
///
/// Keeps computed attributes such as generated ids stable across updates
/// instead of showing them as known after apply.
pub struct UseStateForUnknown;

impl UseStateForUnknown {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "Once set, the value of this attribute in state will not change.".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        if request.creating
            || request.state_value.is_null()
            || request.plan_value.is_known()
            || request.config_value.is_unknown()
        {
            return PlanModifierResponse::unchanged(request);
        }
        PlanModifierResponse {
            plan_value: request.state_value,
            requires_replace: false,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Marks an attribute as requiring replacement whenever its planned value
/// differs from state, including when the new value is not yet known
pub struct RequiresReplace;

impl RequiresReplace {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "Any change to this attribute, including one not known until apply, replaces the resource."
            .to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.creating && request.state_value != request.plan_value;
        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Requires replacement when a predicate over the request holds
pub struct RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    predicate: F,
    description: String,
}

impl<F> RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync + 'static,
{
    pub fn create(predicate: F, description: impl Into<String>) -> Arc<dyn PlanModifier> {
        Arc::new(Self {
            predicate,
            description: description.into(),
        })
    }
}

impl<F> PlanModifier for RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.creating && (self.predicate)(&request);
        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Makes an optional attribute mandatory when the resource is created.
/// Updates may leave it unset.
pub struct RequiredOnCreate;

impl RequiredOnCreate {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for RequiredOnCreate {
    fn description(&self) -> String {
        "This attribute must be configured when the resource is created.".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        if !request.creating || !request.config_value.is_null() {
            return PlanModifierResponse::unchanged(request);
        }
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_attribute_error(
            request.path.clone(),
            "Missing Configuration for Required Attribute",
            format!(
                "Must set a configuration value for the {} attribute as the provider has marked it as required on create.",
                request.path
            ),
        );
        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace: false,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;
    use crate::value::{Type, Value};

    fn request(state: Value, plan: Value, config: Value, creating: bool) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: config,
            state_value: state,
            plan_value: plan,
            path: AttributePath::new("field"),
            creating,
        }
    }

    #[test]
    fn requires_replace_if_changed_does_not_trigger_on_same_value() {
        let response = RequiresReplaceIfChanged::create().modify(request(
            "hello".into(),
            "hello".into(),
            "hello".into(),
            false,
        ));

        assert!(!response.requires_replace);
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn requires_replace_if_changed_triggers_on_different_value() {
        let response = RequiresReplaceIfChanged::create().modify(request(
            "hello".into(),
            "world".into(),
            "world".into(),
            false,
        ));

        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_triggers_on_unknown_plan() {
        let unknown = Value::unknown(Type::String);
        let response =
            RequiresReplace::create().modify(request("hello".into(), unknown.clone(), unknown, false));
        assert!(response.requires_replace);

        let response = RequiresReplaceIfChanged::create().modify(request(
            "hello".into(),
            Value::unknown(Type::String),
            Value::unknown(Type::String),
            false,
        ));
        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_never_triggers_on_create() {
        let response = RequiresReplaceIfChanged::create().modify(request(
            Value::null(Type::String),
            "world".into(),
            "world".into(),
            true,
        ));

        assert!(!response.requires_replace);
    }

    #[test]
    fn use_state_for_unknown_preserves_state_when_unknown() {
        let response = UseStateForUnknown::create().modify(request(
            "existing-value".into(),
            Value::unknown(Type::String),
            Value::null(Type::String),
            false,
        ));

        assert_eq!(response.plan_value, Value::from("existing-value"));
    }

    #[test]
    fn use_state_for_unknown_uses_plan_when_known() {
        let response = UseStateForUnknown::create().modify(request(
            "existing-value".into(),
            "new-value".into(),
            "new-value".into(),
            false,
        ));

        assert_eq!(response.plan_value, Value::from("new-value"));
    }

    #[test]
    fn requires_replace_if_triggers_on_condition() {
        let modifier = RequiresReplaceIf::create(
            |req| {
                matches!((req.state_value.as_str(), req.plan_value.as_str()),
                    (Some(old), Some(new)) if !old.is_empty() && new.is_empty())
            },
            "Cannot change to empty string without replacement",
        );

        let response = modifier.modify(request("has-value".into(), "".into(), "".into(), false));
        assert!(response.requires_replace);

        let response = modifier.modify(request("".into(), "new".into(), "new".into(), false));
        assert!(!response.requires_replace);
    }

    #[test]
    fn required_on_create_rejects_null_only_on_create() {
        let modifier = RequiredOnCreate::create();
        let null = Value::null(Type::String);

        let create = modifier.modify(request(null.clone(), null.clone(), null.clone(), true));
        assert!(create.diagnostics.has_errors());
        assert_eq!(
            create.diagnostics.iter().next().unwrap().attribute,
            Some(AttributePath::new("field"))
        );

        let update = modifier.modify(request("old".into(), null.clone(), null, false));
        assert!(!update.diagnostics.has_errors());

        let configured = modifier.modify(request(
            Value::null(Type::String),
            "x".into(),
            "x".into(),
            true,
        ));
        assert!(!configured.diagnostics.has_errors());
    }
}
