//! State and identity upgrade chains
//!
//! Stored values are upgraded one version at a time. The step registered
//! for version `v` decodes the raw value with the schema of `v` and produces
//! a value for `v + 1`; the final value must conform to the current schema.

use crate::protocol::RawState;
use crate::resource::{IdentityUpgrader, StateUpgrader, UpgradeFn};
use crate::types::{Diagnostic, Diagnostics};
use crate::value::json::JsonOptions;
use crate::value::{Type, Value};
use std::collections::BTreeMap;

#[derive(Clone)]
struct Step {
    prior_type: Type,
    upgrade: UpgradeFn,
}

/// Single-step upgraders keyed by the version they upgrade from.
#[derive(Clone, Default)]
pub struct UpgradeChain {
    steps: BTreeMap<i64, Step>,
}

impl UpgradeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state_upgraders(upgraders: BTreeMap<i64, StateUpgrader>) -> Self {
        Self {
            steps: upgraders
                .into_iter()
                .map(|(version, u)| {
                    (
                        version,
                        Step {
                            prior_type: u.prior_schema.ty(),
                            upgrade: u.upgrade,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn from_identity_upgraders(upgraders: BTreeMap<i64, IdentityUpgrader>) -> Self {
        Self {
            steps: upgraders
                .into_iter()
                .map(|(version, u)| {
                    (
                        version,
                        Step {
                            prior_type: u.prior_schema.ty(),
                            upgrade: u.upgrade,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Registers the step from `version` to `version + 1`.
    pub fn step<F>(mut self, version: i64, prior_type: Type, upgrade: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Diagnostics> + Send + Sync + 'static,
    {
        self.steps.insert(
            version,
            Step {
                prior_type,
                upgrade: std::sync::Arc::new(upgrade),
            },
        );
        self
    }

    /// Runs the steps `from, from + 1, .., to - 1` over an already decoded
    /// value.
    pub fn run(&self, value: Value, from: i64, to: i64) -> Result<Value, Diagnostics> {
        let mut value = value;
        for version in from..to {
            let step = self.steps.get(&version).ok_or_else(|| missing_step(version))?;
            value = (step.upgrade)(value)?;
        }
        Ok(value)
    }

    /// Decodes a stored value written at `version` and upgrades it to
    /// `current`, checking the result against `current_type`.
    pub fn upgrade(
        &self,
        raw: &RawState,
        version: i64,
        current: i64,
        current_type: &Type,
    ) -> Result<Value, Diagnostics> {
        let options = JsonOptions {
            ignore_undefined_attributes: true,
        };
        if version > current {
            return Err(Diagnostics::from(Diagnostic::error(
                "Unable to Upgrade Resource State",
                format!(
                    "The stored value is at version {} which is newer than the schema version {}. This usually means the state was written by a newer provider.",
                    version, current
                ),
            )));
        }
        if version == current {
            return raw
                .decode(current_type, options)
                .map_err(|e| Diagnostics::from(e.into_diagnostic()));
        }

        let step = self.steps.get(&version).ok_or_else(|| missing_step(version))?;
        let prior = raw
            .decode(&step.prior_type, options)
            .map_err(|e| Diagnostics::from(e.into_diagnostic()))?;
        let upgraded = self.run(prior, version, current)?;
        if !upgraded.conforms_to(current_type) {
            return Err(Diagnostics::from(Diagnostic::error(
                "Invalid Upgraded State",
                format!(
                    "Upgrading from version {} produced a value of type {} where the schema requires {}.",
                    version,
                    upgraded.ty(),
                    current_type
                ),
            )));
        }
        Ok(upgraded)
    }
}

fn missing_step(version: i64) -> Diagnostics {
    Diagnostics::from(Diagnostic::error(
        "Missing State Upgrader",
        format!(
            "No upgrader is registered for version {}. Every version between the stored and the current one needs a step.",
            version
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> UpgradeChain {
        UpgradeChain::new()
            .step(0, Type::object([("name", Type::String)]), |v| {
                let name = v.get_attr("name").cloned().unwrap_or(Value::null(Type::String));
                Ok(Value::object([("full_name", name)]))
            })
            .step(1, Type::object([("full_name", Type::String)]), |v| {
                Ok(v.with_attr("enabled", Value::from(true)))
            })
    }

    fn current_type() -> Type {
        Type::object([("full_name", Type::String), ("enabled", Type::Bool)])
    }

    #[test]
    fn upgrades_through_every_step() {
        let raw = RawState::from_json(br#"{"name":"jdoe","legacy":1}"#.to_vec());
        let value = chain().upgrade(&raw, 0, 2, &current_type()).unwrap();
        assert_eq!(value.get_attr("full_name"), Some(&Value::from("jdoe")));
        assert_eq!(value.get_attr("enabled"), Some(&Value::from(true)));
    }

    #[test]
    fn current_version_is_decoded_directly() {
        let raw = RawState::from_json(br#"{"full_name":"jdoe","enabled":false}"#.to_vec());
        let value = chain().upgrade(&raw, 2, 2, &current_type()).unwrap();
        assert_eq!(value.get_attr("enabled"), Some(&Value::from(false)));
    }

    #[test]
    fn newer_state_is_rejected() {
        let raw = RawState::from_json(b"{}".to_vec());
        let diagnostics = chain().upgrade(&raw, 3, 2, &current_type()).unwrap_err();
        assert_eq!(
            diagnostics.errors().next().map(|d| d.summary.as_str()),
            Some("Unable to Upgrade Resource State")
        );
    }

    #[test]
    fn gap_in_chain_is_reported() {
        let raw = RawState::from_json(br#"{"full_name":"jdoe"}"#.to_vec());
        let chain = UpgradeChain::new().step(0, Type::object([("name", Type::String)]), Ok);
        let diagnostics = chain.upgrade(&raw, 0, 2, &current_type()).unwrap_err();
        assert_eq!(
            diagnostics.errors().next().map(|d| d.summary.as_str()),
            Some("Missing State Upgrader")
        );
    }

    #[test]
    fn result_must_match_current_schema() {
        let raw = RawState::from_json(br#"{"name":"jdoe"}"#.to_vec());
        let chain = UpgradeChain::new()
            .step(0, Type::object([("name", Type::String)]), Ok)
            .step(1, Type::object([("name", Type::String)]), Ok);
        let diagnostics = chain.upgrade(&raw, 0, 2, &current_type()).unwrap_err();
        assert_eq!(
            diagnostics.errors().next().map(|d| d.summary.as_str()),
            Some("Invalid Upgraded State")
        );
    }
}
