//! Plan and apply consistency checks
//!
//! The engine holds providers to two rules: a plan must keep every
//! non-computed configured value, and an applied state must match every
//! known planned value. Both checks honor attribute semantic equality.

use crate::schema::{Schema, ValueAdapter};
use crate::semantic::values_equal;
use crate::types::{AttributePath, AttributePathStep, Diagnostic, Diagnostics};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Checks an applied state against its plan.
pub fn check_apply(
    type_name: &str,
    schema: &Schema,
    planned: &Value,
    applied: &Value,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    if planned.is_null() {
        if !applied.is_null() {
            diagnostics.push(inconsistent(
                type_name,
                "Root object was planned for deletion but is present after apply.",
            ));
        }
        return diagnostics;
    }
    if applied.is_null() {
        diagnostics.push(inconsistent(
            type_name,
            "Root object was present, but now absent.",
        ));
        return diagnostics;
    }

    let adapters = adapters(schema, planned);
    compare(
        type_name,
        &adapters,
        planned,
        applied,
        &AttributePath::root(),
        &mut diagnostics,
    );
    diagnostics
}

/// Checks that a plan preserves configuration for non-computed attributes.
pub fn check_plan(type_name: &str, schema: &Schema, config: &Value, planned: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    if planned.is_null() || config.is_null() {
        return diagnostics;
    }
    schema.walk(config, &mut |path, attr, config_value| {
        if attr.computed || attr.write_only || attr.nested_type.is_some() {
            return;
        }
        let Some(planned_value) = planned.get_path(path) else {
            return;
        };
        if config_value.is_unknown() && planned_value.is_unknown() {
            return;
        }
        if !values_equal(attr.semantic.as_ref(), config_value, planned_value) {
            diagnostics.push(
                Diagnostic::error(
                    "Provider produced invalid plan",
                    format!(
                        "Provider produced an invalid planned new state for {}: planned value {} for a non-computed attribute does not match config value {}.",
                        type_name, planned_value, config_value
                    ),
                )
                .with_attribute(path.clone()),
            );
        }
    });
    diagnostics
}

fn adapters(schema: &Schema, value: &Value) -> BTreeMap<AttributePath, Arc<dyn ValueAdapter>> {
    let mut adapters = BTreeMap::new();
    schema.walk(value, &mut |path, attr, _| {
        if let Some(adapter) = &attr.semantic {
            adapters.insert(path.clone(), Arc::clone(adapter));
        }
    });
    adapters
}

fn inconsistent(type_name: &str, detail: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(
        "Provider produced inconsistent result after apply",
        format!(
            "When applying changes to {}, provider produced an unexpected new value: {}",
            type_name, detail
        ),
    )
}

fn compare(
    type_name: &str,
    adapters: &BTreeMap<AttributePath, Arc<dyn ValueAdapter>>,
    planned: &Value,
    applied: &Value,
    path: &AttributePath,
    diagnostics: &mut Diagnostics,
) {
    if !applied.is_wholly_known() {
        diagnostics.push(
            inconsistent(type_name, format!("{}: was known, but now unknown.", path))
                .with_attribute(path.clone()),
        );
        return;
    }

    if let Value::Unknown(ty) = planned {
        if !applied.conforms_to(ty) {
            diagnostics.push(
                inconsistent(
                    type_name,
                    format!("{}: wrong final value type: expected {}.", path, ty),
                )
                .with_attribute(path.clone()),
            );
        }
        return;
    }

    if let Some(adapter) = adapters.get(path) {
        if values_equal(Some(adapter), planned, applied) {
            return;
        }
    }

    match (planned, applied) {
        (Value::Object(p), Value::Object(a)) => {
            for (name, planned_attr) in p {
                let Some(applied_attr) = a.get(name) else {
                    diagnostics.push(inconsistent(
                        type_name,
                        format!("{}: attribute {:?} is missing.", path, name),
                    ));
                    continue;
                };
                let child = path.with_step(AttributePathStep::AttributeName(name.clone()));
                compare(type_name, adapters, planned_attr, applied_attr, &child, diagnostics);
            }
        }
        (Value::List(_, p), Value::List(_, a)) | (Value::Tuple(p), Value::Tuple(a))
            if p.len() == a.len() =>
        {
            for (i, (pv, av)) in p.iter().zip(a).enumerate() {
                let child = path.with_step(AttributePathStep::ElementKeyInt(i as i64));
                compare(type_name, adapters, pv, av, &child, diagnostics);
            }
        }
        (Value::Map(_, p), Value::Map(_, a)) if p.len() == a.len() => {
            for (key, pv) in p {
                let child = path.with_step(AttributePathStep::ElementKeyString(key.clone()));
                match a.get(key) {
                    Some(av) => compare(type_name, adapters, pv, av, &child, diagnostics),
                    None => diagnostics.push(
                        inconsistent(type_name, format!("{}: element was removed.", child))
                            .with_attribute(child.clone()),
                    ),
                }
            }
        }
        // Set elements have no identity while any member is unknown.
        (Value::Set(_, p), Value::Set(..)) if !p.iter().all(Value::is_wholly_known) => {}
        _ => {
            if planned != applied {
                let detail = if path.is_root() {
                    format!("was {}, but now {}.", planned, applied)
                } else {
                    format!("{}: was {}, but now {}.", path, planned, applied)
                };
                let diagnostic = inconsistent(type_name, detail);
                diagnostics.push(if path.is_root() {
                    diagnostic
                } else {
                    diagnostic.with_attribute(path.clone())
                });
            }
        }
    }
}
