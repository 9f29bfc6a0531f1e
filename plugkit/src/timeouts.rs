//! Per-operation timeouts declared in configuration
//!
//! ```ignore
//! timeouts {
//!   create = "30s"
//!   delete = "1h30m"
//! }
//! ```
//!
//! Durations use Go's syntax: a sequence of decimal numbers, each with a
//! unit suffix (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`).

use crate::error::{PlugkitError, Result};
use crate::schema::{AttributeBuilder, Block, NestedBlock, NestingMode};
use crate::types::{AttributePath, Diagnostics};
use crate::value::{Type, Value};
use std::time::Duration;

pub const TIMEOUTS_BLOCK: &str = "timeouts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl TimeoutOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutOperation::Create => "create",
            TimeoutOperation::Read => "read",
            TimeoutOperation::Update => "update",
            TimeoutOperation::Delete => "delete",
        }
    }
}

/// Builds the `timeouts` block for a resource schema.
pub fn block(operations: &[TimeoutOperation]) -> NestedBlock {
    let attributes = operations
        .iter()
        .map(|op| {
            AttributeBuilder::new(op.as_str(), Type::String)
                .optional()
                .description(&format!(
                    "A duration string for the {} operation, such as \"30s\" or \"2h45m\".",
                    op.as_str()
                ))
                .build()
        })
        .collect();
    NestedBlock::new(
        TIMEOUTS_BLOCK,
        NestingMode::Single,
        Block {
            attributes,
            ..Default::default()
        },
    )
}

/// Timeouts read from a resource value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl Timeouts {
    /// Reads the `timeouts` block from a resource object. A missing, null or
    /// unknown block yields no timeouts.
    pub fn from_value(value: &Value) -> std::result::Result<Self, Diagnostics> {
        let mut timeouts = Timeouts::default();
        let mut diagnostics = Diagnostics::new();
        let Some(block @ Value::Object(_)) = value.get_attr(TIMEOUTS_BLOCK) else {
            return Ok(timeouts);
        };
        for op in [
            TimeoutOperation::Create,
            TimeoutOperation::Read,
            TimeoutOperation::Update,
            TimeoutOperation::Delete,
        ] {
            let Some(raw) = block.get_attr(op.as_str()).and_then(Value::as_str) else {
                continue;
            };
            match parse_duration(raw) {
                Ok(d) => *timeouts.slot(op) = Some(d),
                Err(e) => diagnostics.add_attribute_error(
                    AttributePath::new(TIMEOUTS_BLOCK).attribute(op.as_str()),
                    "Invalid Timeout Value",
                    e.to_string(),
                ),
            }
        }
        if diagnostics.has_errors() {
            Err(diagnostics)
        } else {
            Ok(timeouts)
        }
    }

    pub fn get(&self, op: TimeoutOperation) -> Option<Duration> {
        match op {
            TimeoutOperation::Create => self.create,
            TimeoutOperation::Read => self.read,
            TimeoutOperation::Update => self.update,
            TimeoutOperation::Delete => self.delete,
        }
    }

    fn slot(&mut self, op: TimeoutOperation) -> &mut Option<Duration> {
        match op {
            TimeoutOperation::Create => &mut self.create,
            TimeoutOperation::Read => &mut self.read,
            TimeoutOperation::Update => &mut self.update,
            TimeoutOperation::Delete => &mut self.delete,
        }
    }
}

/// Parses a Go duration string. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || PlugkitError::Custom(format!("invalid duration {:?}", input));
    let s = input.strip_prefix('+').unwrap_or(input);
    if s.starts_with('-') {
        return Err(PlugkitError::Custom(format!(
            "negative duration {:?} is not allowed",
            input
        )));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| PlugkitError::Custom(format!("missing unit in duration {:?}", input)))?;
        if number_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => {
                return Err(PlugkitError::Custom(format!(
                    "unknown unit {:?} in duration {:?}",
                    unit, input
                )))
            }
        };
        rest = &rest[unit_len..];
        total_nanos += number * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
