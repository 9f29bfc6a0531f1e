//! Default value providers for attributes
//!
//! Defaults run during planning for computed attributes whose configuration
//! value is null, before plan modifiers see the planned value.
//!
//! ```ignore
//! let timeout = AttributeBuilder::new("timeout", Type::Number)
//!     .optional()
//!     .computed()
//!     .default(StaticDefault::number(30))
//!     .build();
//! ```

use crate::schema::{AttributeDefault, DefaultRequest, DefaultResponse};
use crate::types::Diagnostics;
use crate::value::{number, Type, Value};
use std::env;
use std::sync::Arc;
use uuid::Uuid;

/// StaticDefault provides a fixed value
pub struct StaticDefault {
    value: Value,
}

impl StaticDefault {
    pub fn create(value: Value) -> Arc<dyn AttributeDefault> {
        Arc::new(Self { value })
    }

    pub fn string(value: &str) -> Arc<dyn AttributeDefault> {
        Self::create(Value::from(value))
    }

    pub fn number(value: i64) -> Arc<dyn AttributeDefault> {
        Self::create(Value::from(value))
    }

    pub fn bool(value: bool) -> Arc<dyn AttributeDefault> {
        Self::create(Value::from(value))
    }
}

impl AttributeDefault for StaticDefault {
    fn description(&self) -> String {
        format!("value defaults to {}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: self.value.clone(),
            diagnostics: Diagnostics::new(),
        }
    }
}

/// EnvDefault reads the default from an environment variable, parsed into
/// the attribute's type
pub struct EnvDefault {
    env_var: String,
    fallback: Option<String>,
}

impl EnvDefault {
    pub fn create(env_var: &str, fallback: &str) -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            env_var: env_var.to_string(),
            fallback: Some(fallback.to_string()),
        })
    }

    /// Without a fallback an unset variable leaves the attribute null
    pub fn create_required(env_var: &str) -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            env_var: env_var.to_string(),
            fallback: None,
        })
    }
}

impl AttributeDefault for EnvDefault {
    fn description(&self) -> String {
        match &self.fallback {
            Some(fallback) => format!(
                "value defaults to environment variable {} (fallback: {})",
                self.env_var, fallback
            ),
            None => format!("value defaults to environment variable {}", self.env_var),
        }
    }

    fn default_value(&self, request: DefaultRequest) -> DefaultResponse {
        let mut diagnostics = Diagnostics::new();
        let raw = env::var(&self.env_var).ok().or_else(|| self.fallback.clone());
        let value = match raw {
            None => Value::null(request.ty.clone()),
            Some(raw) => match &request.ty {
                Type::String => Value::String(raw),
                Type::Number => match number::parse(&raw) {
                    Ok(n) => Value::Number(n),
                    Err(e) => {
                        diagnostics.add_attribute_error(
                            request.path.clone(),
                            "Invalid Default Value",
                            format!("{} is not a number: {}", self.env_var, e),
                        );
                        Value::null(Type::Number)
                    }
                },
                Type::Bool => match raw.as_str() {
                    "true" | "1" => Value::Bool(true),
                    "false" | "0" => Value::Bool(false),
                    other => {
                        diagnostics.add_attribute_error(
                            request.path.clone(),
                            "Invalid Default Value",
                            format!("{} is not a boolean: {:?}", self.env_var, other),
                        );
                        Value::null(Type::Bool)
                    }
                },
                other => {
                    diagnostics.add_attribute_error(
                        request.path.clone(),
                        "Invalid Default Value",
                        format!("environment defaults cannot produce {}", other),
                    );
                    Value::null(other.clone())
                }
            },
        };
        DefaultResponse { value, diagnostics }
    }
}

/// Format for timestamp output
#[derive(Debug, Clone, Copy)]
pub enum TimestampFormat {
    UnixSeconds,
    UnixMilliseconds,
    Rfc3339,
}

/// CurrentTimestampDefault provides the planning time as a default value
pub struct CurrentTimestampDefault {
    format: TimestampFormat,
}

impl CurrentTimestampDefault {
    pub fn unix_seconds() -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            format: TimestampFormat::UnixSeconds,
        })
    }

    pub fn unix_milliseconds() -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            format: TimestampFormat::UnixMilliseconds,
        })
    }

    pub fn rfc3339() -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            format: TimestampFormat::Rfc3339,
        })
    }
}

impl AttributeDefault for CurrentTimestampDefault {
    fn description(&self) -> String {
        let format_desc = match self.format {
            TimestampFormat::UnixSeconds => "Unix seconds",
            TimestampFormat::UnixMilliseconds => "Unix milliseconds",
            TimestampFormat::Rfc3339 => "RFC 3339",
        };
        format!("current timestamp in {} format", format_desc)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        let now = chrono::Utc::now();
        let value = match self.format {
            TimestampFormat::UnixSeconds => Value::from(now.timestamp()),
            TimestampFormat::UnixMilliseconds => Value::from(now.timestamp_millis()),
            TimestampFormat::Rfc3339 => {
                Value::from(now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            }
        };
        DefaultResponse {
            value,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Format for UUID output
#[derive(Debug, Clone, Copy)]
pub enum UuidFormat {
    Hyphenated,
    Simple,
}

/// UuidDefault generates a random UUID
pub struct UuidDefault {
    format: UuidFormat,
}

impl UuidDefault {
    pub fn hyphenated() -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            format: UuidFormat::Hyphenated,
        })
    }

    pub fn simple() -> Arc<dyn AttributeDefault> {
        Arc::new(Self {
            format: UuidFormat::Simple,
        })
    }
}

impl AttributeDefault for UuidDefault {
    fn description(&self) -> String {
        match self.format {
            UuidFormat::Hyphenated => "generated UUID in hyphenated format".to_string(),
            UuidFormat::Simple => "generated UUID in simple format".to_string(),
        }
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        let uuid = Uuid::new_v4();
        let value = match self.format {
            UuidFormat::Hyphenated => Value::from(uuid.to_string()),
            UuidFormat::Simple => Value::from(uuid.simple().to_string()),
        };
        DefaultResponse {
            value,
            diagnostics: Diagnostics::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;
    use serial_test::serial;

    fn request(ty: Type) -> DefaultRequest {
        DefaultRequest {
            path: AttributePath::new("field"),
            ty,
        }
    }

    #[test]
    fn static_default_returns_value() {
        let response = StaticDefault::number(30).default_value(request(Type::Number));
        assert_eq!(response.value, Value::from(30));
    }

    #[test]
    #[serial]
    fn env_default_parses_into_attribute_type() {
        env::set_var("PLUGKIT_TEST_PORT", "8080");
        let response =
            EnvDefault::create("PLUGKIT_TEST_PORT", "80").default_value(request(Type::Number));
        env::remove_var("PLUGKIT_TEST_PORT");

        assert_eq!(response.value, Value::from(8080));
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    #[serial]
    fn env_default_uses_fallback_then_null() {
        env::remove_var("PLUGKIT_TEST_UNSET");

        let with_fallback =
            EnvDefault::create("PLUGKIT_TEST_UNSET", "true").default_value(request(Type::Bool));
        assert_eq!(with_fallback.value, Value::from(true));

        let without = EnvDefault::create_required("PLUGKIT_TEST_UNSET")
            .default_value(request(Type::String));
        assert_eq!(without.value, Value::null(Type::String));
    }

    #[test]
    #[serial]
    fn env_default_reports_unparseable_number() {
        env::set_var("PLUGKIT_TEST_BAD", "eighty");
        let response =
            EnvDefault::create_required("PLUGKIT_TEST_BAD").default_value(request(Type::Number));
        env::remove_var("PLUGKIT_TEST_BAD");

        assert!(response.diagnostics.has_errors());
    }

    #[test]
    fn timestamp_default_is_rfc3339() {
        let response = CurrentTimestampDefault::rfc3339().default_value(request(Type::String));
        let text = response.value.as_str().unwrap().to_string();
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
    }

    #[test]
    fn uuid_defaults_are_unique() {
        let a = UuidDefault::hyphenated().default_value(request(Type::String)).value;
        let b = UuidDefault::hyphenated().default_value(request(Type::String)).value;
        assert_ne!(a, b);
        assert_eq!(a.as_str().unwrap().len(), 36);
        let simple = UuidDefault::simple().default_value(request(Type::String)).value;
        assert_eq!(simple.as_str().unwrap().len(), 32);
    }
}
