//! Typed framework runtime
//!
//! Bridges a [`Provider`] and its factories onto a [`LowLevelServer`].
//! Schemas are read once when the server is built; every request then gets
//! a fresh instance from its factory, configured with the provider data
//! captured by ConfigureProvider.
//!
//! ```ignore
//! let server = framework::server(CornerProvider::default()).await?;
//! serve(Arc::new(server), ServeConfig::default()).await?;
//! ```

mod action;
mod data_source;
mod ephemeral;
mod function;
mod provider;
mod resource;
pub mod upgrade;

pub use upgrade::UpgradeChain;

use crate::context::Context;
use crate::error::{PlugkitError, Result};
use crate::lowlevel::LowLevelServer;
use crate::provider::Provider;
use crate::schema::Schema;
use crate::types::{Diagnostics, PrivateStateData};
use crate::validator::ConfigValidator;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

use self::action::ActionAdapter;
use self::data_source::DataSourceAdapter;
use self::ephemeral::EphemeralAdapter;
use self::function::FunctionAdapter;
use self::provider::ProviderAdapter;
use self::resource::ResourceAdapter;

/// Builds a low-level server for a framework provider.
///
/// Fails when a schema method reports errors or a factory produces an
/// instance whose type name differs from its key.
pub async fn server<P: Provider + 'static>(provider: P) -> Result<LowLevelServer> {
    let ctx = Context::new();
    let resources = provider.resources();
    let data_sources = provider.data_sources();
    let ephemeral_resources = provider.ephemeral_resources();
    let functions = provider.functions();
    let actions = provider.actions();

    let adapter = ProviderAdapter::new(&ctx, provider).await?;
    let mut server = LowLevelServer::new(Arc::new(adapter));

    for (name, factory) in resources {
        debug!(type_name = %name, "registering resource");
        let adapter = ResourceAdapter::new(&ctx, &name, factory).await?;
        server = server.resource(&name, Arc::new(adapter));
    }
    for (name, factory) in data_sources {
        debug!(type_name = %name, "registering data source");
        let adapter = DataSourceAdapter::new(&ctx, &name, factory).await?;
        server = server.data_source(&name, Arc::new(adapter));
    }
    for (name, factory) in ephemeral_resources {
        debug!(type_name = %name, "registering ephemeral resource");
        let adapter = EphemeralAdapter::new(&ctx, &name, factory).await?;
        server = server.ephemeral_resource(&name, Arc::new(adapter));
    }
    for (name, factory) in functions {
        debug!(function = %name, "registering function");
        let adapter = FunctionAdapter::new(&ctx, &name, factory).await;
        server = server.function(&name, Arc::new(adapter));
    }
    for (name, factory) in actions {
        debug!(type_name = %name, "registering action");
        let adapter = ActionAdapter::new(&ctx, &name, factory).await?;
        server = server.action(&name, Arc::new(adapter));
    }
    Ok(server)
}

/// Turns the diagnostics of a schema method into a startup failure.
fn schema_result(type_name: &str, schema: Schema, diagnostics: Diagnostics) -> Result<Schema> {
    if diagnostics.has_errors() {
        let details: Vec<String> = diagnostics
            .errors()
            .map(|d| format!("{}: {}", d.summary, d.detail))
            .collect();
        return Err(PlugkitError::SchemaInvalid(format!(
            "{}: {}",
            type_name,
            details.join("; ")
        )));
    }
    Ok(schema)
}

fn check_type_name(key: &str, actual: &str) -> Result<()> {
    if key != actual {
        return Err(PlugkitError::SchemaInvalid(format!(
            "factory registered as {} produces {}",
            key, actual
        )));
    }
    Ok(())
}

pub(crate) fn decode_private(bytes: &[u8], diagnostics: &mut Diagnostics) -> PrivateStateData {
    PrivateStateData::decode(bytes).unwrap_or_else(|e| {
        diagnostics.add_error("Unable to Read Private State", e.to_string());
        PrivateStateData::new()
    })
}

pub(crate) fn encode_private(private: &PrivateStateData, diagnostics: &mut Diagnostics) -> Vec<u8> {
    private.encode().unwrap_or_else(|e| {
        diagnostics.add_error("Unable to Write Private State", e.to_string());
        Vec::new()
    })
}

/// Runs attribute validators, value adapters and whole-configuration
/// validators against a configuration.
pub(crate) fn validate_config(
    schema: &Schema,
    config: &Value,
    validators: &[Arc<dyn ConfigValidator>],
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    if config.is_null() {
        return diagnostics;
    }
    schema.walk(config, &mut |path, attr, value| {
        if value.is_null() || value.is_unknown() {
            return;
        }
        for validator in &attr.validators {
            let response = validator.validate(crate::schema::ValidatorRequest {
                config_value: value.clone(),
                path: path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
        if let Some(adapter) = &attr.semantic {
            if value.is_wholly_known() {
                diagnostics.extend(adapter.validate(value, path));
            }
        }
    });
    for validator in validators {
        diagnostics.extend(validator.validate(config));
    }
    diagnostics
}
