//! Provider trait and related types
//!
//! A provider describes its own configuration and hands out factories for
//! everything it implements. The framework calls each factory per request,
//! then configures the new instance with the data returned by
//! [`Provider::configure`].

use crate::action::Action;
use crate::context::Context;
use crate::data_source::DataSource;
use crate::ephemeral::EphemeralResource;
use crate::function::Function;
use crate::resource::Resource;
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Deferred, Diagnostics, ServerCapabilities};
use crate::value::Value;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub type ResourceFactory = Box<dyn Fn() -> Box<dyn Resource> + Send + Sync>;
pub type DataSourceFactory = Box<dyn Fn() -> Box<dyn DataSource> + Send + Sync>;
pub type EphemeralResourceFactory = Box<dyn Fn() -> Box<dyn EphemeralResource> + Send + Sync>;
pub type FunctionFactory = Box<dyn Fn() -> Box<dyn Function> + Send + Sync>;
pub type ActionFactory = Box<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// Base trait for providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Type name prefix shared by everything the provider implements
    /// (e.g., "corner")
    fn type_name(&self) -> &str;

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: self.type_name().to_string(),
            server_capabilities: ServerCapabilities::all(),
        }
    }

    async fn schema(&self, ctx: Context, request: ProviderSchemaRequest) -> ProviderSchemaResponse;

    async fn meta_schema(
        &self,
        _ctx: Context,
        _request: ProviderMetaSchemaRequest,
    ) -> ProviderMetaSchemaResponse {
        ProviderMetaSchemaResponse {
            schema: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Called before configure with the raw configuration
    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: Diagnostics::new(),
        }
    }

    /// Called once the engine has the provider configuration. Whatever goes
    /// into `provider_data` is handed to every resource, data source,
    /// ephemeral resource and action instance.
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    /// Factories keyed by full type name
    fn resources(&self) -> HashMap<String, ResourceFactory>;

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        HashMap::new()
    }

    fn ephemeral_resources(&self) -> HashMap<String, EphemeralResourceFactory> {
        HashMap::new()
    }

    /// Factories keyed by function name, without the provider prefix
    fn functions(&self) -> HashMap<String, FunctionFactory> {
        HashMap::new()
    }

    fn actions(&self) -> HashMap<String, ActionFactory> {
        HashMap::new()
    }
}

pub struct ProviderMetadataRequest;

pub struct ProviderMetadataResponse {
    pub type_name: String,
    pub server_capabilities: ServerCapabilities,
}

pub struct ProviderSchemaRequest;

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Diagnostics,
}

pub struct ProviderMetaSchemaRequest;

pub struct ProviderMetaSchemaResponse {
    pub schema: Option<Schema>,
    pub diagnostics: Diagnostics,
}

pub struct ValidateProviderConfigRequest {
    pub config: Value,
}

pub struct ValidateProviderConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: Value,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Default)]
pub struct ConfigureProviderResponse {
    pub diagnostics: Diagnostics,
    /// Downcast by resources in their configure method
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
    /// Set when the configuration is not yet known; every resource, data
    /// source and import is then deferred automatically.
    pub deferred: Option<Deferred>,
}
