use super::{schema_result, validate_config};
use crate::context::Context;
use crate::error::Result;
use crate::lowlevel::{ConfigureRequest, ConfigureResponse, ProviderHandler};
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderMetaSchemaRequest, ProviderMetadataRequest,
    ProviderSchemaRequest, ValidateProviderConfigRequest,
};
use crate::schema::Schema;
use crate::types::{Diagnostics, ServerCapabilities};
use crate::value::Value;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

/// Provider-level handler over a framework provider.
pub(super) struct ProviderAdapter {
    provider: RwLock<Box<dyn Provider>>,
    schema: Schema,
    meta_schema: Option<Schema>,
    capabilities: ServerCapabilities,
}

impl ProviderAdapter {
    pub(super) async fn new<P: Provider + 'static>(ctx: &Context, provider: P) -> Result<Self> {
        let metadata = provider
            .metadata(ctx.clone(), ProviderMetadataRequest)
            .await;
        let response = provider.schema(ctx.clone(), ProviderSchemaRequest).await;
        let schema = schema_result(&metadata.type_name, response.schema, response.diagnostics)?;
        let meta = provider
            .meta_schema(ctx.clone(), ProviderMetaSchemaRequest)
            .await;
        let meta_schema = match meta.schema {
            Some(s) => Some(schema_result("provider_meta", s, meta.diagnostics)?),
            None => None,
        };
        Ok(Self {
            provider: RwLock::new(Box::new(provider)),
            schema,
            meta_schema,
            capabilities: metadata.server_capabilities,
        })
    }
}

#[async_trait]
impl ProviderHandler for ProviderAdapter {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn meta_schema(&self) -> Option<Schema> {
        self.meta_schema.clone()
    }

    fn server_capabilities(&self) -> ServerCapabilities {
        self.capabilities
    }

    async fn validate(&self, ctx: &Context, config: &Value) -> Diagnostics {
        let mut diagnostics = validate_config(&self.schema, config, &[]);
        let provider = self.provider.read().await;
        let response = provider
            .validate(
                ctx.clone(),
                ValidateProviderConfigRequest {
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    async fn configure(&self, ctx: &Context, request: ConfigureRequest) -> ConfigureResponse {
        let mut provider = self.provider.write().await;
        info!(provider = %provider.type_name(), "configuring framework provider");
        let response = provider
            .configure(
                ctx.clone(),
                ConfigureProviderRequest {
                    terraform_version: request.terraform_version,
                    config: request.config,
                    client_capabilities: request.client_capabilities,
                },
            )
            .await;
        ConfigureResponse {
            diagnostics: response.diagnostics,
            provider_data: response.provider_data,
            deferred: response.deferred,
        }
    }
}
