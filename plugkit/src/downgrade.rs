//! Serving a protocol 6 server to protocol 5 clients
//!
//! Most messages are shared between the versions and pass through. The
//! provider configuration RPCs are renamed, and schemas that use nested
//! attribute types cannot be expressed in protocol 5 at all.

use crate::context::Context;
use crate::error::Result;
use crate::protocol::v5;
use crate::protocol::v6;
use crate::protocol::*;
use crate::schema::Block;
use crate::types::AttributePath;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Protocol 5 server wrapping a protocol 6 one.
pub struct DowngradeServer {
    inner: Arc<dyn v6::ProviderServer>,
}

impl DowngradeServer {
    pub fn new(inner: Arc<dyn v6::ProviderServer>) -> Self {
        Self { inner }
    }
}

/// Paths of attributes that carry nested attribute types.
fn nested_attributes(block: &Block, path: &AttributePath, found: &mut Vec<AttributePath>) {
    for attr in &block.attributes {
        if attr.nested_type.is_some() {
            found.push(path.clone().attribute(&attr.name));
        }
    }
    for nested in &block.block_types {
        nested_attributes(&nested.block, &path.clone().attribute(&nested.type_name), found);
    }
}

#[async_trait]
impl v5::ProviderServer for DowngradeServer {
    async fn get_metadata(
        &self,
        ctx: Context,
        request: GetMetadataRequest,
    ) -> Result<GetMetadataResponse> {
        self.inner.get_metadata(ctx, request).await
    }

    async fn get_schema(
        &self,
        ctx: Context,
        request: GetProviderSchemaRequest,
    ) -> Result<GetProviderSchemaResponse> {
        debug!(rpc = "GetSchema", "downgrading provider schema");
        let mut response = self.inner.get_provider_schema(ctx, request).await?;
        let mut unsupported = Vec::new();
        for (label, schema) in response.all_schemas() {
            let mut found = Vec::new();
            nested_attributes(&schema.block, &AttributePath::root(), &mut found);
            unsupported.extend(found.into_iter().map(|path| (label.clone(), path)));
        }
        for (label, path) in unsupported {
            warn!(schema = %label, attribute = %path, "nested attribute type in protocol 5 schema");
            response.diagnostics.add_attribute_error(
                path.clone(),
                "Unsupported Nested Attribute",
                format!(
                    "{} declares nested attribute {}, which protocol version 5 cannot represent. Use a nested block or serve the provider over protocol version 6.",
                    label, path
                ),
            );
        }
        Ok(response)
    }

    async fn get_resource_identity_schemas(
        &self,
        ctx: Context,
        request: GetResourceIdentitySchemasRequest,
    ) -> Result<GetResourceIdentitySchemasResponse> {
        self.inner.get_resource_identity_schemas(ctx, request).await
    }

    async fn prepare_provider_config(
        &self,
        ctx: Context,
        request: v5::PrepareProviderConfigRequest,
    ) -> Result<v5::PrepareProviderConfigResponse> {
        let response = self
            .inner
            .validate_provider_config(
                ctx,
                v6::ValidateProviderConfigRequest {
                    config: request.config.clone(),
                },
            )
            .await?;
        let prepared_config = if response.diagnostics.has_errors() {
            None
        } else {
            Some(request.config)
        };
        Ok(v5::PrepareProviderConfigResponse {
            prepared_config,
            diagnostics: response.diagnostics,
        })
    }

    async fn configure(
        &self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> Result<ConfigureProviderResponse> {
        self.inner.configure_provider(ctx, request).await
    }

    async fn stop(&self, ctx: Context, request: StopProviderRequest) -> Result<StopProviderResponse> {
        self.inner.stop_provider(ctx, request).await
    }

    async fn validate_resource_type_config(
        &self,
        ctx: Context,
        request: v5::ValidateResourceTypeConfigRequest,
    ) -> Result<v5::ValidateResourceTypeConfigResponse> {
        let response = self
            .inner
            .validate_resource_config(
                ctx,
                v6::ValidateResourceConfigRequest {
                    type_name: request.type_name,
                    config: request.config,
                    client_capabilities: request.client_capabilities,
                },
            )
            .await?;
        Ok(v5::ValidateResourceTypeConfigResponse {
            diagnostics: response.diagnostics,
        })
    }

    async fn upgrade_resource_state(
        &self,
        ctx: Context,
        request: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse> {
        self.inner.upgrade_resource_state(ctx, request).await
    }

    async fn upgrade_resource_identity(
        &self,
        ctx: Context,
        request: UpgradeResourceIdentityRequest,
    ) -> Result<UpgradeResourceIdentityResponse> {
        self.inner.upgrade_resource_identity(ctx, request).await
    }

    async fn read_resource(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse> {
        self.inner.read_resource(ctx, request).await
    }

    async fn plan_resource_change(
        &self,
        ctx: Context,
        request: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse> {
        self.inner.plan_resource_change(ctx, request).await
    }

    async fn apply_resource_change(
        &self,
        ctx: Context,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse> {
        self.inner.apply_resource_change(ctx, request).await
    }

    async fn import_resource_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse> {
        self.inner.import_resource_state(ctx, request).await
    }

    async fn move_resource_state(
        &self,
        ctx: Context,
        request: MoveResourceStateRequest,
    ) -> Result<MoveResourceStateResponse> {
        self.inner.move_resource_state(ctx, request).await
    }

    async fn validate_data_source_config(
        &self,
        ctx: Context,
        request: v5::ValidateDataSourceConfigRequest,
    ) -> Result<v5::ValidateDataSourceConfigResponse> {
        let response = self
            .inner
            .validate_data_resource_config(
                ctx,
                v6::ValidateDataResourceConfigRequest {
                    type_name: request.type_name,
                    config: request.config,
                },
            )
            .await?;
        Ok(v5::ValidateDataSourceConfigResponse {
            diagnostics: response.diagnostics,
        })
    }

    async fn read_data_source(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse> {
        self.inner.read_data_source(ctx, request).await
    }

    async fn validate_ephemeral_resource_config(
        &self,
        ctx: Context,
        request: ValidateEphemeralResourceConfigRequest,
    ) -> Result<ValidateEphemeralResourceConfigResponse> {
        self.inner
            .validate_ephemeral_resource_config(ctx, request)
            .await
    }

    async fn open_ephemeral_resource(
        &self,
        ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> Result<OpenEphemeralResourceResponse> {
        self.inner.open_ephemeral_resource(ctx, request).await
    }

    async fn renew_ephemeral_resource(
        &self,
        ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> Result<RenewEphemeralResourceResponse> {
        self.inner.renew_ephemeral_resource(ctx, request).await
    }

    async fn close_ephemeral_resource(
        &self,
        ctx: Context,
        request: CloseEphemeralResourceRequest,
    ) -> Result<CloseEphemeralResourceResponse> {
        self.inner.close_ephemeral_resource(ctx, request).await
    }

    async fn get_functions(
        &self,
        ctx: Context,
        request: GetFunctionsRequest,
    ) -> Result<GetFunctionsResponse> {
        self.inner.get_functions(ctx, request).await
    }

    async fn call_function(
        &self,
        ctx: Context,
        request: CallFunctionRequest,
    ) -> Result<CallFunctionResponse> {
        self.inner.call_function(ctx, request).await
    }

    async fn validate_action_config(
        &self,
        ctx: Context,
        request: ValidateActionConfigRequest,
    ) -> Result<ValidateActionConfigResponse> {
        self.inner.validate_action_config(ctx, request).await
    }

    async fn plan_action(
        &self,
        ctx: Context,
        request: PlanActionRequest,
    ) -> Result<PlanActionResponse> {
        self.inner.plan_action(ctx, request).await
    }

    async fn invoke_action(
        &self,
        ctx: Context,
        request: InvokeActionRequest,
    ) -> Result<InvokeActionResponse> {
        self.inner.invoke_action(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowlevel::{
        ApplyRequest, ApplyResponse, Call, LowLevelServer, ProviderHandler, ResourceHandler,
    };
    use crate::protocol::v5::ProviderServer as _;
    use crate::schema::{
        AttributeBuilder, NestedType, ObjectNestingMode, Schema, SchemaBuilder,
    };
    use crate::types::Diagnostics;
    use crate::value::{Type, Value};

    struct Provider;

    #[async_trait]
    impl ProviderHandler for Provider {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(AttributeBuilder::new("region", Type::String).required().build())
                .build()
        }
    }

    struct Nested;

    #[async_trait]
    impl ResourceHandler for Nested {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::nested(
                        "settings",
                        NestedType::new(
                            ObjectNestingMode::Single,
                            vec![AttributeBuilder::new("mode", Type::String).optional().build()],
                        ),
                    )
                    .optional()
                    .build(),
                )
                .build()
        }

        async fn apply(&self, _call: &Call, request: ApplyRequest) -> ApplyResponse {
            ApplyResponse {
                new_state: request.planned_state,
                private: Vec::new(),
                new_identity: None,
                diagnostics: Diagnostics::new(),
            }
        }
    }

    fn server() -> DowngradeServer {
        DowngradeServer::new(Arc::new(
            LowLevelServer::new(Arc::new(Provider)).resource("tf5_nested", Arc::new(Nested)),
        ))
    }

    #[tokio::test]
    async fn nested_attributes_are_reported() {
        let schema = server()
            .get_schema(Context::new(), GetProviderSchemaRequest {})
            .await
            .unwrap();
        let error = schema.diagnostics.errors().next().unwrap();
        assert_eq!(error.summary, "Unsupported Nested Attribute");
        assert_eq!(error.attribute, Some(AttributePath::new("settings")));
    }

    #[tokio::test]
    async fn prepare_echoes_valid_config() {
        let ty = Provider.schema().ty();
        let config =
            DynamicValue::encode(&Value::object([("region", Value::from("eu"))]), &ty).unwrap();
        let response = server()
            .prepare_provider_config(
                Context::new(),
                v5::PrepareProviderConfigRequest {
                    config: config.clone(),
                },
            )
            .await
            .unwrap();
        assert!(response.diagnostics.is_empty());
        assert_eq!(response.prepared_config, Some(config));
    }
}
