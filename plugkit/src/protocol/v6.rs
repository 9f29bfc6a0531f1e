//! Protocol version 6

use super::*;
use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;

pub const PROTOCOL_VERSION: u8 = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateProviderConfigRequest {
    pub config: DynamicValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateProviderConfigResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateResourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateResourceConfigResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateDataResourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateDataResourceConfigResponse {
    pub diagnostics: Diagnostics,
}

/// The full protocol 6 RPC surface.
///
/// An `Err` is a protocol-level failure, the equivalent of an RPC status
/// error. Everything recoverable is reported through response diagnostics.
#[async_trait]
pub trait ProviderServer: Send + Sync {
    async fn get_metadata(
        &self,
        ctx: Context,
        request: GetMetadataRequest,
    ) -> Result<GetMetadataResponse>;

    async fn get_provider_schema(
        &self,
        ctx: Context,
        request: GetProviderSchemaRequest,
    ) -> Result<GetProviderSchemaResponse>;

    async fn get_resource_identity_schemas(
        &self,
        ctx: Context,
        request: GetResourceIdentitySchemasRequest,
    ) -> Result<GetResourceIdentitySchemasResponse>;

    async fn validate_provider_config(
        &self,
        ctx: Context,
        request: ValidateProviderConfigRequest,
    ) -> Result<ValidateProviderConfigResponse>;

    async fn configure_provider(
        &self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> Result<ConfigureProviderResponse>;

    async fn stop_provider(
        &self,
        ctx: Context,
        request: StopProviderRequest,
    ) -> Result<StopProviderResponse>;

    async fn validate_resource_config(
        &self,
        ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> Result<ValidateResourceConfigResponse>;

    async fn upgrade_resource_state(
        &self,
        ctx: Context,
        request: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse>;

    async fn upgrade_resource_identity(
        &self,
        ctx: Context,
        request: UpgradeResourceIdentityRequest,
    ) -> Result<UpgradeResourceIdentityResponse>;

    async fn read_resource(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse>;

    async fn plan_resource_change(
        &self,
        ctx: Context,
        request: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse>;

    async fn apply_resource_change(
        &self,
        ctx: Context,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse>;

    async fn import_resource_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse>;

    async fn move_resource_state(
        &self,
        ctx: Context,
        request: MoveResourceStateRequest,
    ) -> Result<MoveResourceStateResponse>;

    async fn validate_data_resource_config(
        &self,
        ctx: Context,
        request: ValidateDataResourceConfigRequest,
    ) -> Result<ValidateDataResourceConfigResponse>;

    async fn read_data_source(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse>;

    async fn validate_ephemeral_resource_config(
        &self,
        ctx: Context,
        request: ValidateEphemeralResourceConfigRequest,
    ) -> Result<ValidateEphemeralResourceConfigResponse>;

    async fn open_ephemeral_resource(
        &self,
        ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> Result<OpenEphemeralResourceResponse>;

    async fn renew_ephemeral_resource(
        &self,
        ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> Result<RenewEphemeralResourceResponse>;

    async fn close_ephemeral_resource(
        &self,
        ctx: Context,
        request: CloseEphemeralResourceRequest,
    ) -> Result<CloseEphemeralResourceResponse>;

    async fn get_functions(
        &self,
        ctx: Context,
        request: GetFunctionsRequest,
    ) -> Result<GetFunctionsResponse>;

    async fn call_function(
        &self,
        ctx: Context,
        request: CallFunctionRequest,
    ) -> Result<CallFunctionResponse>;

    async fn validate_action_config(
        &self,
        ctx: Context,
        request: ValidateActionConfigRequest,
    ) -> Result<ValidateActionConfigResponse>;

    async fn plan_action(
        &self,
        ctx: Context,
        request: PlanActionRequest,
    ) -> Result<PlanActionResponse>;

    async fn invoke_action(
        &self,
        ctx: Context,
        request: InvokeActionRequest,
    ) -> Result<InvokeActionResponse>;
}
