//! gRPC services for both protocol versions
//!
//! Wraps the typed protocol servers in the services generated from `proto/`.
//! The message conversions are shared between versions; values stay
//! msgpack-encoded [`DynamicValue`](crate::protocol::DynamicValue) envelopes
//! on both sides and are never decoded here.

use crate::context::Context;
use crate::protocol::{self as msg, v5, v6};
use crate::proto::{tfplugin5, tfplugin6};
use crate::schema::{
    Attribute, Block, FunctionDefinition, IdentitySchema, NestedBlock, NestedType, NestingMode,
    ObjectNestingMode, Parameter, Schema,
};
use crate::types::{
    AttributePath, AttributePathStep, ClientCapabilities, Deferred, DeferredReason,
    DiagnosticSeverity, Diagnostics, FunctionError, ServerCapabilities,
};
use crate::value::Type;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::debug;

/// Server-streamed action events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

fn type_bytes(ty: &Type) -> Vec<u8> {
    ty.to_json().to_string().into_bytes()
}

fn non_empty(bytes: Vec<u8>) -> Option<Vec<u8>> {
    (!bytes.is_empty()).then_some(bytes)
}

fn dynamic<T: Into<msg::DynamicValue>>(value: Option<T>) -> msg::DynamicValue {
    value.map(Into::into).unwrap_or_default()
}

fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Conversions for every message both protocol versions share. The invoking
/// module supplies `attribute`, since only version 6 attributes nest.
macro_rules! shared_messages {
    ($pb:ident) => {
        impl From<$pb::DynamicValue> for msg::DynamicValue {
            fn from(value: $pb::DynamicValue) -> Self {
                Self {
                    msgpack: non_empty(value.msgpack),
                    json: non_empty(value.json),
                }
            }
        }

        impl From<msg::DynamicValue> for $pb::DynamicValue {
            fn from(value: msg::DynamicValue) -> Self {
                Self {
                    msgpack: value.msgpack.unwrap_or_default(),
                    json: value.json.unwrap_or_default(),
                }
            }
        }

        pub(super) fn read_identity(identity: Option<$pb::ResourceIdentityData>) -> Option<msg::DynamicValue> {
            identity.and_then(|i| i.identity_data).map(Into::into)
        }

        pub(super) fn wire_identity(identity: Option<msg::DynamicValue>) -> Option<$pb::ResourceIdentityData> {
            identity.map(|data| $pb::ResourceIdentityData {
                identity_data: Some(data.into()),
            })
        }

        pub(super) fn read_raw_state(state: $pb::RawState) -> msg::RawState {
            msg::RawState {
                json: non_empty(state.json),
                flatmap: state.flatmap.into_iter().collect(),
            }
        }

        pub(super) fn read_capabilities(capabilities: Option<$pb::ClientCapabilities>) -> ClientCapabilities {
            capabilities
                .map(|c| ClientCapabilities {
                    deferral_allowed: c.deferral_allowed,
                    write_only_attributes_allowed: c.write_only_attributes_allowed,
                })
                .unwrap_or_default()
        }

        pub(super) fn wire_capabilities(capabilities: ServerCapabilities) -> Option<$pb::ServerCapabilities> {
            Some($pb::ServerCapabilities {
                plan_destroy: capabilities.plan_destroy,
                get_provider_schema_optional: capabilities.get_provider_schema_optional,
                move_resource_state: capabilities.move_resource_state,
            })
        }

        pub(super) fn wire_deferred(deferred: Option<Deferred>) -> Option<$pb::Deferred> {
            use $pb::deferred::Reason;
            deferred.map(|d| $pb::Deferred {
                reason: match d.reason {
                    DeferredReason::Unknown => Reason::Unknown,
                    DeferredReason::ResourceConfigUnknown => Reason::ResourceConfigUnknown,
                    DeferredReason::ProviderConfigUnknown => Reason::ProviderConfigUnknown,
                    DeferredReason::AbsentPrereq => Reason::AbsentPrereq,
                } as i32,
            })
        }

        pub(super) fn wire_path(path: AttributePath) -> $pb::AttributePath {
            use $pb::attribute_path::step::Selector;
            $pb::AttributePath {
                steps: path
                    .steps
                    .into_iter()
                    .map(|step| $pb::attribute_path::Step {
                        selector: Some(match step {
                            AttributePathStep::AttributeName(name) => Selector::AttributeName(name),
                            AttributePathStep::ElementKeyString(key) => {
                                Selector::ElementKeyString(key)
                            }
                            AttributePathStep::ElementKeyInt(index) => Selector::ElementKeyInt(index),
                        }),
                    })
                    .collect(),
            }
        }

        pub(super) fn wire_diagnostics(diagnostics: Diagnostics) -> Vec<$pb::Diagnostic> {
            use $pb::diagnostic::Severity;
            diagnostics
                .into_iter()
                .map(|d| $pb::Diagnostic {
                    severity: match d.severity {
                        DiagnosticSeverity::Invalid => Severity::Invalid,
                        DiagnosticSeverity::Error => Severity::Error,
                        DiagnosticSeverity::Warning => Severity::Warning,
                    } as i32,
                    summary: d.summary,
                    detail: d.detail,
                    attribute: d.attribute.map(wire_path),
                })
                .collect()
        }

        pub(super) fn wire_block(block: &Block, version: i64) -> $pb::schema::Block {
            $pb::schema::Block {
                version,
                attributes: block.attributes.iter().map(attribute).collect(),
                block_types: block
                    .block_types
                    .iter()
                    .map(|nested| wire_nested_block(nested, version))
                    .collect(),
                description: block.description.clone(),
                description_kind: $pb::StringKind::Plain as i32,
                deprecated: block.deprecated,
            }
        }

        pub(super) fn wire_nested_block(nested: &NestedBlock, version: i64) -> $pb::schema::NestedBlock {
            use $pb::schema::nested_block::NestingMode as Mode;
            $pb::schema::NestedBlock {
                type_name: nested.type_name.clone(),
                block: Some(wire_block(&nested.block, version)),
                nesting: match nested.nesting {
                    NestingMode::Single => Mode::Single,
                    NestingMode::Group => Mode::Group,
                    NestingMode::List => Mode::List,
                    NestingMode::Set => Mode::Set,
                    NestingMode::Map => Mode::Map,
                } as i32,
                min_items: nested.min_items,
                max_items: nested.max_items,
            }
        }

        pub(super) fn wire_schema(schema: &Schema) -> $pb::Schema {
            $pb::Schema {
                version: schema.version,
                block: Some(wire_block(&schema.block, schema.version)),
            }
        }

        pub(super) fn wire_schemas(schemas: &BTreeMap<String, Schema>) -> HashMap<String, $pb::Schema> {
            schemas
                .iter()
                .map(|(name, schema)| (name.clone(), wire_schema(schema)))
                .collect()
        }

        pub(super) fn wire_parameter(parameter: &Parameter) -> $pb::function::Parameter {
            $pb::function::Parameter {
                name: parameter.name.clone(),
                r#type: type_bytes(&parameter.ty),
                allow_null_value: parameter.allow_null_value,
                allow_unknown_values: parameter.allow_unknown_values,
                description: parameter.description.clone(),
                description_kind: $pb::StringKind::Plain as i32,
            }
        }

        pub(super) fn wire_functions(
            functions: &BTreeMap<String, FunctionDefinition>,
        ) -> HashMap<String, $pb::Function> {
            functions
                .iter()
                .map(|(name, def)| {
                    let function = $pb::Function {
                        parameters: def.parameters.iter().map(wire_parameter).collect(),
                        variadic_parameter: def.variadic_parameter.as_ref().map(wire_parameter),
                        r#return: Some($pb::function::Return {
                            r#type: type_bytes(&def.return_type),
                        }),
                        summary: def.summary.clone(),
                        description: def.description.clone(),
                        description_kind: $pb::StringKind::Plain as i32,
                        deprecation_message: def.deprecation_message.clone(),
                    };
                    (name.clone(), function)
                })
                .collect()
        }

        pub(super) fn wire_identity_schema(schema: &IdentitySchema) -> $pb::ResourceIdentitySchema {
            $pb::ResourceIdentitySchema {
                version: schema.version,
                identity_attributes: schema
                    .attributes
                    .iter()
                    .map(|a| $pb::resource_identity_schema::IdentityAttribute {
                        name: a.name.clone(),
                        r#type: type_bytes(&a.ty),
                        required_for_import: a.required_for_import,
                        optional_for_import: a.optional_for_import,
                        description: a.description.clone(),
                    })
                    .collect(),
            }
        }

        impl From<$pb::get_metadata::Request> for msg::GetMetadataRequest {
            fn from(_: $pb::get_metadata::Request) -> Self {
                Self {}
            }
        }

        impl From<msg::GetMetadataResponse> for $pb::get_metadata::Response {
            fn from(response: msg::GetMetadataResponse) -> Self {
                Self {
                    server_capabilities: wire_capabilities(response.server_capabilities),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    data_sources: response
                        .data_sources
                        .into_iter()
                        .map(|m| $pb::get_metadata::DataSourceMetadata { type_name: m.type_name })
                        .collect(),
                    resources: response
                        .resources
                        .into_iter()
                        .map(|m| $pb::get_metadata::ResourceMetadata { type_name: m.type_name })
                        .collect(),
                    functions: response
                        .functions
                        .into_iter()
                        .map(|m| $pb::get_metadata::FunctionMetadata { name: m.name })
                        .collect(),
                    ephemeral_resources: response
                        .ephemeral_resources
                        .into_iter()
                        .map(|m| $pb::get_metadata::EphemeralMetadata { type_name: m.type_name })
                        .collect(),
                    actions: response
                        .actions
                        .into_iter()
                        .map(|m| $pb::get_metadata::ActionMetadata { type_name: m.type_name })
                        .collect(),
                }
            }
        }

        impl From<$pb::get_provider_schema::Request> for msg::GetProviderSchemaRequest {
            fn from(_: $pb::get_provider_schema::Request) -> Self {
                Self {}
            }
        }

        impl From<msg::GetProviderSchemaResponse> for $pb::get_provider_schema::Response {
            fn from(response: msg::GetProviderSchemaResponse) -> Self {
                Self {
                    provider: Some(wire_schema(&response.provider)),
                    resource_schemas: wire_schemas(&response.resource_schemas),
                    data_source_schemas: wire_schemas(&response.data_source_schemas),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    provider_meta: response.provider_meta.as_ref().map(wire_schema),
                    server_capabilities: wire_capabilities(response.server_capabilities),
                    functions: wire_functions(&response.functions),
                    ephemeral_resource_schemas: wire_schemas(&response.ephemeral_resource_schemas),
                    action_schemas: wire_schemas(&response.action_schemas),
                }
            }
        }

        impl From<$pb::get_resource_identity_schemas::Request>
            for msg::GetResourceIdentitySchemasRequest
        {
            fn from(_: $pb::get_resource_identity_schemas::Request) -> Self {
                Self {}
            }
        }

        impl From<msg::GetResourceIdentitySchemasResponse>
            for $pb::get_resource_identity_schemas::Response
        {
            fn from(response: msg::GetResourceIdentitySchemasResponse) -> Self {
                Self {
                    identity_schemas: response
                        .identity_schemas
                        .iter()
                        .map(|(name, schema)| (name.clone(), wire_identity_schema(schema)))
                        .collect(),
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::upgrade_resource_state::Request> for msg::UpgradeResourceStateRequest {
            fn from(request: $pb::upgrade_resource_state::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    version: request.version,
                    raw_state: request.raw_state.map(read_raw_state).unwrap_or_default(),
                }
            }
        }

        impl From<msg::UpgradeResourceStateResponse> for $pb::upgrade_resource_state::Response {
            fn from(response: msg::UpgradeResourceStateResponse) -> Self {
                Self {
                    upgraded_state: response.upgraded_state.map(Into::into),
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::upgrade_resource_identity::Request> for msg::UpgradeResourceIdentityRequest {
            fn from(request: $pb::upgrade_resource_identity::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    version: request.version,
                    raw_identity: request.raw_identity.map(read_raw_state).unwrap_or_default(),
                }
            }
        }

        impl From<msg::UpgradeResourceIdentityResponse>
            for $pb::upgrade_resource_identity::Response
        {
            fn from(response: msg::UpgradeResourceIdentityResponse) -> Self {
                Self {
                    upgraded_identity: wire_identity(response.upgraded_identity),
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::read_resource::Request> for msg::ReadResourceRequest {
            fn from(request: $pb::read_resource::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    current_state: dynamic(request.current_state),
                    private: request.private,
                    provider_meta: request.provider_meta.map(Into::into),
                    client_capabilities: read_capabilities(request.client_capabilities),
                    current_identity: read_identity(request.current_identity),
                }
            }
        }

        impl From<msg::ReadResourceResponse> for $pb::read_resource::Response {
            fn from(response: msg::ReadResourceResponse) -> Self {
                Self {
                    new_state: response.new_state.map(Into::into),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    private: response.private,
                    deferred: wire_deferred(response.deferred),
                    new_identity: wire_identity(response.new_identity),
                }
            }
        }

        impl From<$pb::plan_resource_change::Request> for msg::PlanResourceChangeRequest {
            fn from(request: $pb::plan_resource_change::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    prior_state: dynamic(request.prior_state),
                    proposed_new_state: dynamic(request.proposed_new_state),
                    config: dynamic(request.config),
                    prior_private: request.prior_private,
                    provider_meta: request.provider_meta.map(Into::into),
                    client_capabilities: read_capabilities(request.client_capabilities),
                    prior_identity: read_identity(request.prior_identity),
                }
            }
        }

        impl From<msg::PlanResourceChangeResponse> for $pb::plan_resource_change::Response {
            fn from(response: msg::PlanResourceChangeResponse) -> Self {
                Self {
                    planned_state: response.planned_state.map(Into::into),
                    requires_replace: response.requires_replace.into_iter().map(wire_path).collect(),
                    planned_private: response.planned_private,
                    diagnostics: wire_diagnostics(response.diagnostics),
                    legacy_type_system: false,
                    deferred: wire_deferred(response.deferred),
                    planned_identity: wire_identity(response.planned_identity),
                }
            }
        }

        impl From<$pb::apply_resource_change::Request> for msg::ApplyResourceChangeRequest {
            fn from(request: $pb::apply_resource_change::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    prior_state: dynamic(request.prior_state),
                    planned_state: dynamic(request.planned_state),
                    config: dynamic(request.config),
                    planned_private: request.planned_private,
                    provider_meta: request.provider_meta.map(Into::into),
                    planned_identity: read_identity(request.planned_identity),
                }
            }
        }

        impl From<msg::ApplyResourceChangeResponse> for $pb::apply_resource_change::Response {
            fn from(response: msg::ApplyResourceChangeResponse) -> Self {
                Self {
                    new_state: response.new_state.map(Into::into),
                    private: response.private,
                    diagnostics: wire_diagnostics(response.diagnostics),
                    legacy_type_system: false,
                    new_identity: wire_identity(response.new_identity),
                }
            }
        }

        impl From<$pb::import_resource_state::Request> for msg::ImportResourceStateRequest {
            fn from(request: $pb::import_resource_state::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    id: request.id,
                    client_capabilities: read_capabilities(request.client_capabilities),
                    identity: read_identity(request.identity),
                }
            }
        }

        impl From<msg::ImportResourceStateResponse> for $pb::import_resource_state::Response {
            fn from(response: msg::ImportResourceStateResponse) -> Self {
                Self {
                    imported_resources: response
                        .imported_resources
                        .into_iter()
                        .map(|imported| $pb::import_resource_state::ImportedResource {
                            type_name: imported.type_name,
                            state: Some(imported.state.into()),
                            private: imported.private,
                            identity: wire_identity(imported.identity),
                        })
                        .collect(),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    deferred: wire_deferred(response.deferred),
                }
            }
        }

        impl From<$pb::move_resource_state::Request> for msg::MoveResourceStateRequest {
            fn from(request: $pb::move_resource_state::Request) -> Self {
                Self {
                    source_provider_address: request.source_provider_address,
                    source_type_name: request.source_type_name,
                    source_schema_version: request.source_schema_version,
                    source_state: request.source_state.map(read_raw_state).unwrap_or_default(),
                    target_type_name: request.target_type_name,
                    source_private: request.source_private,
                    source_identity: request.source_identity.map(read_raw_state),
                    source_identity_schema_version: request.source_identity_schema_version,
                }
            }
        }

        impl From<msg::MoveResourceStateResponse> for $pb::move_resource_state::Response {
            fn from(response: msg::MoveResourceStateResponse) -> Self {
                Self {
                    target_state: response.target_state.map(Into::into),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    target_private: response.target_private,
                    target_identity: wire_identity(response.target_identity),
                }
            }
        }

        impl From<$pb::read_data_source::Request> for msg::ReadDataSourceRequest {
            fn from(request: $pb::read_data_source::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    config: dynamic(request.config),
                    provider_meta: request.provider_meta.map(Into::into),
                    client_capabilities: read_capabilities(request.client_capabilities),
                }
            }
        }

        impl From<msg::ReadDataSourceResponse> for $pb::read_data_source::Response {
            fn from(response: msg::ReadDataSourceResponse) -> Self {
                Self {
                    state: response.state.map(Into::into),
                    diagnostics: wire_diagnostics(response.diagnostics),
                    deferred: wire_deferred(response.deferred),
                }
            }
        }

        impl From<$pb::validate_ephemeral_resource_config::Request>
            for msg::ValidateEphemeralResourceConfigRequest
        {
            fn from(request: $pb::validate_ephemeral_resource_config::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    config: dynamic(request.config),
                }
            }
        }

        impl From<msg::ValidateEphemeralResourceConfigResponse>
            for $pb::validate_ephemeral_resource_config::Response
        {
            fn from(response: msg::ValidateEphemeralResourceConfigResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::open_ephemeral_resource::Request> for msg::OpenEphemeralResourceRequest {
            fn from(request: $pb::open_ephemeral_resource::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    config: dynamic(request.config),
                    client_capabilities: read_capabilities(request.client_capabilities),
                }
            }
        }

        impl From<msg::OpenEphemeralResourceResponse> for $pb::open_ephemeral_resource::Response {
            fn from(response: msg::OpenEphemeralResourceResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                    renew_at: response.renew_at.map(timestamp),
                    result: response.result.map(Into::into),
                    private: response.private,
                    deferred: wire_deferred(response.deferred),
                }
            }
        }

        impl From<$pb::renew_ephemeral_resource::Request> for msg::RenewEphemeralResourceRequest {
            fn from(request: $pb::renew_ephemeral_resource::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    private: request.private,
                }
            }
        }

        impl From<msg::RenewEphemeralResourceResponse> for $pb::renew_ephemeral_resource::Response {
            fn from(response: msg::RenewEphemeralResourceResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                    renew_at: response.renew_at.map(timestamp),
                    private: response.private,
                }
            }
        }

        impl From<$pb::close_ephemeral_resource::Request> for msg::CloseEphemeralResourceRequest {
            fn from(request: $pb::close_ephemeral_resource::Request) -> Self {
                Self {
                    type_name: request.type_name,
                    private: request.private,
                }
            }
        }

        impl From<msg::CloseEphemeralResourceResponse> for $pb::close_ephemeral_resource::Response {
            fn from(response: msg::CloseEphemeralResourceResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::get_functions::Request> for msg::GetFunctionsRequest {
            fn from(_: $pb::get_functions::Request) -> Self {
                Self {}
            }
        }

        impl From<msg::GetFunctionsResponse> for $pb::get_functions::Response {
            fn from(response: msg::GetFunctionsResponse) -> Self {
                Self {
                    functions: wire_functions(&response.functions),
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::call_function::Request> for msg::CallFunctionRequest {
            fn from(request: $pb::call_function::Request) -> Self {
                Self {
                    name: request.name,
                    arguments: request.arguments.into_iter().map(Into::into).collect(),
                }
            }
        }

        impl From<msg::CallFunctionResponse> for $pb::call_function::Response {
            fn from(response: msg::CallFunctionResponse) -> Self {
                Self {
                    result: response.result.map(Into::into),
                    error: response.error.map(|e: FunctionError| $pb::FunctionError {
                        text: e.text,
                        function_argument: e.function_argument,
                    }),
                }
            }
        }

        impl From<$pb::validate_action_config::Request> for msg::ValidateActionConfigRequest {
            fn from(request: $pb::validate_action_config::Request) -> Self {
                Self {
                    action_type: request.action_type,
                    config: dynamic(request.config),
                }
            }
        }

        impl From<msg::ValidateActionConfigResponse> for $pb::validate_action_config::Response {
            fn from(response: msg::ValidateActionConfigResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                }
            }
        }

        impl From<$pb::plan_action::Request> for msg::PlanActionRequest {
            fn from(request: $pb::plan_action::Request) -> Self {
                Self {
                    action_type: request.action_type,
                    config: dynamic(request.config),
                    client_capabilities: read_capabilities(request.client_capabilities),
                }
            }
        }

        impl From<msg::PlanActionResponse> for $pb::plan_action::Response {
            fn from(response: msg::PlanActionResponse) -> Self {
                Self {
                    diagnostics: wire_diagnostics(response.diagnostics),
                    deferred: wire_deferred(response.deferred),
                }
            }
        }

        impl From<$pb::invoke_action::Request> for msg::InvokeActionRequest {
            fn from(request: $pb::invoke_action::Request) -> Self {
                Self {
                    action_type: request.action_type,
                    config: dynamic(request.config),
                    client_capabilities: read_capabilities(request.client_capabilities),
                }
            }
        }

        impl From<msg::InvokeActionEvent> for $pb::invoke_action::Event {
            fn from(event: msg::InvokeActionEvent) -> Self {
                use $pb::invoke_action::event::{Completed, Progress, Type as Kind};
                let kind = match event {
                    msg::InvokeActionEvent::Progress { message } => {
                        Kind::Progress(Progress { message })
                    }
                    msg::InvokeActionEvent::Completed { diagnostics } => {
                        Kind::Completed(Completed {
                            diagnostics: wire_diagnostics(diagnostics),
                        })
                    }
                };
                Self { r#type: Some(kind) }
            }
        }
    };
}

/// Implements the generated service trait by forwarding every unary RPC to
/// the method of the same name on the wrapped server.
macro_rules! provider_service {
    ($service:ident, $pb:ident, { $($rpc:ident($message:ident)),* $(,)? }) => {
        #[tonic::async_trait]
        impl $pb::provider_server::Provider for $service {
            $(
                async fn $rpc(
                    &self,
                    request: Request<$pb::$message::Request>,
                ) -> Result<Response<$pb::$message::Response>, Status> {
                    debug!(rpc = stringify!($rpc), "handling request");
                    let response = self
                        .server
                        .$rpc(Context::new(), request.into_inner().into())
                        .await?;
                    Ok(Response::new(response.into()))
                }
            )*

            type InvokeActionStream = EventStream<$pb::invoke_action::Event>;

            async fn invoke_action(
                &self,
                request: Request<$pb::invoke_action::Request>,
            ) -> Result<Response<Self::InvokeActionStream>, Status> {
                debug!(rpc = "invoke_action", "handling request");
                let response = self
                    .server
                    .invoke_action(Context::new(), request.into_inner().into())
                    .await?;
                let events = response
                    .events
                    .map(|event| Ok::<_, Status>($pb::invoke_action::Event::from(event)));
                Ok(Response::new(Box::pin(events) as Self::InvokeActionStream))
            }
        }
    };
}

mod wire6 {
    use super::*;
    use crate::proto::tfplugin6 as pb;

    shared_messages!(pb);

    pub(super) fn attribute(attribute: &Attribute) -> pb::schema::Attribute {
        pb::schema::Attribute {
            name: attribute.name.clone(),
            r#type: match attribute.nested_type {
                Some(_) => Vec::new(),
                None => type_bytes(&attribute.ty),
            },
            nested_type: attribute.nested_type.as_ref().map(object),
            description: attribute.description.clone(),
            required: attribute.required,
            optional: attribute.optional,
            computed: attribute.computed,
            sensitive: attribute.sensitive,
            description_kind: pb::StringKind::Plain as i32,
            deprecated: attribute.deprecated,
            write_only: attribute.write_only,
        }
    }

    fn object(nested: &NestedType) -> pb::schema::Object {
        use pb::schema::object::NestingMode as Mode;
        pb::schema::Object {
            attributes: nested.attributes.iter().map(attribute).collect(),
            nesting: match nested.nesting {
                ObjectNestingMode::Single => Mode::Single,
                ObjectNestingMode::List => Mode::List,
                ObjectNestingMode::Set => Mode::Set,
                ObjectNestingMode::Map => Mode::Map,
            } as i32,
        }
    }

    impl From<pb::validate_provider_config::Request> for v6::ValidateProviderConfigRequest {
        fn from(request: pb::validate_provider_config::Request) -> Self {
            Self {
                config: dynamic(request.config),
            }
        }
    }

    impl From<v6::ValidateProviderConfigResponse> for pb::validate_provider_config::Response {
        fn from(response: v6::ValidateProviderConfigResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::validate_resource_config::Request> for v6::ValidateResourceConfigRequest {
        fn from(request: pb::validate_resource_config::Request) -> Self {
            Self {
                type_name: request.type_name,
                config: dynamic(request.config),
                client_capabilities: read_capabilities(request.client_capabilities),
            }
        }
    }

    impl From<v6::ValidateResourceConfigResponse> for pb::validate_resource_config::Response {
        fn from(response: v6::ValidateResourceConfigResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::validate_data_resource_config::Request> for v6::ValidateDataResourceConfigRequest {
        fn from(request: pb::validate_data_resource_config::Request) -> Self {
            Self {
                type_name: request.type_name,
                config: dynamic(request.config),
            }
        }
    }

    impl From<v6::ValidateDataResourceConfigResponse> for pb::validate_data_resource_config::Response {
        fn from(response: v6::ValidateDataResourceConfigResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::configure_provider::Request> for msg::ConfigureProviderRequest {
        fn from(request: pb::configure_provider::Request) -> Self {
            Self {
                terraform_version: request.terraform_version,
                config: dynamic(request.config),
                client_capabilities: read_capabilities(request.client_capabilities),
            }
        }
    }

    impl From<msg::ConfigureProviderResponse> for pb::configure_provider::Response {
        fn from(response: msg::ConfigureProviderResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::stop_provider::Request> for msg::StopProviderRequest {
        fn from(_: pb::stop_provider::Request) -> Self {
            Self {}
        }
    }

    impl From<msg::StopProviderResponse> for pb::stop_provider::Response {
        fn from(response: msg::StopProviderResponse) -> Self {
            Self {
                error: response.error,
            }
        }
    }
}

mod wire5 {
    use super::*;
    use crate::proto::tfplugin5 as pb;

    shared_messages!(pb);

    fn attribute(attribute: &Attribute) -> pb::schema::Attribute {
        pb::schema::Attribute {
            name: attribute.name.clone(),
            r#type: type_bytes(&attribute.ty),
            description: attribute.description.clone(),
            required: attribute.required,
            optional: attribute.optional,
            computed: attribute.computed,
            sensitive: attribute.sensitive,
            description_kind: pb::StringKind::Plain as i32,
            deprecated: attribute.deprecated,
            write_only: attribute.write_only,
        }
    }

    impl From<pb::prepare_provider_config::Request> for v5::PrepareProviderConfigRequest {
        fn from(request: pb::prepare_provider_config::Request) -> Self {
            Self {
                config: dynamic(request.config),
            }
        }
    }

    impl From<v5::PrepareProviderConfigResponse> for pb::prepare_provider_config::Response {
        fn from(response: v5::PrepareProviderConfigResponse) -> Self {
            Self {
                prepared_config: response.prepared_config.map(Into::into),
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::validate_resource_type_config::Request> for v5::ValidateResourceTypeConfigRequest {
        fn from(request: pb::validate_resource_type_config::Request) -> Self {
            Self {
                type_name: request.type_name,
                config: dynamic(request.config),
                client_capabilities: read_capabilities(request.client_capabilities),
            }
        }
    }

    impl From<v5::ValidateResourceTypeConfigResponse> for pb::validate_resource_type_config::Response {
        fn from(response: v5::ValidateResourceTypeConfigResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::validate_data_source_config::Request> for v5::ValidateDataSourceConfigRequest {
        fn from(request: pb::validate_data_source_config::Request) -> Self {
            Self {
                type_name: request.type_name,
                config: dynamic(request.config),
            }
        }
    }

    impl From<v5::ValidateDataSourceConfigResponse> for pb::validate_data_source_config::Response {
        fn from(response: v5::ValidateDataSourceConfigResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::configure::Request> for msg::ConfigureProviderRequest {
        fn from(request: pb::configure::Request) -> Self {
            Self {
                terraform_version: request.terraform_version,
                config: dynamic(request.config),
                client_capabilities: read_capabilities(request.client_capabilities),
            }
        }
    }

    impl From<msg::ConfigureProviderResponse> for pb::configure::Response {
        fn from(response: msg::ConfigureProviderResponse) -> Self {
            Self {
                diagnostics: wire_diagnostics(response.diagnostics),
            }
        }
    }

    impl From<pb::stop::Request> for msg::StopProviderRequest {
        fn from(_: pb::stop::Request) -> Self {
            Self {}
        }
    }

    impl From<msg::StopProviderResponse> for pb::stop::Response {
        fn from(response: msg::StopProviderResponse) -> Self {
            Self {
                error: response.error,
            }
        }
    }
}

/// A protocol 6 server behind the generated gRPC service.
#[derive(Clone)]
pub struct GrpcProviderServer {
    server: Arc<dyn v6::ProviderServer>,
}

impl GrpcProviderServer {
    pub fn new(server: Arc<dyn v6::ProviderServer>) -> Self {
        Self { server }
    }

    /// The tonic service, with both message size limits set to `max_message_size`.
    pub fn into_service(
        self,
        max_message_size: usize,
    ) -> tfplugin6::provider_server::ProviderServer<Self> {
        tfplugin6::provider_server::ProviderServer::new(self)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size)
    }
}

provider_service!(GrpcProviderServer, tfplugin6, {
    get_metadata(get_metadata),
    get_provider_schema(get_provider_schema),
    validate_provider_config(validate_provider_config),
    validate_resource_config(validate_resource_config),
    validate_data_resource_config(validate_data_resource_config),
    upgrade_resource_state(upgrade_resource_state),
    get_resource_identity_schemas(get_resource_identity_schemas),
    upgrade_resource_identity(upgrade_resource_identity),
    configure_provider(configure_provider),
    read_resource(read_resource),
    plan_resource_change(plan_resource_change),
    apply_resource_change(apply_resource_change),
    import_resource_state(import_resource_state),
    move_resource_state(move_resource_state),
    read_data_source(read_data_source),
    validate_ephemeral_resource_config(validate_ephemeral_resource_config),
    open_ephemeral_resource(open_ephemeral_resource),
    renew_ephemeral_resource(renew_ephemeral_resource),
    close_ephemeral_resource(close_ephemeral_resource),
    get_functions(get_functions),
    call_function(call_function),
    validate_action_config(validate_action_config),
    plan_action(plan_action),
    stop_provider(stop_provider),
});

/// A protocol 5 server behind the generated gRPC service.
#[derive(Clone)]
pub struct GrpcProviderServerV5 {
    server: Arc<dyn v5::ProviderServer>,
}

impl GrpcProviderServerV5 {
    pub fn new(server: Arc<dyn v5::ProviderServer>) -> Self {
        Self { server }
    }

    pub fn into_service(
        self,
        max_message_size: usize,
    ) -> tfplugin5::provider_server::ProviderServer<Self> {
        tfplugin5::provider_server::ProviderServer::new(self)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size)
    }
}

provider_service!(GrpcProviderServerV5, tfplugin5, {
    get_metadata(get_metadata),
    get_schema(get_provider_schema),
    prepare_provider_config(prepare_provider_config),
    validate_resource_type_config(validate_resource_type_config),
    validate_data_source_config(validate_data_source_config),
    upgrade_resource_state(upgrade_resource_state),
    get_resource_identity_schemas(get_resource_identity_schemas),
    upgrade_resource_identity(upgrade_resource_identity),
    configure(configure),
    read_resource(read_resource),
    plan_resource_change(plan_resource_change),
    apply_resource_change(apply_resource_change),
    import_resource_state(import_resource_state),
    move_resource_state(move_resource_state),
    read_data_source(read_data_source),
    validate_ephemeral_resource_config(validate_ephemeral_resource_config),
    open_ephemeral_resource(open_ephemeral_resource),
    renew_ephemeral_resource(renew_ephemeral_resource),
    close_ephemeral_resource(close_ephemeral_resource),
    get_functions(get_functions),
    call_function(call_function),
    validate_action_config(validate_action_config),
    plan_action(plan_action),
    stop(stop),
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeBuilder, SchemaBuilder};
    use crate::types::Diagnostic;
    use crate::value::Value;
    use chrono::TimeZone;

    #[test]
    fn diagnostics_keep_severity_and_attribute_paths() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(
            Diagnostic::error("Bad Port", "out of range")
                .with_attribute(AttributePath::new("ports").index(2).attribute("number")),
        );
        diagnostics.add_warning("Deprecated", "use ports");

        let wire = wire6::wire_diagnostics(diagnostics);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].severity, tfplugin6::diagnostic::Severity::Error as i32);
        assert_eq!(wire[1].severity, tfplugin6::diagnostic::Severity::Warning as i32);
        let steps: Vec<_> = wire[0]
            .attribute
            .as_ref()
            .map(|p| p.steps.iter().filter_map(|s| s.selector.clone()).collect())
            .unwrap_or_default();
        use tfplugin6::attribute_path::step::Selector;
        assert_eq!(
            steps,
            vec![
                Selector::AttributeName("ports".to_string()),
                Selector::ElementKeyInt(2),
                Selector::AttributeName("number".to_string()),
            ]
        );
        assert!(wire[1].attribute.is_none());
    }

    #[test]
    fn nested_attributes_carry_an_object_instead_of_a_type() {
        let nested = NestedType::new(
            ObjectNestingMode::List,
            vec![AttributeBuilder::new("port", Type::Number).required().build()],
        );
        let attribute = AttributeBuilder::nested("rules", nested).optional().build();

        let wire = wire6::attribute(&attribute);
        assert!(wire.r#type.is_empty());
        let object = wire.nested_type.unwrap_or_default();
        assert_eq!(object.nesting, tfplugin6::schema::object::NestingMode::List as i32);
        assert_eq!(object.attributes[0].r#type, br#""number""#.to_vec());
    }

    #[test]
    fn schema_responses_encode_type_descriptors_as_json() {
        let schema = SchemaBuilder::new()
            .version(3)
            .attribute(AttributeBuilder::new("tags", Type::map(Type::String)).optional().build())
            .build();
        let mut response = msg::GetProviderSchemaResponse::default();
        response.resource_schemas.insert("corner_thing".to_string(), schema);
        response.server_capabilities = ServerCapabilities::all();

        let wire = tfplugin5::get_provider_schema::Response::from(response);
        let thing = &wire.resource_schemas["corner_thing"];
        assert_eq!(thing.version, 3);
        let block = thing.block.clone().unwrap_or_default();
        assert_eq!(block.version, 3);
        assert_eq!(block.attributes[0].r#type, br#"["map","string"]"#.to_vec());
        assert_eq!(
            wire.server_capabilities,
            Some(tfplugin5::ServerCapabilities {
                plan_destroy: true,
                get_provider_schema_optional: true,
                move_resource_state: true,
            })
        );
    }

    #[test]
    fn empty_envelopes_and_identities_round_through_the_wire() {
        let request = tfplugin6::read_resource::Request {
            type_name: "corner_user".to_string(),
            current_state: Some(tfplugin6::DynamicValue {
                msgpack: vec![0x80],
                json: Vec::new(),
            }),
            current_identity: Some(tfplugin6::ResourceIdentityData {
                identity_data: Some(tfplugin6::DynamicValue::default()),
            }),
            ..Default::default()
        };

        let request = msg::ReadResourceRequest::from(request);
        assert_eq!(request.current_state.msgpack, Some(vec![0x80]));
        assert_eq!(request.current_state.json, None);
        assert_eq!(request.current_identity, Some(msg::DynamicValue::default()));
        assert!(request.provider_meta.is_none());
        assert!(!request.client_capabilities.deferral_allowed);
    }

    #[test]
    fn ephemeral_renewal_times_become_timestamps() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single();
        let ty = Type::object([("token", Type::String)]);
        let response = msg::OpenEphemeralResourceResponse {
            renew_at: at,
            result: msg::DynamicValue::encode(&Value::object([("token", Value::from("t"))]), &ty).ok(),
            private: Some(b"lease".to_vec()),
            ..Default::default()
        };

        let wire = tfplugin6::open_ephemeral_resource::Response::from(response);
        let seconds = at.map(|t| t.timestamp());
        assert_eq!(wire.renew_at.map(|t| t.seconds), seconds);
        assert_eq!(wire.private, Some(b"lease".to_vec()));
        assert!(wire.result.is_some_and(|r| !r.msgpack.is_empty()));
    }
}
