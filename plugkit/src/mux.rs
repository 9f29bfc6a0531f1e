//! Multiplexing several protocol 6 servers behind one
//!
//! Every child must declare the same provider schema. Type and function
//! names must be disjoint; each typed RPC is forwarded to the child that
//! owns the name. Provider-wide RPCs fan out to every child.

use crate::context::Context;
use crate::error::{PlugkitError, Result};
use crate::protocol::v6::{self, ProviderServer};
use crate::protocol::*;
use crate::schema::Schema;
use crate::types::{Diagnostic, Diagnostics, FunctionError, ServerCapabilities};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Protocol 6 server routing to child servers by type name.
pub struct MuxServer {
    servers: Vec<Arc<dyn ProviderServer>>,
    resources: HashMap<String, usize>,
    data_sources: HashMap<String, usize>,
    ephemeral_resources: HashMap<String, usize>,
    functions: HashMap<String, usize>,
    actions: HashMap<String, usize>,
    schema: GetProviderSchemaResponse,
}

/// Records the owner of every name, failing on the first duplicate.
fn claim<'a>(
    kind: &str,
    owners: &mut HashMap<String, usize>,
    names: impl Iterator<Item = &'a String>,
    index: usize,
) -> Result<()> {
    for name in names {
        if let Some(previous) = owners.insert(name.clone(), index) {
            return Err(PlugkitError::MuxConflict(format!(
                "{} {} is implemented by servers {} and {}",
                kind, name, previous, index
            )));
        }
    }
    Ok(())
}

fn same_schema(a: &Option<Schema>, b: &Option<Schema>) -> Result<bool> {
    let a = serde_json::to_value(a)?;
    let b = serde_json::to_value(b)?;
    Ok(a == b)
}

/// Appends diagnostics not already present.
fn merge(into: &mut Diagnostics, from: Diagnostics) {
    for diagnostic in from {
        if !into.iter().any(|d| d == &diagnostic) {
            into.push(diagnostic);
        }
    }
}

fn not_owned(kind: &str, name: &str) -> Diagnostics {
    Diagnostics::from(Diagnostic::error(
        format!("Unknown {} Type", kind),
        format!(
            "No server behind the multiplexer implements {} {}. This is always a bug in the provider.",
            kind.to_lowercase(),
            name
        ),
    ))
}

impl MuxServer {
    /// Reads every child's schema and builds the routing tables.
    pub async fn new(servers: Vec<Arc<dyn ProviderServer>>) -> Result<Self> {
        if servers.is_empty() {
            return Err(PlugkitError::MuxConflict(
                "at least one server is required".to_string(),
            ));
        }

        let ctx = Context::new();
        let mut mux = Self {
            servers: Vec::new(),
            resources: HashMap::new(),
            data_sources: HashMap::new(),
            ephemeral_resources: HashMap::new(),
            functions: HashMap::new(),
            actions: HashMap::new(),
            schema: GetProviderSchemaResponse {
                server_capabilities: ServerCapabilities::all(),
                ..Default::default()
            },
        };

        for (index, server) in servers.iter().enumerate() {
            let schema = server
                .get_provider_schema(ctx.clone(), GetProviderSchemaRequest {})
                .await?;
            claim("resource", &mut mux.resources, schema.resource_schemas.keys(), index)?;
            claim("data source", &mut mux.data_sources, schema.data_source_schemas.keys(), index)?;
            claim(
                "ephemeral resource",
                &mut mux.ephemeral_resources,
                schema.ephemeral_resource_schemas.keys(),
                index,
            )?;
            claim("function", &mut mux.functions, schema.functions.keys(), index)?;
            claim("action", &mut mux.actions, schema.action_schemas.keys(), index)?;

            let merged = &mut mux.schema;
            if index == 0 {
                merged.provider = schema.provider.clone();
                merged.provider_meta = schema.provider_meta.clone();
            } else {
                if !same_schema(&Some(merged.provider.clone()), &Some(schema.provider.clone()))? {
                    return Err(PlugkitError::MuxConflict(format!(
                        "server {} declares a provider schema that differs from server 0",
                        index
                    )));
                }
                if !same_schema(&merged.provider_meta, &schema.provider_meta)? {
                    return Err(PlugkitError::MuxConflict(format!(
                        "server {} declares a provider_meta schema that differs from server 0",
                        index
                    )));
                }
            }
            merged.resource_schemas.extend(schema.resource_schemas);
            merged.data_source_schemas.extend(schema.data_source_schemas);
            merged
                .ephemeral_resource_schemas
                .extend(schema.ephemeral_resource_schemas);
            merged.functions.extend(schema.functions);
            merged.action_schemas.extend(schema.action_schemas);
            merged.server_capabilities = merged
                .server_capabilities
                .intersect(schema.server_capabilities);
            merge(&mut merged.diagnostics, schema.diagnostics);
        }

        info!(
            servers = servers.len(),
            resources = mux.resources.len(),
            "multiplexer ready"
        );
        mux.servers = servers;
        Ok(mux)
    }

    fn owner(&self, table: &HashMap<String, usize>, name: &str) -> Option<&Arc<dyn ProviderServer>> {
        table.get(name).map(|&index| &self.servers[index])
    }

    pub fn server_capabilities(&self) -> ServerCapabilities {
        self.schema.server_capabilities
    }
}

#[async_trait]
impl ProviderServer for MuxServer {
    async fn get_metadata(
        &self,
        _ctx: Context,
        _request: GetMetadataRequest,
    ) -> Result<GetMetadataResponse> {
        debug!(rpc = "GetMetadata", "multiplexing");
        let names = |schemas: &std::collections::BTreeMap<String, Schema>| -> Vec<ResourceMetadata> {
            schemas
                .keys()
                .map(|name| ResourceMetadata {
                    type_name: name.clone(),
                })
                .collect()
        };
        Ok(GetMetadataResponse {
            server_capabilities: self.schema.server_capabilities,
            diagnostics: self.schema.diagnostics.clone(),
            resources: names(&self.schema.resource_schemas),
            data_sources: names(&self.schema.data_source_schemas),
            ephemeral_resources: names(&self.schema.ephemeral_resource_schemas),
            functions: self
                .schema
                .functions
                .keys()
                .map(|name| FunctionMetadata { name: name.clone() })
                .collect(),
            actions: names(&self.schema.action_schemas),
        })
    }

    async fn get_provider_schema(
        &self,
        _ctx: Context,
        _request: GetProviderSchemaRequest,
    ) -> Result<GetProviderSchemaResponse> {
        debug!(rpc = "GetProviderSchema", "multiplexing");
        Ok(self.schema.clone())
    }

    async fn get_resource_identity_schemas(
        &self,
        ctx: Context,
        request: GetResourceIdentitySchemasRequest,
    ) -> Result<GetResourceIdentitySchemasResponse> {
        let mut merged = GetResourceIdentitySchemasResponse::default();
        for server in &self.servers {
            let response = server
                .get_resource_identity_schemas(ctx.clone(), request.clone())
                .await?;
            merged.identity_schemas.extend(response.identity_schemas);
            merge(&mut merged.diagnostics, response.diagnostics);
        }
        Ok(merged)
    }

    async fn validate_provider_config(
        &self,
        ctx: Context,
        request: v6::ValidateProviderConfigRequest,
    ) -> Result<v6::ValidateProviderConfigResponse> {
        let mut diagnostics = Diagnostics::new();
        for server in &self.servers {
            let response = server
                .validate_provider_config(ctx.clone(), request.clone())
                .await?;
            merge(&mut diagnostics, response.diagnostics);
        }
        Ok(v6::ValidateProviderConfigResponse { diagnostics })
    }

    async fn configure_provider(
        &self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> Result<ConfigureProviderResponse> {
        info!(rpc = "ConfigureProvider", servers = self.servers.len(), "configuring every server");
        let mut diagnostics = Diagnostics::new();
        for server in &self.servers {
            let response = server
                .configure_provider(ctx.clone(), request.clone())
                .await?;
            merge(&mut diagnostics, response.diagnostics);
        }
        Ok(ConfigureProviderResponse { diagnostics })
    }

    async fn stop_provider(
        &self,
        ctx: Context,
        request: StopProviderRequest,
    ) -> Result<StopProviderResponse> {
        let mut errors = Vec::new();
        for server in &self.servers {
            let response = server.stop_provider(ctx.clone(), request.clone()).await?;
            if !response.error.is_empty() {
                errors.push(response.error);
            }
        }
        Ok(StopProviderResponse {
            error: errors.join("\n"),
        })
    }

    async fn validate_resource_config(
        &self,
        ctx: Context,
        request: v6::ValidateResourceConfigRequest,
    ) -> Result<v6::ValidateResourceConfigResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.validate_resource_config(ctx, request).await,
            None => Ok(v6::ValidateResourceConfigResponse {
                diagnostics: not_owned("Resource", &request.type_name),
            }),
        }
    }

    async fn upgrade_resource_state(
        &self,
        ctx: Context,
        request: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.upgrade_resource_state(ctx, request).await,
            None => Ok(UpgradeResourceStateResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn upgrade_resource_identity(
        &self,
        ctx: Context,
        request: UpgradeResourceIdentityRequest,
    ) -> Result<UpgradeResourceIdentityResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.upgrade_resource_identity(ctx, request).await,
            None => Ok(UpgradeResourceIdentityResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn read_resource(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.read_resource(ctx, request).await,
            None => Ok(ReadResourceResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn plan_resource_change(
        &self,
        ctx: Context,
        request: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.plan_resource_change(ctx, request).await,
            None => Ok(PlanResourceChangeResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn apply_resource_change(
        &self,
        ctx: Context,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.apply_resource_change(ctx, request).await,
            None => Ok(ApplyResourceChangeResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn import_resource_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse> {
        match self.owner(&self.resources, &request.type_name) {
            Some(server) => server.import_resource_state(ctx, request).await,
            None => Ok(ImportResourceStateResponse {
                diagnostics: not_owned("Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn move_resource_state(
        &self,
        ctx: Context,
        request: MoveResourceStateRequest,
    ) -> Result<MoveResourceStateResponse> {
        match self.owner(&self.resources, &request.target_type_name) {
            Some(server) => server.move_resource_state(ctx, request).await,
            None => Ok(MoveResourceStateResponse {
                diagnostics: not_owned("Resource", &request.target_type_name),
                ..Default::default()
            }),
        }
    }

    async fn validate_data_resource_config(
        &self,
        ctx: Context,
        request: v6::ValidateDataResourceConfigRequest,
    ) -> Result<v6::ValidateDataResourceConfigResponse> {
        match self.owner(&self.data_sources, &request.type_name) {
            Some(server) => server.validate_data_resource_config(ctx, request).await,
            None => Ok(v6::ValidateDataResourceConfigResponse {
                diagnostics: not_owned("Data Source", &request.type_name),
            }),
        }
    }

    async fn read_data_source(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse> {
        match self.owner(&self.data_sources, &request.type_name) {
            Some(server) => server.read_data_source(ctx, request).await,
            None => Ok(ReadDataSourceResponse {
                diagnostics: not_owned("Data Source", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn validate_ephemeral_resource_config(
        &self,
        ctx: Context,
        request: ValidateEphemeralResourceConfigRequest,
    ) -> Result<ValidateEphemeralResourceConfigResponse> {
        match self.owner(&self.ephemeral_resources, &request.type_name) {
            Some(server) => server.validate_ephemeral_resource_config(ctx, request).await,
            None => Ok(ValidateEphemeralResourceConfigResponse {
                diagnostics: not_owned("Ephemeral Resource", &request.type_name),
            }),
        }
    }

    async fn open_ephemeral_resource(
        &self,
        ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> Result<OpenEphemeralResourceResponse> {
        match self.owner(&self.ephemeral_resources, &request.type_name) {
            Some(server) => server.open_ephemeral_resource(ctx, request).await,
            None => Ok(OpenEphemeralResourceResponse {
                diagnostics: not_owned("Ephemeral Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn renew_ephemeral_resource(
        &self,
        ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> Result<RenewEphemeralResourceResponse> {
        match self.owner(&self.ephemeral_resources, &request.type_name) {
            Some(server) => server.renew_ephemeral_resource(ctx, request).await,
            None => Ok(RenewEphemeralResourceResponse {
                diagnostics: not_owned("Ephemeral Resource", &request.type_name),
                ..Default::default()
            }),
        }
    }

    async fn close_ephemeral_resource(
        &self,
        ctx: Context,
        request: CloseEphemeralResourceRequest,
    ) -> Result<CloseEphemeralResourceResponse> {
        match self.owner(&self.ephemeral_resources, &request.type_name) {
            Some(server) => server.close_ephemeral_resource(ctx, request).await,
            None => Ok(CloseEphemeralResourceResponse {
                diagnostics: not_owned("Ephemeral Resource", &request.type_name),
            }),
        }
    }

    async fn get_functions(
        &self,
        _ctx: Context,
        _request: GetFunctionsRequest,
    ) -> Result<GetFunctionsResponse> {
        Ok(GetFunctionsResponse {
            functions: self.schema.functions.clone(),
            diagnostics: Diagnostics::new(),
        })
    }

    async fn call_function(
        &self,
        ctx: Context,
        request: CallFunctionRequest,
    ) -> Result<CallFunctionResponse> {
        match self.owner(&self.functions, &request.name) {
            Some(server) => server.call_function(ctx, request).await,
            None => Ok(CallFunctionResponse {
                result: None,
                error: Some(FunctionError::new(format!(
                    "no server behind the multiplexer implements function {}",
                    request.name
                ))),
            }),
        }
    }

    async fn validate_action_config(
        &self,
        ctx: Context,
        request: ValidateActionConfigRequest,
    ) -> Result<ValidateActionConfigResponse> {
        match self.owner(&self.actions, &request.action_type) {
            Some(server) => server.validate_action_config(ctx, request).await,
            None => Ok(ValidateActionConfigResponse {
                diagnostics: not_owned("Action", &request.action_type),
            }),
        }
    }

    async fn plan_action(
        &self,
        ctx: Context,
        request: PlanActionRequest,
    ) -> Result<PlanActionResponse> {
        match self.owner(&self.actions, &request.action_type) {
            Some(server) => server.plan_action(ctx, request).await,
            None => Ok(PlanActionResponse {
                diagnostics: not_owned("Action", &request.action_type),
                ..Default::default()
            }),
        }
    }

    async fn invoke_action(
        &self,
        ctx: Context,
        request: InvokeActionRequest,
    ) -> Result<InvokeActionResponse> {
        match self.owner(&self.actions, &request.action_type) {
            Some(server) => server.invoke_action(ctx, request).await,
            None => {
                let (tx, rx) = mpsc::channel(1);
                let completed = InvokeActionEvent::Completed {
                    diagnostics: not_owned("Action", &request.action_type),
                };
                tx.try_send(completed)
                    .map_err(|e| PlugkitError::Transport(e.to_string()))?;
                Ok(InvokeActionResponse {
                    events: ReceiverStream::new(rx),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowlevel::{
        ApplyRequest, ApplyResponse, Call, ConfigureRequest, ConfigureResponse, LowLevelServer,
        ProviderHandler, ResourceHandler,
    };
    use crate::schema::{AttributeBuilder, SchemaBuilder};
    use crate::value::{Type, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SharedProvider {
        attribute: &'static str,
        configured: Arc<AtomicUsize>,
        capabilities: ServerCapabilities,
    }

    #[async_trait]
    impl ProviderHandler for SharedProvider {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(AttributeBuilder::new(self.attribute, Type::String).optional().build())
                .build()
        }

        fn server_capabilities(&self) -> ServerCapabilities {
            self.capabilities
        }

        async fn configure(&self, _ctx: &Context, _request: ConfigureRequest) -> ConfigureResponse {
            self.configured.fetch_add(1, Ordering::SeqCst);
            ConfigureResponse::default()
        }
    }

    struct User;

    #[async_trait]
    impl ResourceHandler for User {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(AttributeBuilder::new("name", Type::String).required().build())
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

    fn child(
        resource: &str,
        attribute: &'static str,
        configured: &Arc<AtomicUsize>,
    ) -> Arc<dyn ProviderServer> {
        child_with(resource, attribute, configured, ServerCapabilities::all())
    }

    fn child_with(
        resource: &str,
        attribute: &'static str,
        configured: &Arc<AtomicUsize>,
        capabilities: ServerCapabilities,
    ) -> Arc<dyn ProviderServer> {
        let provider = SharedProvider {
            attribute,
            configured: configured.clone(),
            capabilities,
        };
        Arc::new(LowLevelServer::new(Arc::new(provider)).resource(resource, Arc::new(User)))
    }

    #[tokio::test]
    async fn merges_catalogs_and_fans_out_configure() {
        let configured = Arc::new(AtomicUsize::new(0));
        let mux = MuxServer::new(vec![
            child("mux_user1", "endpoint", &configured),
            child("mux_user2", "endpoint", &configured),
        ])
        .await
        .unwrap();

        let schema = mux
            .get_provider_schema(Context::new(), GetProviderSchemaRequest {})
            .await
            .unwrap();
        let names: Vec<_> = schema.resource_schemas.keys().cloned().collect();
        assert_eq!(names, vec!["mux_user1", "mux_user2"]);

        let provider_ty = schema.provider.ty();
        let config = Value::object([("endpoint", Value::null(Type::String))]);
        let response = mux
            .configure_provider(
                Context::new(),
                ConfigureProviderRequest {
                    config: DynamicValue::encode(&config, &provider_ty).unwrap(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(response.diagnostics.is_empty());
        assert_eq!(configured.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capabilities_are_the_intersection_of_children() {
        let configured = Arc::new(AtomicUsize::new(0));
        let mux = MuxServer::new(vec![
            child_with(
                "mux_user1",
                "endpoint",
                &configured,
                ServerCapabilities {
                    plan_destroy: false,
                    ..ServerCapabilities::all()
                },
            ),
            child_with(
                "mux_user2",
                "endpoint",
                &configured,
                ServerCapabilities {
                    move_resource_state: false,
                    ..ServerCapabilities::all()
                },
            ),
        ])
        .await
        .unwrap();

        let expected = ServerCapabilities {
            get_provider_schema_optional: true,
            plan_destroy: false,
            move_resource_state: false,
        };
        assert_eq!(mux.server_capabilities(), expected);
        let schema = mux
            .get_provider_schema(Context::new(), GetProviderSchemaRequest {})
            .await
            .unwrap();
        assert_eq!(schema.server_capabilities, expected);
        let metadata = mux
            .get_metadata(Context::new(), GetMetadataRequest {})
            .await
            .unwrap();
        assert_eq!(metadata.server_capabilities, expected);
    }

    #[tokio::test]
    async fn duplicate_type_names_are_rejected() {
        let configured = Arc::new(AtomicUsize::new(0));
        let result = MuxServer::new(vec![
            child("mux_user1", "endpoint", &configured),
            child("mux_user1", "endpoint", &configured),
        ])
        .await;
        assert!(matches!(result, Err(PlugkitError::MuxConflict(_))));
    }

    #[tokio::test]
    async fn differing_provider_schemas_are_rejected() {
        let configured = Arc::new(AtomicUsize::new(0));
        let result = MuxServer::new(vec![
            child("mux_user1", "endpoint", &configured),
            child("mux_user2", "region", &configured),
        ])
        .await;
        assert!(matches!(result, Err(PlugkitError::MuxConflict(_))));
    }

    #[tokio::test]
    async fn unowned_type_is_a_diagnostic() {
        let configured = Arc::new(AtomicUsize::new(0));
        let mux = MuxServer::new(vec![child("mux_user1", "endpoint", &configured)])
            .await
            .unwrap();
        let response = mux
            .read_resource(
                Context::new(),
                ReadResourceRequest {
                    type_name: "mux_missing".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            response.diagnostics.errors().next().map(|d| d.summary.as_str()),
            Some("Unknown Resource Type")
        );
    }
}
