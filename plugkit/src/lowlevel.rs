//! Low-level protocol server
//!
//! [`LowLevelServer`] implements the protocol 6 RPC surface over a set of
//! handlers registered by type name. It owns everything that touches wire
//! values: decoding requests against schemas, encoding responses, schema
//! validation, deferral gating, write-only null-out and the ephemeral
//! lifecycle. Handlers only ever see decoded [`Value`]s.
//!
//! ```ignore
//! let server = LowLevelServer::new(Arc::new(MyProvider))
//!     .resource("corner_echo", Arc::new(EchoResource))
//!     .function("bool", Arc::new(BoolFunction));
//! serve(Arc::new(server), ServeConfig::default()).await?;
//! ```

use crate::action::{self, ProgressSink};
use crate::context::Context;
use crate::error::{PlugkitError, Result};
use crate::lifecycle::EphemeralLifecycle;
use crate::protocol::v6::{self, ProviderServer};
use crate::protocol::*;
use crate::schema::{FunctionDefinition, IdentitySchema, Schema};
use crate::types::{
    ClientCapabilities, Deferred, Diagnostic, Diagnostics, FunctionError, ServerCapabilities,
};
use crate::value::json::JsonOptions;
use crate::value::{Type, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Opaque data produced by provider configuration and handed to every
/// handler call.
pub type ProviderData = Arc<dyn Any + Send + Sync>;

/// Per-call environment handed to handlers.
#[derive(Clone)]
pub struct Call {
    pub ctx: Context,
    /// Provider configuration captured by ConfigureProvider, null before.
    pub provider_config: Value,
    pub provider_data: Option<ProviderData>,
    pub client_capabilities: ClientCapabilities,
}

impl Call {
    /// The provider data downcast to a concrete type.
    pub fn provider_data<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.provider_data
            .clone()
            .and_then(|data| data.downcast::<T>().ok())
    }
}

pub struct ConfigureRequest {
    pub terraform_version: String,
    pub config: Value,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Default)]
pub struct ConfigureResponse {
    pub diagnostics: Diagnostics,
    pub provider_data: Option<ProviderData>,
    /// Defers every resource, data source and import until the
    /// configuration is known.
    pub deferred: Option<Deferred>,
}

/// Provider-level behavior
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    fn schema(&self) -> Schema;

    fn meta_schema(&self) -> Option<Schema> {
        None
    }

    fn server_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::all()
    }

    async fn validate(&self, _ctx: &Context, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    async fn configure(&self, _ctx: &Context, _request: ConfigureRequest) -> ConfigureResponse {
        ConfigureResponse::default()
    }
}

pub struct PlanRequest {
    pub prior_state: Value,
    pub proposed_new_state: Value,
    pub config: Value,
    pub prior_private: Vec<u8>,
    pub provider_meta: Value,
    pub prior_identity: Option<Value>,
}

pub struct PlanResponse {
    pub planned_state: Value,
    pub requires_replace: Vec<crate::types::AttributePath>,
    pub planned_private: Vec<u8>,
    pub planned_identity: Option<Value>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

impl PlanResponse {
    /// Plans exactly what was proposed.
    pub fn proposed(request: PlanRequest) -> Self {
        Self {
            planned_state: request.proposed_new_state,
            requires_replace: Vec::new(),
            planned_private: request.prior_private,
            planned_identity: request.prior_identity,
            diagnostics: Diagnostics::new(),
            deferred: None,
        }
    }
}

pub struct ApplyRequest {
    pub prior_state: Value,
    pub planned_state: Value,
    pub config: Value,
    pub planned_private: Vec<u8>,
    pub provider_meta: Value,
    pub planned_identity: Option<Value>,
}

pub struct ApplyResponse {
    pub new_state: Value,
    pub private: Vec<u8>,
    pub new_identity: Option<Value>,
    pub diagnostics: Diagnostics,
}

pub struct ReadRequest {
    pub current_state: Value,
    pub private: Vec<u8>,
    pub provider_meta: Value,
    pub current_identity: Option<Value>,
}

pub struct ReadResponse {
    /// Null when the remote object no longer exists.
    pub new_state: Value,
    pub private: Vec<u8>,
    pub new_identity: Option<Value>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

impl ReadResponse {
    pub fn unchanged(request: ReadRequest) -> Self {
        Self {
            new_state: request.current_state,
            private: request.private,
            new_identity: request.current_identity,
            diagnostics: Diagnostics::new(),
            deferred: None,
        }
    }
}

pub struct UpgradeRequest {
    pub version: i64,
    pub raw: RawState,
}

pub struct UpgradeResponse {
    pub value: Value,
    pub diagnostics: Diagnostics,
}

pub struct ImportRequest {
    pub type_name: String,
    pub id: String,
    pub identity: Option<Value>,
}

pub struct ImportedState {
    pub type_name: String,
    pub state: Value,
    pub private: Vec<u8>,
    pub identity: Option<Value>,
}

#[derive(Default)]
pub struct ImportResponse {
    pub imported: Vec<ImportedState>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct MoveRequest {
    pub source_provider_address: String,
    pub source_type_name: String,
    pub source_schema_version: i64,
    pub source_state: RawState,
    pub source_private: Vec<u8>,
    pub source_identity: Option<RawState>,
    pub source_identity_schema_version: i64,
}

pub struct MoveResponse {
    pub target_state: Value,
    pub target_private: Vec<u8>,
    pub target_identity: Option<Value>,
    pub diagnostics: Diagnostics,
}

/// Managed resource behavior
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    fn identity_schema(&self) -> Option<IdentitySchema> {
        None
    }

    async fn validate(&self, _call: &Call, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    async fn plan(&self, _call: &Call, request: PlanRequest) -> PlanResponse {
        PlanResponse::proposed(request)
    }

    async fn apply(&self, call: &Call, request: ApplyRequest) -> ApplyResponse;

    async fn read(&self, _call: &Call, request: ReadRequest) -> ReadResponse {
        ReadResponse::unchanged(request)
    }

    async fn upgrade_state(&self, _call: &Call, request: UpgradeRequest) -> UpgradeResponse {
        let schema = self.schema();
        upgrade_same_version("state", schema.version, &schema.ty(), &request)
    }

    async fn upgrade_identity(&self, _call: &Call, request: UpgradeRequest) -> UpgradeResponse {
        match self.identity_schema() {
            Some(identity) => {
                upgrade_same_version("identity", identity.version, &identity.ty(), &request)
            }
            None => UpgradeResponse {
                value: Value::null(Type::Dynamic),
                diagnostics: Diagnostics::from(Diagnostic::error(
                    "Resource Identity Not Supported",
                    "This resource does not declare an identity schema.",
                )),
            },
        }
    }

    async fn import(&self, _call: &Call, request: ImportRequest) -> ImportResponse {
        ImportResponse {
            diagnostics: Diagnostics::from(Diagnostic::error(
                "Resource Import Not Implemented",
                format!(
                    "This resource does not support import. Remove the import block for {}.",
                    request.type_name
                ),
            )),
            ..Default::default()
        }
    }

    async fn move_state(&self, _call: &Call, request: MoveRequest) -> MoveResponse {
        MoveResponse {
            target_state: Value::null(self.schema().ty()),
            target_private: Vec::new(),
            target_identity: None,
            diagnostics: Diagnostics::from(Diagnostic::error(
                "Unable to Move Resource State",
                format!(
                    "The target resource does not support moving state from {} {}.",
                    request.source_provider_address, request.source_type_name
                ),
            )),
        }
    }
}

/// Decodes raw state written at the current schema version. Attributes the
/// schema no longer declares are dropped.
pub fn upgrade_same_version(
    what: &str,
    current_version: i64,
    ty: &Type,
    request: &UpgradeRequest,
) -> UpgradeResponse {
    let mut diagnostics = Diagnostics::new();
    if request.version != current_version {
        diagnostics.add_error(
            format!("Unable to Upgrade Resource {}", capitalize(what)),
            format!(
                "The stored {} is at version {} but the schema is at version {} and no upgrade is implemented.",
                what, request.version, current_version
            ),
        );
        return UpgradeResponse {
            value: Value::null(ty.clone()),
            diagnostics,
        };
    }
    let options = JsonOptions {
        ignore_undefined_attributes: true,
    };
    match request.raw.decode(ty, options) {
        Ok(value) => UpgradeResponse { value, diagnostics },
        Err(e) => {
            diagnostics.push(e.into_diagnostic());
            UpgradeResponse {
                value: Value::null(ty.clone()),
                diagnostics,
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct ReadDataRequest {
    pub config: Value,
    pub provider_meta: Value,
}

pub struct ReadDataResponse {
    pub state: Value,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

/// Data source behavior
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    async fn validate(&self, _call: &Call, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    async fn read(&self, call: &Call, request: ReadDataRequest) -> ReadDataResponse;
}

pub struct OpenRequest {
    pub config: Value,
}

pub struct OpenResponse {
    pub result: Value,
    pub renew_at: Option<DateTime<Utc>>,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct RenewRequest {
    pub private: Vec<u8>,
}

#[derive(Default)]
pub struct RenewResponse {
    pub renew_at: Option<DateTime<Utc>>,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

pub struct CloseRequest {
    pub private: Vec<u8>,
}

/// Ephemeral resource behavior
#[async_trait]
pub trait EphemeralHandler: Send + Sync {
    fn schema(&self) -> Schema;

    async fn validate(&self, _call: &Call, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    async fn open(&self, call: &Call, request: OpenRequest) -> OpenResponse;

    async fn renew(&self, _call: &Call, request: RenewRequest) -> RenewResponse {
        RenewResponse {
            private: request.private,
            ..Default::default()
        }
    }

    async fn close(&self, _call: &Call, _request: CloseRequest) -> Diagnostics {
        Diagnostics::new()
    }
}

/// Provider-defined function
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    fn definition(&self) -> FunctionDefinition;

    /// Arguments arrive flattened, variadic arguments after the fixed ones.
    async fn call(
        &self,
        call: &Call,
        arguments: Vec<Value>,
    ) -> std::result::Result<Value, FunctionError>;
}

#[derive(Default)]
pub struct ActionPlanResponse {
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

/// Action behavior
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn schema(&self) -> Schema;

    async fn validate(&self, _call: &Call, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    async fn plan(&self, _call: &Call, _config: &Value) -> ActionPlanResponse {
        ActionPlanResponse::default()
    }

    async fn invoke(&self, call: &Call, config: Value, progress: ProgressSink) -> Diagnostics;
}

struct Configured {
    config: Value,
    data: Option<ProviderData>,
    deferred: Option<Deferred>,
}

/// Protocol 6 server dispatching to registered handlers.
pub struct LowLevelServer {
    provider: Arc<dyn ProviderHandler>,
    resources: BTreeMap<String, Arc<dyn ResourceHandler>>,
    data_sources: BTreeMap<String, Arc<dyn DataSourceHandler>>,
    ephemeral_resources: BTreeMap<String, Arc<dyn EphemeralHandler>>,
    functions: BTreeMap<String, Arc<dyn FunctionHandler>>,
    actions: BTreeMap<String, Arc<dyn ActionHandler>>,
    configured: RwLock<Option<Configured>>,
    lifecycle: EphemeralLifecycle,
    stop: RwLock<Context>,
}

impl LowLevelServer {
    pub fn new(provider: Arc<dyn ProviderHandler>) -> Self {
        Self {
            provider,
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            ephemeral_resources: BTreeMap::new(),
            functions: BTreeMap::new(),
            actions: BTreeMap::new(),
            configured: RwLock::new(None),
            lifecycle: EphemeralLifecycle::new(),
            stop: RwLock::new(Context::new()),
        }
    }

    pub fn resource(mut self, type_name: &str, handler: Arc<dyn ResourceHandler>) -> Self {
        self.resources.insert(type_name.to_string(), handler);
        self
    }

    pub fn data_source(mut self, type_name: &str, handler: Arc<dyn DataSourceHandler>) -> Self {
        self.data_sources.insert(type_name.to_string(), handler);
        self
    }

    pub fn ephemeral_resource(
        mut self,
        type_name: &str,
        handler: Arc<dyn EphemeralHandler>,
    ) -> Self {
        self.ephemeral_resources
            .insert(type_name.to_string(), handler);
        self
    }

    pub fn function(mut self, name: &str, handler: Arc<dyn FunctionHandler>) -> Self {
        self.functions.insert(name.to_string(), handler);
        self
    }

    pub fn action(mut self, type_name: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.insert(type_name.to_string(), handler);
        self
    }

    /// The ephemeral instance registry, for inspection.
    pub fn lifecycle(&self) -> &EphemeralLifecycle {
        &self.lifecycle
    }

    /// Derives the handler context for one RPC. StopProvider cancels it.
    async fn scoped(&self, ctx: &Context) -> Context {
        let scoped = ctx.child();
        scoped.cancel_on(&*self.stop.read().await);
        scoped
    }

    async fn call(&self, ctx: &Context, client_capabilities: ClientCapabilities) -> Call {
        let ctx = self.scoped(ctx).await;
        let configured = self.configured.read().await;
        match configured.as_ref() {
            Some(c) => Call {
                ctx,
                provider_config: c.config.clone(),
                provider_data: c.data.clone(),
                client_capabilities,
            },
            None => Call {
                ctx,
                provider_config: Value::null(self.provider.schema().ty()),
                provider_data: None,
                client_capabilities,
            },
        }
    }

    /// The deferral forced by an unknown provider configuration, if the
    /// client accepts deferrals.
    async fn provider_deferred(&self, capabilities: &ClientCapabilities) -> Option<Deferred> {
        if !capabilities.deferral_allowed {
            return None;
        }
        self.configured.read().await.as_ref().and_then(|c| c.deferred)
    }

    fn resource_handler(&self, type_name: &str) -> Result<&Arc<dyn ResourceHandler>> {
        self.resources
            .get(type_name)
            .ok_or_else(|| PlugkitError::ResourceNotFound(type_name.to_string()))
    }

    fn data_source_handler(&self, type_name: &str) -> Result<&Arc<dyn DataSourceHandler>> {
        self.data_sources
            .get(type_name)
            .ok_or_else(|| PlugkitError::DataSourceNotFound(type_name.to_string()))
    }

    fn ephemeral_handler(&self, type_name: &str) -> Result<&Arc<dyn EphemeralHandler>> {
        self.ephemeral_resources
            .get(type_name)
            .ok_or_else(|| PlugkitError::EphemeralResourceNotFound(type_name.to_string()))
    }

    fn action_handler(&self, type_name: &str) -> Result<&Arc<dyn ActionHandler>> {
        self.actions
            .get(type_name)
            .ok_or_else(|| PlugkitError::ActionNotFound(type_name.to_string()))
    }

    fn meta_type(&self) -> Type {
        self.provider
            .meta_schema()
            .map(|s| s.ty())
            .unwrap_or_else(|| Type::Object(BTreeMap::new()))
    }

    fn decode_meta(&self, meta: &Option<DynamicValue>) -> std::result::Result<Value, Diagnostic> {
        let ty = self.meta_type();
        match meta {
            Some(dv) => decode(dv, &ty),
            None => Ok(Value::null(ty)),
        }
    }
}

fn decode(value: &DynamicValue, ty: &Type) -> std::result::Result<Value, Diagnostic> {
    value.decode(ty).map_err(PlugkitError::into_diagnostic)
}

fn decode_identity(
    identity: &Option<DynamicValue>,
    schema: Option<&IdentitySchema>,
) -> std::result::Result<Option<Value>, Diagnostic> {
    match (identity, schema) {
        (Some(dv), Some(schema)) => decode(dv, &schema.ty()).map(Some),
        _ => Ok(None),
    }
}

/// Encodes an outgoing state, nulling write-only attributes first.
fn encode_state(
    value: Value,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> Option<DynamicValue> {
    let ty = schema.ty();
    if !value.conforms_to(&ty) {
        diagnostics.add_error(
            "Invalid State Value",
            format!(
                "The provider returned a value of type {} where the schema requires {}.",
                value.ty(),
                ty
            ),
        );
        return None;
    }
    encode(&schema.null_write_only(value), &ty, diagnostics)
}

fn encode(value: &Value, ty: &Type, diagnostics: &mut Diagnostics) -> Option<DynamicValue> {
    match DynamicValue::encode(value, ty) {
        Ok(dv) => Some(dv),
        Err(e) => {
            diagnostics.push(e.into_diagnostic());
            None
        }
    }
}

fn encode_identity(
    identity: Option<Value>,
    schema: Option<&IdentitySchema>,
    diagnostics: &mut Diagnostics,
) -> Option<DynamicValue> {
    let (identity, schema) = (identity?, schema?);
    encode(&identity, &schema.ty(), diagnostics)
}

/// Rejects a deferred response the client did not ask for.
fn gate_deferred(
    deferred: Option<Deferred>,
    capabilities: &ClientCapabilities,
    diagnostics: &mut Diagnostics,
) -> Option<Deferred> {
    match deferred {
        Some(_) if !capabilities.deferral_allowed => {
            diagnostics.add_error(
                "Invalid Deferred Response",
                "The provider signaled a deferred response, but the client did not indicate support for deferred actions.",
            );
            None
        }
        other => other,
    }
}

/// Marks every computed attribute without configuration as unknown.
pub fn mark_computed_unknown(schema: &Schema, config: &Value, value: Value) -> Value {
    if value.is_null() {
        return value;
    }
    schema.transform(value, &mut |path, attr, v| {
        let configured = config.get_path(path).is_some_and(|c| !c.is_null());
        if attr.computed && !configured && !v.is_unknown() {
            Value::unknown(attr.ty.clone())
        } else {
            v
        }
    })
}

fn write_only_disallowed(schema: &Schema, config: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    schema.walk(config, &mut |path, attr, value| {
        if attr.write_only && !value.is_null() {
            diagnostics.add_attribute_error(
                path.clone(),
                "Write-only Attribute Not Allowed",
                format!(
                    "The resource contains a non-null value for write-only attribute {}. Write-only attributes are only supported by clients that advertise them.",
                    path
                ),
            );
        }
    });
    diagnostics
}

#[async_trait]
impl ProviderServer for LowLevelServer {
    async fn get_metadata(
        &self,
        _ctx: Context,
        _request: GetMetadataRequest,
    ) -> Result<GetMetadataResponse> {
        debug!(rpc = "GetMetadata", "handling request");
        let names = |keys: Vec<&String>| -> Vec<ResourceMetadata> {
            keys.into_iter()
                .map(|name| ResourceMetadata {
                    type_name: name.clone(),
                })
                .collect()
        };
        Ok(GetMetadataResponse {
            server_capabilities: self.provider.server_capabilities(),
            diagnostics: Diagnostics::new(),
            resources: names(self.resources.keys().collect()),
            data_sources: names(self.data_sources.keys().collect()),
            ephemeral_resources: names(self.ephemeral_resources.keys().collect()),
            functions: self
                .functions
                .keys()
                .map(|name| FunctionMetadata { name: name.clone() })
                .collect(),
            actions: names(self.actions.keys().collect()),
        })
    }

    async fn get_provider_schema(
        &self,
        _ctx: Context,
        _request: GetProviderSchemaRequest,
    ) -> Result<GetProviderSchemaResponse> {
        debug!(rpc = "GetProviderSchema", "handling request");
        let mut response = GetProviderSchemaResponse {
            provider: self.provider.schema(),
            provider_meta: self.provider.meta_schema(),
            resource_schemas: self
                .resources
                .iter()
                .map(|(name, h)| (name.clone(), h.schema()))
                .collect(),
            data_source_schemas: self
                .data_sources
                .iter()
                .map(|(name, h)| (name.clone(), h.schema()))
                .collect(),
            ephemeral_resource_schemas: self
                .ephemeral_resources
                .iter()
                .map(|(name, h)| (name.clone(), h.schema()))
                .collect(),
            functions: self
                .functions
                .iter()
                .map(|(name, h)| (name.clone(), h.definition()))
                .collect(),
            action_schemas: self
                .actions
                .iter()
                .map(|(name, h)| (name.clone(), h.schema()))
                .collect(),
            server_capabilities: self.provider.server_capabilities(),
            diagnostics: Diagnostics::new(),
        };

        let mut diagnostics = Diagnostics::new();
        for (label, schema) in response.all_schemas() {
            if let Err(e) = schema.validate() {
                warn!(schema = %label, error = %e, "invalid schema");
                diagnostics.add_error("Invalid Schema", format!("{}: {}", label, e));
            }
        }
        if let Some(meta) = &response.provider_meta {
            if let Err(e) = meta.validate() {
                diagnostics.add_error("Invalid Schema", format!("provider_meta: {}", e));
            }
        }
        response.diagnostics = diagnostics;
        Ok(response)
    }

    async fn get_resource_identity_schemas(
        &self,
        _ctx: Context,
        _request: GetResourceIdentitySchemasRequest,
    ) -> Result<GetResourceIdentitySchemasResponse> {
        debug!(rpc = "GetResourceIdentitySchemas", "handling request");
        let mut response = GetResourceIdentitySchemasResponse::default();
        for (name, handler) in &self.resources {
            if let Some(identity) = handler.identity_schema() {
                if let Err(e) = identity.validate() {
                    response
                        .diagnostics
                        .add_error("Invalid Identity Schema", format!("{}: {}", name, e));
                }
                response.identity_schemas.insert(name.clone(), identity);
            }
        }
        Ok(response)
    }

    async fn validate_provider_config(
        &self,
        ctx: Context,
        request: v6::ValidateProviderConfigRequest,
    ) -> Result<v6::ValidateProviderConfigResponse> {
        debug!(rpc = "ValidateProviderConfig", "handling request");
        let mut diagnostics = Diagnostics::new();
        match decode(&request.config, &self.provider.schema().ty()) {
            Ok(config) => {
                let ctx = self.scoped(&ctx).await;
                diagnostics.extend(self.provider.validate(&ctx, &config).await);
            }
            Err(d) => diagnostics.push(d),
        }
        Ok(v6::ValidateProviderConfigResponse { diagnostics })
    }

    async fn configure_provider(
        &self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> Result<ConfigureProviderResponse> {
        info!(
            rpc = "ConfigureProvider",
            terraform_version = %request.terraform_version,
            "configuring provider"
        );
        let mut diagnostics = Diagnostics::new();
        let config = match decode(&request.config, &self.provider.schema().ty()) {
            Ok(config) => config,
            Err(d) => {
                diagnostics.push(d);
                return Ok(ConfigureProviderResponse { diagnostics });
            }
        };

        let ctx = self.scoped(&ctx).await;
        let response = self
            .provider
            .configure(
                &ctx,
                ConfigureRequest {
                    terraform_version: request.terraform_version,
                    config: config.clone(),
                    client_capabilities: request.client_capabilities,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        if response.deferred.is_some() && !request.client_capabilities.deferral_allowed {
            diagnostics.add_error(
                "Invalid Deferred Provider Response",
                "The provider signaled a deferred response during configuration, but the client did not indicate support for deferred actions.",
            );
        }

        if !diagnostics.has_errors() {
            *self.configured.write().await = Some(Configured {
                config,
                data: response.provider_data,
                deferred: response.deferred,
            });
        }
        Ok(ConfigureProviderResponse { diagnostics })
    }

    async fn stop_provider(
        &self,
        _ctx: Context,
        _request: StopProviderRequest,
    ) -> Result<StopProviderResponse> {
        info!(rpc = "StopProvider", "cancelling in-flight requests");
        let mut stop = self.stop.write().await;
        stop.cancel();
        *stop = Context::new();
        Ok(StopProviderResponse::default())
    }

    async fn validate_resource_config(
        &self,
        ctx: Context,
        request: v6::ValidateResourceConfigRequest,
    ) -> Result<v6::ValidateResourceConfigResponse> {
        debug!(rpc = "ValidateResourceConfig", type_name = %request.type_name, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let schema = handler.schema();
        let mut diagnostics = Diagnostics::new();
        match decode(&request.config, &schema.ty()) {
            Ok(config) => {
                if !request.client_capabilities.write_only_attributes_allowed {
                    diagnostics.extend(write_only_disallowed(&schema, &config));
                }
                let call = self.call(&ctx, request.client_capabilities).await;
                diagnostics.extend(handler.validate(&call, &config).await);
            }
            Err(d) => diagnostics.push(d),
        }
        Ok(v6::ValidateResourceConfigResponse { diagnostics })
    }

    async fn upgrade_resource_state(
        &self,
        ctx: Context,
        request: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse> {
        debug!(
            rpc = "UpgradeResourceState",
            type_name = %request.type_name,
            version = request.version,
            "handling request"
        );
        let handler = self.resource_handler(&request.type_name)?;
        let schema = handler.schema();
        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let upgraded = handler
            .upgrade_state(
                &call,
                UpgradeRequest {
                    version: request.version,
                    raw: request.raw_state,
                },
            )
            .await;

        let mut diagnostics = upgraded.diagnostics;
        let upgraded_state = if diagnostics.has_errors() {
            None
        } else {
            encode_state(upgraded.value, &schema, &mut diagnostics)
        };
        Ok(UpgradeResourceStateResponse {
            upgraded_state,
            diagnostics,
        })
    }

    async fn upgrade_resource_identity(
        &self,
        ctx: Context,
        request: UpgradeResourceIdentityRequest,
    ) -> Result<UpgradeResourceIdentityResponse> {
        debug!(rpc = "UpgradeResourceIdentity", type_name = %request.type_name, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let identity_schema = handler.identity_schema();
        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let upgraded = handler
            .upgrade_identity(
                &call,
                UpgradeRequest {
                    version: request.version,
                    raw: request.raw_identity,
                },
            )
            .await;

        let mut diagnostics = upgraded.diagnostics;
        let upgraded_identity = if diagnostics.has_errors() {
            None
        } else {
            encode_identity(Some(upgraded.value), identity_schema.as_ref(), &mut diagnostics)
        };
        Ok(UpgradeResourceIdentityResponse {
            upgraded_identity,
            diagnostics,
        })
    }

    async fn read_resource(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse> {
        debug!(rpc = "ReadResource", type_name = %request.type_name, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let schema = handler.schema();
        let identity_schema = handler.identity_schema();
        let mut diagnostics = Diagnostics::new();

        let decoded = decode(&request.current_state, &schema.ty()).and_then(|state| {
            Ok((
                state,
                self.decode_meta(&request.provider_meta)?,
                decode_identity(&request.current_identity, identity_schema.as_ref())?,
            ))
        });
        let (current_state, provider_meta, current_identity) = match decoded {
            Ok(decoded) => decoded,
            Err(d) => {
                diagnostics.push(d);
                return Ok(ReadResourceResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };

        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            return Ok(ReadResourceResponse {
                new_state: Some(request.current_state),
                private: request.private,
                deferred: Some(deferred),
                new_identity: request.current_identity,
                diagnostics,
            });
        }

        let call = self.call(&ctx, request.client_capabilities).await;
        let response = handler
            .read(
                &call,
                ReadRequest {
                    current_state,
                    private: request.private,
                    provider_meta,
                    current_identity,
                },
            )
            .await;

        diagnostics.extend(response.diagnostics);
        let deferred = gate_deferred(
            response.deferred,
            &request.client_capabilities,
            &mut diagnostics,
        );
        let new_state = encode_state(response.new_state, &schema, &mut diagnostics);
        let new_identity =
            encode_identity(response.new_identity, identity_schema.as_ref(), &mut diagnostics);
        Ok(ReadResourceResponse {
            new_state,
            diagnostics,
            private: response.private,
            deferred,
            new_identity,
        })
    }

    async fn plan_resource_change(
        &self,
        ctx: Context,
        request: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse> {
        debug!(rpc = "PlanResourceChange", type_name = %request.type_name, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let schema = handler.schema();
        let identity_schema = handler.identity_schema();
        let ty = schema.ty();
        let mut diagnostics = Diagnostics::new();

        let decoded = (|| {
            Ok::<_, Diagnostic>(PlanRequest {
                prior_state: decode(&request.prior_state, &ty)?,
                proposed_new_state: decode(&request.proposed_new_state, &ty)?,
                config: decode(&request.config, &ty)?,
                prior_private: request.prior_private.clone(),
                provider_meta: self.decode_meta(&request.provider_meta)?,
                prior_identity: decode_identity(&request.prior_identity, identity_schema.as_ref())?,
            })
        })();
        let plan_request = match decoded {
            Ok(r) => r,
            Err(d) => {
                diagnostics.push(d);
                return Ok(PlanResourceChangeResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };

        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            let planned = mark_computed_unknown(
                &schema,
                &plan_request.config,
                plan_request.proposed_new_state,
            );
            return Ok(PlanResourceChangeResponse {
                planned_state: encode_state(planned, &schema, &mut diagnostics),
                planned_private: request.prior_private,
                deferred: Some(deferred),
                planned_identity: request.prior_identity,
                diagnostics,
                ..Default::default()
            });
        }

        let call = self.call(&ctx, request.client_capabilities).await;
        let response = handler.plan(&call, plan_request).await;
        diagnostics.extend(response.diagnostics);
        let deferred = gate_deferred(
            response.deferred,
            &request.client_capabilities,
            &mut diagnostics,
        );
        let planned_state = encode_state(response.planned_state, &schema, &mut diagnostics);
        let planned_identity = encode_identity(
            response.planned_identity,
            identity_schema.as_ref(),
            &mut diagnostics,
        );
        Ok(PlanResourceChangeResponse {
            planned_state,
            requires_replace: response.requires_replace,
            planned_private: response.planned_private,
            diagnostics,
            deferred,
            planned_identity,
        })
    }

    async fn apply_resource_change(
        &self,
        ctx: Context,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse> {
        debug!(rpc = "ApplyResourceChange", type_name = %request.type_name, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let schema = handler.schema();
        let identity_schema = handler.identity_schema();
        let ty = schema.ty();
        let mut diagnostics = Diagnostics::new();

        let decoded = (|| {
            Ok::<_, Diagnostic>(ApplyRequest {
                prior_state: decode(&request.prior_state, &ty)?,
                planned_state: decode(&request.planned_state, &ty)?,
                config: decode(&request.config, &ty)?,
                planned_private: request.planned_private.clone(),
                provider_meta: self.decode_meta(&request.provider_meta)?,
                planned_identity: decode_identity(
                    &request.planned_identity,
                    identity_schema.as_ref(),
                )?,
            })
        })();
        let apply_request = match decoded {
            Ok(r) => r,
            Err(d) => {
                diagnostics.push(d);
                return Ok(ApplyResourceChangeResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };

        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let response = handler.apply(&call, apply_request).await;
        diagnostics.extend(response.diagnostics);
        let new_state = encode_state(response.new_state, &schema, &mut diagnostics);
        let new_identity =
            encode_identity(response.new_identity, identity_schema.as_ref(), &mut diagnostics);
        Ok(ApplyResourceChangeResponse {
            new_state,
            private: response.private,
            diagnostics,
            new_identity,
        })
    }

    async fn import_resource_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse> {
        debug!(rpc = "ImportResourceState", type_name = %request.type_name, id = %request.id, "handling request");
        let handler = self.resource_handler(&request.type_name)?;
        let identity_schema = handler.identity_schema();
        let mut diagnostics = Diagnostics::new();

        let identity = match decode_identity(&request.identity, identity_schema.as_ref()) {
            Ok(identity) => identity,
            Err(d) => {
                diagnostics.push(d);
                return Ok(ImportResourceStateResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };
        if request.identity.is_some() && identity_schema.is_none() {
            diagnostics.add_error(
                "Resource Identity Not Supported",
                format!(
                    "{} does not declare an identity schema and cannot be imported by identity.",
                    request.type_name
                ),
            );
            return Ok(ImportResourceStateResponse {
                diagnostics,
                ..Default::default()
            });
        }

        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            let schema = handler.schema();
            let unknown = Value::unknown(schema.ty());
            return Ok(ImportResourceStateResponse {
                imported_resources: vec![ImportedResource {
                    type_name: request.type_name.clone(),
                    state: encode(&unknown, &schema.ty(), &mut diagnostics).unwrap_or_default(),
                    private: Vec::new(),
                    identity: request.identity,
                }],
                diagnostics,
                deferred: Some(deferred),
            });
        }

        let call = self.call(&ctx, request.client_capabilities).await;
        let response = handler
            .import(
                &call,
                ImportRequest {
                    type_name: request.type_name.clone(),
                    id: request.id,
                    identity,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        let deferred = gate_deferred(
            response.deferred,
            &request.client_capabilities,
            &mut diagnostics,
        );

        let mut imported_resources = Vec::new();
        for imported in response.imported {
            let Some(target) = self.resources.get(&imported.type_name) else {
                diagnostics.push(
                    PlugkitError::ResourceNotFound(imported.type_name.clone()).into_diagnostic(),
                );
                continue;
            };
            let schema = target.schema();
            let target_identity = target.identity_schema();
            let Some(state) = encode_state(imported.state, &schema, &mut diagnostics) else {
                continue;
            };
            imported_resources.push(ImportedResource {
                type_name: imported.type_name,
                state,
                private: imported.private,
                identity: encode_identity(
                    imported.identity,
                    target_identity.as_ref(),
                    &mut diagnostics,
                ),
            });
        }
        Ok(ImportResourceStateResponse {
            imported_resources,
            diagnostics,
            deferred,
        })
    }

    async fn move_resource_state(
        &self,
        ctx: Context,
        request: MoveResourceStateRequest,
    ) -> Result<MoveResourceStateResponse> {
        debug!(
            rpc = "MoveResourceState",
            source_type_name = %request.source_type_name,
            type_name = %request.target_type_name,
            "handling request"
        );
        let handler = self.resource_handler(&request.target_type_name)?;
        let schema = handler.schema();
        let identity_schema = handler.identity_schema();
        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let response = handler
            .move_state(
                &call,
                MoveRequest {
                    source_provider_address: request.source_provider_address,
                    source_type_name: request.source_type_name,
                    source_schema_version: request.source_schema_version,
                    source_state: request.source_state,
                    source_private: request.source_private,
                    source_identity: request.source_identity,
                    source_identity_schema_version: request.source_identity_schema_version,
                },
            )
            .await;

        let mut diagnostics = response.diagnostics;
        if diagnostics.has_errors() {
            return Ok(MoveResourceStateResponse {
                diagnostics,
                ..Default::default()
            });
        }
        let target_state = encode_state(response.target_state, &schema, &mut diagnostics);
        let target_identity = encode_identity(
            response.target_identity,
            identity_schema.as_ref(),
            &mut diagnostics,
        );
        Ok(MoveResourceStateResponse {
            target_state,
            diagnostics,
            target_private: response.target_private,
            target_identity,
        })
    }

    async fn validate_data_resource_config(
        &self,
        ctx: Context,
        request: v6::ValidateDataResourceConfigRequest,
    ) -> Result<v6::ValidateDataResourceConfigResponse> {
        debug!(rpc = "ValidateDataResourceConfig", type_name = %request.type_name, "handling request");
        let handler = self.data_source_handler(&request.type_name)?;
        let mut diagnostics = Diagnostics::new();
        match decode(&request.config, &handler.schema().ty()) {
            Ok(config) => {
                let call = self.call(&ctx, ClientCapabilities::default()).await;
                diagnostics.extend(handler.validate(&call, &config).await);
            }
            Err(d) => diagnostics.push(d),
        }
        Ok(v6::ValidateDataResourceConfigResponse { diagnostics })
    }

    async fn read_data_source(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse> {
        debug!(rpc = "ReadDataSource", type_name = %request.type_name, "handling request");
        let handler = self.data_source_handler(&request.type_name)?;
        let schema = handler.schema();
        let mut diagnostics = Diagnostics::new();

        let decoded = decode(&request.config, &schema.ty())
            .and_then(|config| Ok((config, self.decode_meta(&request.provider_meta)?)));
        let (config, provider_meta) = match decoded {
            Ok(decoded) => decoded,
            Err(d) => {
                diagnostics.push(d);
                return Ok(ReadDataSourceResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };

        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            return Ok(ReadDataSourceResponse {
                state: encode(&Value::unknown(schema.ty()), &schema.ty(), &mut diagnostics),
                diagnostics,
                deferred: Some(deferred),
            });
        }

        let call = self.call(&ctx, request.client_capabilities).await;
        let response = handler
            .read(
                &call,
                ReadDataRequest {
                    config,
                    provider_meta,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        let deferred = gate_deferred(
            response.deferred,
            &request.client_capabilities,
            &mut diagnostics,
        );
        let state = encode_state(response.state, &schema, &mut diagnostics);
        Ok(ReadDataSourceResponse {
            state,
            diagnostics,
            deferred,
        })
    }

    async fn validate_ephemeral_resource_config(
        &self,
        ctx: Context,
        request: ValidateEphemeralResourceConfigRequest,
    ) -> Result<ValidateEphemeralResourceConfigResponse> {
        debug!(rpc = "ValidateEphemeralResourceConfig", type_name = %request.type_name, "handling request");
        let handler = self.ephemeral_handler(&request.type_name)?;
        let mut diagnostics = Diagnostics::new();
        match decode(&request.config, &handler.schema().ty()) {
            Ok(config) => {
                let call = self.call(&ctx, ClientCapabilities::default()).await;
                diagnostics.extend(handler.validate(&call, &config).await);
            }
            Err(d) => diagnostics.push(d),
        }
        Ok(ValidateEphemeralResourceConfigResponse { diagnostics })
    }

    async fn open_ephemeral_resource(
        &self,
        ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> Result<OpenEphemeralResourceResponse> {
        debug!(rpc = "OpenEphemeralResource", type_name = %request.type_name, "handling request");
        let handler = self.ephemeral_handler(&request.type_name)?;
        let schema = handler.schema();
        let mut diagnostics = Diagnostics::new();
        let config = match decode(&request.config, &schema.ty()) {
            Ok(config) => config,
            Err(d) => {
                diagnostics.push(d);
                return Ok(OpenEphemeralResourceResponse {
                    diagnostics,
                    ..Default::default()
                });
            }
        };

        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            return Ok(OpenEphemeralResourceResponse {
                result: encode(&Value::unknown(schema.ty()), &schema.ty(), &mut diagnostics),
                diagnostics,
                deferred: Some(deferred),
                ..Default::default()
            });
        }

        let call = self.call(&ctx, request.client_capabilities).await;
        let opened = self
            .lifecycle
            .open(handler.as_ref(), &call, &request.type_name, config)
            .await;
        diagnostics.extend(opened.diagnostics);
        let deferred = gate_deferred(opened.deferred, &request.client_capabilities, &mut diagnostics);
        if diagnostics.has_errors() {
            return Ok(OpenEphemeralResourceResponse {
                diagnostics,
                ..Default::default()
            });
        }
        let result = encode_state(opened.result, &schema, &mut diagnostics);
        Ok(OpenEphemeralResourceResponse {
            diagnostics,
            renew_at: opened.renew_at,
            result,
            private: Some(opened.private),
            deferred,
        })
    }

    async fn renew_ephemeral_resource(
        &self,
        ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> Result<RenewEphemeralResourceResponse> {
        debug!(rpc = "RenewEphemeralResource", type_name = %request.type_name, "handling request");
        let handler = self.ephemeral_handler(&request.type_name)?;
        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let renewed = self
            .lifecycle
            .renew(
                handler.as_ref(),
                &call,
                &request.type_name,
                request.private.unwrap_or_default(),
            )
            .await;
        Ok(RenewEphemeralResourceResponse {
            diagnostics: renewed.diagnostics,
            renew_at: renewed.renew_at,
            private: Some(renewed.private),
        })
    }

    async fn close_ephemeral_resource(
        &self,
        ctx: Context,
        request: CloseEphemeralResourceRequest,
    ) -> Result<CloseEphemeralResourceResponse> {
        debug!(rpc = "CloseEphemeralResource", type_name = %request.type_name, "handling request");
        let handler = self.ephemeral_handler(&request.type_name)?;
        let call = self.call(&ctx, ClientCapabilities::default()).await;
        let diagnostics = self
            .lifecycle
            .close(
                handler.as_ref(),
                &call,
                &request.type_name,
                request.private.unwrap_or_default(),
            )
            .await;
        Ok(CloseEphemeralResourceResponse { diagnostics })
    }

    async fn get_functions(
        &self,
        _ctx: Context,
        _request: GetFunctionsRequest,
    ) -> Result<GetFunctionsResponse> {
        debug!(rpc = "GetFunctions", "handling request");
        Ok(GetFunctionsResponse {
            functions: self
                .functions
                .iter()
                .map(|(name, h)| (name.clone(), h.definition()))
                .collect(),
            diagnostics: Diagnostics::new(),
        })
    }

    async fn call_function(
        &self,
        ctx: Context,
        request: CallFunctionRequest,
    ) -> Result<CallFunctionResponse> {
        debug!(rpc = "CallFunction", name = %request.name, "handling request");
        let Some(handler) = self.functions.get(&request.name) else {
            return Ok(CallFunctionResponse {
                result: None,
                error: Some(FunctionError::new(format!(
                    "Function {:?} is not implemented by this provider.",
                    request.name
                ))),
            });
        };
        let definition = handler.definition();

        let arguments = match decode_arguments(&definition, &request.arguments) {
            Ok(arguments) => arguments,
            Err(error) => {
                return Ok(CallFunctionResponse {
                    result: None,
                    error: Some(error),
                })
            }
        };

        // Unknown arguments to parameters that do not accept them make the
        // whole result unknown without running the function.
        let unknown_argument = arguments.iter().enumerate().any(|(i, arg)| {
            !arg.is_wholly_known()
                && definition
                    .parameter_for(i)
                    .is_some_and(|p| !p.allow_unknown_values)
        });
        let result = if unknown_argument {
            Ok(Value::unknown(definition.return_type.clone()))
        } else {
            let call = self.call(&ctx, ClientCapabilities::default()).await;
            handler.call(&call, arguments).await
        };

        match result {
            Ok(value) if value.conforms_to(&definition.return_type) => {
                let mut diagnostics = Diagnostics::new();
                match encode(&value, &definition.return_type, &mut diagnostics) {
                    Some(result) => Ok(CallFunctionResponse {
                        result: Some(result),
                        error: None,
                    }),
                    None => Ok(CallFunctionResponse {
                        result: None,
                        error: Some(FunctionError::new(
                            diagnostics
                                .iter()
                                .map(|d| d.detail.clone())
                                .collect::<Vec<_>>()
                                .join("; "),
                        )),
                    }),
                }
            }
            Ok(value) => Ok(CallFunctionResponse {
                result: None,
                error: Some(FunctionError::new(format!(
                    "Function returned a value of type {}, but its definition declares {}.",
                    value.ty(),
                    definition.return_type
                ))),
            }),
            Err(error) => Ok(CallFunctionResponse {
                result: None,
                error: Some(error),
            }),
        }
    }

    async fn validate_action_config(
        &self,
        ctx: Context,
        request: ValidateActionConfigRequest,
    ) -> Result<ValidateActionConfigResponse> {
        debug!(rpc = "ValidateActionConfig", action_type = %request.action_type, "handling request");
        let handler = self.action_handler(&request.action_type)?;
        let mut diagnostics = Diagnostics::new();
        match decode(&request.config, &handler.schema().ty()) {
            Ok(config) => {
                let call = self.call(&ctx, ClientCapabilities::default()).await;
                diagnostics.extend(handler.validate(&call, &config).await);
            }
            Err(d) => diagnostics.push(d),
        }
        Ok(ValidateActionConfigResponse { diagnostics })
    }

    async fn plan_action(
        &self,
        ctx: Context,
        request: PlanActionRequest,
    ) -> Result<PlanActionResponse> {
        debug!(rpc = "PlanAction", action_type = %request.action_type, "handling request");
        let handler = self.action_handler(&request.action_type)?;
        let mut diagnostics = Diagnostics::new();
        let config = match decode(&request.config, &handler.schema().ty()) {
            Ok(config) => config,
            Err(d) => {
                diagnostics.push(d);
                return Ok(PlanActionResponse {
                    diagnostics,
                    deferred: None,
                });
            }
        };
        if let Some(deferred) = self.provider_deferred(&request.client_capabilities).await {
            return Ok(PlanActionResponse {
                diagnostics,
                deferred: Some(deferred),
            });
        }
        let call = self.call(&ctx, request.client_capabilities).await;
        let response = handler.plan(&call, &config).await;
        diagnostics.extend(response.diagnostics);
        let deferred = gate_deferred(
            response.deferred,
            &request.client_capabilities,
            &mut diagnostics,
        );
        Ok(PlanActionResponse {
            diagnostics,
            deferred,
        })
    }

    async fn invoke_action(
        &self,
        ctx: Context,
        request: InvokeActionRequest,
    ) -> Result<InvokeActionResponse> {
        info!(rpc = "InvokeAction", action_type = %request.action_type, "invoking action");
        let handler = Arc::clone(self.action_handler(&request.action_type)?);
        let decoded = decode(&request.config, &handler.schema().ty()).and_then(|config| {
            if config.is_wholly_known() {
                Ok(config)
            } else {
                Err(PlugkitError::UnknownValue(
                    "actions cannot be invoked with unknown configuration values".to_string(),
                )
                .into_diagnostic())
            }
        });
        let call = self.call(&ctx, request.client_capabilities).await;
        let events = action::spawn_invocation(
            call.ctx.clone(),
            &request.action_type,
            move |progress| async move {
                match decoded {
                    Ok(config) => handler.invoke(&call, config, progress).await,
                    Err(d) => Diagnostics::from(d),
                }
            },
        );
        Ok(InvokeActionResponse { events })
    }
}

/// Decodes function arguments against the definition, reporting the first
/// failing argument.
fn decode_arguments(
    definition: &FunctionDefinition,
    arguments: &[DynamicValue],
) -> std::result::Result<Vec<Value>, FunctionError> {
    let fixed = definition.parameters.len();
    if arguments.len() < fixed
        || (definition.variadic_parameter.is_none() && arguments.len() > fixed)
    {
        return Err(FunctionError::new(format!(
            "Function expects {}{} arguments, received {}.",
            if definition.variadic_parameter.is_some() {
                "at least "
            } else {
                ""
            },
            fixed,
            arguments.len()
        )));
    }

    let mut decoded = Vec::with_capacity(arguments.len());
    for (i, argument) in arguments.iter().enumerate() {
        let Some(parameter) = definition.parameter_for(i) else {
            return Err(FunctionError::argument(i, "Unexpected argument."));
        };
        let value = argument.decode(&parameter.ty).map_err(|e| {
            FunctionError::argument(
                i,
                format!("Invalid value for {:?} parameter: {}", parameter.name, e),
            )
        })?;
        if value.is_null() && !parameter.allow_null_value {
            return Err(FunctionError::argument(
                i,
                format!(
                    "Invalid value for {:?} parameter: argument must not be null.",
                    parameter.name
                ),
            ));
        }
        decoded.push(value);
    }
    Ok(decoded)
}
