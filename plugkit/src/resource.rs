//! Resource trait and related types
//!
//! Resources see typed [`Value`]s only. The framework has already decoded
//! the request, applied defaults and plan modifiers, and will null out
//! write-only attributes and check consistency of whatever comes back.

use crate::context::Context;
use crate::schema::{IdentitySchema, Schema};
use crate::types::{AttributePath, ClientCapabilities, Deferred, Diagnostics, PrivateStateData};
use crate::validator::ConfigValidator;
use crate::value::{Type, Value};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Base trait for resources - implement CRUD operations
/// Type name should be constant and match the key in Provider.resources()
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name should be constant (e.g., "corner_user")
    /// MUST match the key used in Provider.resources()
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context, request: ResourceSchemaRequest) -> ResourceSchemaResponse;

    /// Resources that can be addressed by identity return its schema here
    fn identity_schema(&self) -> Option<IdentitySchema> {
        None
    }

    /// Called immediately after the factory creates the resource
    /// Use this to store API clients, credentials, etc. from the provider
    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        ConfigureResourceResponse::default()
    }

    /// Whole-configuration validators run after attribute validators
    fn config_validators(&self) -> Vec<Arc<dyn ConfigValidator>> {
        Vec::new()
    }

    /// Called during validate and plan after all declarative validation
    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse::default()
    }

    /// Called AFTER the framework's automatic planning (defaults, unknown
    /// computed values, attribute plan modifiers)
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        ModifyPlanResponse {
            planned_state: request.planned_state,
            requires_replace: Vec::new(),
            planned_private: request.prior_private,
            diagnostics: Diagnostics::new(),
            deferred: None,
        }
    }

    /// MUST populate all attributes in response.new_state (including computed)
    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse;

    /// MUST return accurate current state or None if the resource doesn't exist
    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse;

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse;

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse;

    /// Parse the ID or identity and populate enough state for a read
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse::default();
        response.diagnostics.add_error(
            "Resource Import Not Implemented",
            format!(
                "This resource does not support import. Remove the import block for {}.",
                request.type_name
            ),
        );
        response
    }

    /// Single-step upgraders keyed by the version they upgrade from
    fn state_upgraders(&self) -> BTreeMap<i64, StateUpgrader> {
        BTreeMap::new()
    }

    fn identity_upgraders(&self) -> BTreeMap<i64, IdentityUpgrader> {
        BTreeMap::new()
    }

    /// Movers are tried in order; the first one that accepts the source wins
    fn state_movers(&self) -> Vec<StateMover> {
        Vec::new()
    }
}

pub struct ResourceSchemaRequest;

pub struct ResourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Diagnostics,
}

pub struct ConfigureResourceRequest {
    /// Data from ConfigureProviderResponse.provider_data
    /// Downcast to your provider's specific type
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub struct ConfigureResourceResponse {
    pub diagnostics: Diagnostics,
}

pub struct ValidateResourceConfigRequest {
    pub type_name: String,
    pub config: Value,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Default)]
pub struct ValidateResourceConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct ModifyPlanRequest {
    pub type_name: String,
    pub config: Value,
    pub prior_state: Value,
    pub planned_state: Value,
    pub prior_private: PrivateStateData,
    pub provider_meta: Value,
    pub client_capabilities: ClientCapabilities,
}

pub struct ModifyPlanResponse {
    pub planned_state: Value,
    pub requires_replace: Vec<AttributePath>,
    pub planned_private: PrivateStateData,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct CreateResourceRequest {
    pub type_name: String,
    pub planned_state: Value,
    pub config: Value,
    pub planned_private: PrivateStateData,
    pub provider_meta: Value,
}

pub struct CreateResourceResponse {
    pub new_state: Value,
    pub private: PrivateStateData,
    pub diagnostics: Diagnostics,
    /// Required when the resource declares an identity schema
    pub new_identity: Option<Value>,
}

pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: Value,
    pub private: PrivateStateData,
    pub provider_meta: Value,
    pub client_capabilities: ClientCapabilities,
    pub current_identity: Option<Value>,
}

pub struct ReadResourceResponse {
    pub new_state: Option<Value>,
    pub diagnostics: Diagnostics,
    pub private: PrivateStateData,
    pub deferred: Option<Deferred>,
    pub new_identity: Option<Value>,
}

impl ReadResourceResponse {
    /// Echoes the request, the usual starting point for a read.
    pub fn unchanged(request: &ReadResourceRequest) -> Self {
        Self {
            new_state: Some(request.current_state.clone()),
            diagnostics: Diagnostics::new(),
            private: request.private.clone(),
            deferred: None,
            new_identity: request.current_identity.clone(),
        }
    }
}

pub struct UpdateResourceRequest {
    pub type_name: String,
    pub prior_state: Value,
    pub planned_state: Value,
    pub config: Value,
    pub planned_private: PrivateStateData,
    pub provider_meta: Value,
    pub planned_identity: Option<Value>,
}

pub struct UpdateResourceResponse {
    pub new_state: Value,
    pub private: PrivateStateData,
    pub diagnostics: Diagnostics,
    pub new_identity: Option<Value>,
}

pub struct DeleteResourceRequest {
    pub type_name: String,
    pub prior_state: Value,
    pub planned_private: PrivateStateData,
    pub provider_meta: Value,
}

#[derive(Default)]
pub struct DeleteResourceResponse {
    pub diagnostics: Diagnostics,
}

pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
    pub client_capabilities: ClientCapabilities,
    pub identity: Option<Value>,
    /// Object type of the resource state, for building the imported value
    pub state_type: Type,
}

#[derive(Default)]
pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct ImportedResource {
    pub type_name: String,
    pub state: Value,
    pub private: PrivateStateData,
    pub identity: Option<Value>,
}

/// Upgrades a value from one schema version to the next.
pub type UpgradeFn = Arc<dyn Fn(Value) -> Result<Value, Diagnostics> + Send + Sync>;

/// One step of the state upgrade chain
#[derive(Clone)]
pub struct StateUpgrader {
    /// Schema the stored state was written with
    pub prior_schema: Schema,
    pub upgrade: UpgradeFn,
}

impl StateUpgrader {
    pub fn new<F>(prior_schema: Schema, upgrade: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Diagnostics> + Send + Sync + 'static,
    {
        Self {
            prior_schema,
            upgrade: Arc::new(upgrade),
        }
    }
}

/// One step of the identity upgrade chain
#[derive(Clone)]
pub struct IdentityUpgrader {
    pub prior_schema: IdentitySchema,
    pub upgrade: UpgradeFn,
}

impl IdentityUpgrader {
    pub fn new<F>(prior_schema: IdentitySchema, upgrade: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Diagnostics> + Send + Sync + 'static,
    {
        Self {
            prior_schema,
            upgrade: Arc::new(upgrade),
        }
    }
}

pub struct MoveStateRequest {
    pub source_provider_address: String,
    pub source_type_name: String,
    pub source_schema_version: i64,
    /// Decoded with the mover's source schema when it declares one
    pub source_state: Option<Value>,
    /// Undecoded source state JSON
    pub source_raw_state: Option<Vec<u8>>,
    pub source_private: PrivateStateData,
    pub source_identity: Option<Vec<u8>>,
    pub source_identity_schema_version: i64,
}

pub struct MoveStateResponse {
    pub target_state: Value,
    pub target_private: PrivateStateData,
    pub target_identity: Option<Value>,
    pub diagnostics: Diagnostics,
}

/// Decides whether it handles a source and translates its state.
pub type MoveFn = Arc<dyn Fn(&MoveStateRequest) -> Option<MoveStateResponse> + Send + Sync>;

/// Translates state from another resource type into this one
#[derive(Clone)]
pub struct StateMover {
    pub source_schema: Option<Schema>,
    /// Returns `None` when the source is not one this mover handles
    pub mover: MoveFn,
}

impl StateMover {
    pub fn new<F>(source_schema: Option<Schema>, mover: F) -> Self
    where
        F: Fn(&MoveStateRequest) -> Option<MoveStateResponse> + Send + Sync + 'static,
    {
        Self {
            source_schema,
            mover: Arc::new(mover),
        }
    }
}
