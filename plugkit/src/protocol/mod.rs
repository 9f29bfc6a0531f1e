//! Wire protocol messages
//!
//! Request and response shapes shared by protocol versions 5 and 6. The
//! version modules define the server traits and the few messages that differ
//! between versions. Values travel as [`DynamicValue`] envelopes and are only
//! decoded against a schema by the server implementations.

pub mod v5;
pub mod v6;

use crate::error::{PlugkitError, Result};
use crate::schema::{FunctionDefinition, IdentitySchema, Schema};
use crate::types::{
    AttributePath, ClientCapabilities, Deferred, Diagnostics, FunctionError, ServerCapabilities,
};
use crate::value::json::{self, JsonOptions};
use crate::value::{msgpack, Type, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_stream::wrappers::ReceiverStream;

/// A value encoded for the wire, as msgpack or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicValue {
    pub msgpack: Option<Vec<u8>>,
    pub json: Option<Vec<u8>>,
}

impl DynamicValue {
    /// Encodes `value` as msgpack at a position of type `ty`.
    pub fn encode(value: &Value, ty: &Type) -> Result<Self> {
        Ok(Self {
            msgpack: Some(msgpack::marshal(value, ty)?),
            json: None,
        })
    }

    pub fn from_json(data: Vec<u8>) -> Self {
        Self {
            msgpack: None,
            json: Some(data),
        }
    }

    /// Decodes against `ty`. An empty envelope is a null value.
    pub fn decode(&self, ty: &Type) -> Result<Value> {
        match (&self.msgpack, &self.json) {
            (Some(bytes), _) if !bytes.is_empty() => msgpack::unmarshal(bytes, ty),
            (_, Some(bytes)) if !bytes.is_empty() => json::unmarshal(bytes, ty),
            _ => Ok(Value::null(ty.clone())),
        }
    }
}

/// Persisted state as stored by the engine, before upgrade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawState {
    pub json: Option<Vec<u8>>,
    #[serde(default)]
    pub flatmap: BTreeMap<String, String>,
}

impl RawState {
    pub fn from_json(data: Vec<u8>) -> Self {
        Self {
            json: Some(data),
            flatmap: BTreeMap::new(),
        }
    }

    /// Decodes the JSON form against `ty`.
    pub fn decode(&self, ty: &Type, options: JsonOptions) -> Result<Value> {
        match &self.json {
            Some(bytes) if !bytes.is_empty() => json::unmarshal_with(bytes, ty, options),
            _ if !self.flatmap.is_empty() => Err(PlugkitError::Unsupported(
                "flatmap state from protocol version 4 and earlier".to_string(),
            )),
            _ => Ok(Value::null(ty.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMetadataRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMetadataResponse {
    pub server_capabilities: ServerCapabilities,
    pub diagnostics: Diagnostics,
    pub resources: Vec<ResourceMetadata>,
    pub data_sources: Vec<ResourceMetadata>,
    pub ephemeral_resources: Vec<ResourceMetadata>,
    pub functions: Vec<FunctionMetadata>,
    pub actions: Vec<ResourceMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetProviderSchemaRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetProviderSchemaResponse {
    pub provider: Schema,
    pub provider_meta: Option<Schema>,
    pub resource_schemas: BTreeMap<String, Schema>,
    pub data_source_schemas: BTreeMap<String, Schema>,
    pub ephemeral_resource_schemas: BTreeMap<String, Schema>,
    pub functions: BTreeMap<String, FunctionDefinition>,
    pub action_schemas: BTreeMap<String, Schema>,
    pub server_capabilities: ServerCapabilities,
    pub diagnostics: Diagnostics,
}

impl GetProviderSchemaResponse {
    /// Every schema in the bundle, labelled for diagnostics.
    pub fn all_schemas(&self) -> impl Iterator<Item = (String, &Schema)> {
        std::iter::once(("provider".to_string(), &self.provider))
            .chain(
                self.resource_schemas
                    .iter()
                    .map(|(n, s)| (format!("resource {}", n), s)),
            )
            .chain(
                self.data_source_schemas
                    .iter()
                    .map(|(n, s)| (format!("data source {}", n), s)),
            )
            .chain(
                self.ephemeral_resource_schemas
                    .iter()
                    .map(|(n, s)| (format!("ephemeral resource {}", n), s)),
            )
            .chain(
                self.action_schemas
                    .iter()
                    .map(|(n, s)| (format!("action {}", n), s)),
            )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResourceIdentitySchemasRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResourceIdentitySchemasResponse {
    pub identity_schemas: BTreeMap<String, IdentitySchema>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureProviderResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopProviderRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopProviderResponse {
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeResourceStateRequest {
    pub type_name: String,
    pub version: i64,
    pub raw_state: RawState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeResourceStateResponse {
    pub upgraded_state: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeResourceIdentityRequest {
    pub type_name: String,
    pub version: i64,
    pub raw_identity: RawState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeResourceIdentityResponse {
    pub upgraded_identity: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: DynamicValue,
    pub private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
    pub client_capabilities: ClientCapabilities,
    pub current_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResourceResponse {
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
    pub private: Vec<u8>,
    pub deferred: Option<Deferred>,
    pub new_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub proposed_new_state: DynamicValue,
    pub config: DynamicValue,
    pub prior_private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
    pub client_capabilities: ClientCapabilities,
    pub prior_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResourceChangeResponse {
    pub planned_state: Option<DynamicValue>,
    pub requires_replace: Vec<AttributePath>,
    pub planned_private: Vec<u8>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
    pub planned_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
    pub planned_private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
    pub planned_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResourceChangeResponse {
    pub new_state: Option<DynamicValue>,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
    pub new_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
    pub client_capabilities: ClientCapabilities,
    pub identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: DynamicValue,
    pub private: Vec<u8>,
    pub identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveResourceStateRequest {
    pub source_provider_address: String,
    pub source_type_name: String,
    pub source_schema_version: i64,
    pub source_state: RawState,
    pub target_type_name: String,
    pub source_private: Vec<u8>,
    pub source_identity: Option<RawState>,
    pub source_identity_schema_version: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveResourceStateResponse {
    pub target_state: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
    pub target_private: Vec<u8>,
    pub target_identity: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
    pub provider_meta: Option<DynamicValue>,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadDataSourceResponse {
    pub state: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateEphemeralResourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateEphemeralResourceConfigResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenEphemeralResourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
    pub renew_at: Option<DateTime<Utc>>,
    pub result: Option<DynamicValue>,
    pub private: Option<Vec<u8>>,
    pub deferred: Option<Deferred>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenewEphemeralResourceRequest {
    pub type_name: String,
    pub private: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenewEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
    pub renew_at: Option<DateTime<Utc>>,
    pub private: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseEphemeralResourceRequest {
    pub type_name: String,
    pub private: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetFunctionsRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetFunctionsResponse {
    pub functions: BTreeMap<String, FunctionDefinition>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallFunctionRequest {
    pub name: String,
    pub arguments: Vec<DynamicValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallFunctionResponse {
    pub result: Option<DynamicValue>,
    pub error: Option<FunctionError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateActionConfigRequest {
    pub action_type: String,
    pub config: DynamicValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateActionConfigResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanActionRequest {
    pub action_type: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanActionResponse {
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeActionRequest {
    pub action_type: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

/// One event of an action invocation stream. The stream ends with exactly
/// one `Completed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvokeActionEvent {
    Progress { message: String },
    Completed { diagnostics: Diagnostics },
}

pub struct InvokeActionResponse {
    pub events: ReceiverStream<InvokeActionEvent>,
}

impl std::fmt::Debug for InvokeActionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeActionResponse").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dynamic_value_decodes_to_null() {
        let ty = Type::object([("id", Type::String)]);
        assert_eq!(DynamicValue::default().decode(&ty).unwrap(), Value::null(ty));
    }

    #[test]
    fn dynamic_value_prefers_msgpack_and_falls_back_to_json() {
        let ty = Type::object([("id", Type::String)]);
        let value = Value::object([("id", Value::from("abc"))]);

        let packed = DynamicValue::encode(&value, &ty).unwrap();
        assert_eq!(packed.decode(&ty).unwrap(), value);

        let from_json = DynamicValue::from_json(br#"{"id":"abc"}"#.to_vec());
        assert_eq!(from_json.decode(&ty).unwrap(), value);
    }

    #[test]
    fn flatmap_state_is_unsupported() {
        let mut raw = RawState::default();
        raw.flatmap.insert("id".to_string(), "abc".to_string());

        let err = raw
            .decode(&Type::object([("id", Type::String)]), JsonOptions::default())
            .unwrap_err();
        assert!(matches!(err, PlugkitError::Unsupported(_)));
    }
}
