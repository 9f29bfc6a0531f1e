//! A minimal engine driving a provider through the protocol 6 surface.
//!
//! It mirrors what the real engine does around each RPC: encode against
//! the advertised schemas, compute the proposed new state, and hold the
//! provider to the apply consistency rules.

#![allow(dead_code)]

use plugkit::action::{collect, ActionOutcome};
use plugkit::consistency::check_apply;
use plugkit::protocol::v6::{self, ProviderServer};
use plugkit::protocol::*;
use plugkit::schema::IdentitySchema;
use plugkit::types::{AttributePath, ClientCapabilities, Deferred, Diagnostics};
use plugkit::{Context, DynamicValue, Schema, Type, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resource instance as the engine records it in state.
#[derive(Debug, Clone)]
pub struct Instance {
    pub type_name: String,
    pub state: Value,
    pub private: Vec<u8>,
    pub identity: Option<Value>,
}

#[derive(Debug)]
pub struct Plan {
    pub planned: Value,
    pub private: Vec<u8>,
    pub identity: Option<DynamicValue>,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct Engine {
    server: Arc<dyn ProviderServer>,
    schemas: GetProviderSchemaResponse,
    identities: BTreeMap<String, IdentitySchema>,
    pub capabilities: ClientCapabilities,
}

impl Engine {
    /// Loads the provider's schemas, which must be valid.
    pub async fn start(server: Arc<dyn ProviderServer>) -> Self {
        let schemas = server
            .get_provider_schema(Context::new(), GetProviderSchemaRequest {})
            .await
            .unwrap();
        assert!(
            !schemas.diagnostics.has_errors(),
            "schema errors: {:?}",
            schemas.diagnostics
        );
        let identities = server
            .get_resource_identity_schemas(Context::new(), GetResourceIdentitySchemasRequest {})
            .await
            .unwrap()
            .identity_schemas;
        Self {
            server,
            schemas,
            identities,
            capabilities: ClientCapabilities {
                deferral_allowed: false,
                write_only_attributes_allowed: true,
            },
        }
    }

    pub fn with_deferral(mut self) -> Self {
        self.capabilities.deferral_allowed = true;
        self
    }

    pub fn server(&self) -> &Arc<dyn ProviderServer> {
        &self.server
    }

    pub fn resource_schema(&self, type_name: &str) -> &Schema {
        self.schemas
            .resource_schemas
            .get(type_name)
            .unwrap_or_else(|| panic!("no resource schema for {}", type_name))
    }

    pub fn provider_config(&self, given: &[(&str, Value)]) -> Value {
        config(&self.schemas.provider, given)
    }

    pub fn resource_config(&self, type_name: &str, given: &[(&str, Value)]) -> Value {
        config(self.resource_schema(type_name), given)
    }

    fn identity_type(&self, type_name: &str) -> Option<Type> {
        self.identities.get(type_name).map(IdentitySchema::ty)
    }

    fn encode_identity(&self, type_name: &str, identity: &Option<Value>) -> Option<DynamicValue> {
        let ty = self.identity_type(type_name)?;
        identity
            .as_ref()
            .map(|value| DynamicValue::encode(value, &ty).unwrap())
    }

    fn decode_identity(&self, type_name: &str, identity: Option<DynamicValue>) -> Option<Value> {
        let ty = self.identity_type(type_name)?;
        identity.map(|dv| dv.decode(&ty).unwrap())
    }

    pub async fn configure(&self, config: Value) -> ConfigureProviderResponse {
        let ty = self.schemas.provider.ty();
        let config = DynamicValue::encode(&config, &ty).unwrap();
        let validated = self
            .server
            .validate_provider_config(
                Context::new(),
                v6::ValidateProviderConfigRequest {
                    config: config.clone(),
                },
            )
            .await
            .unwrap();
        if validated.diagnostics.has_errors() {
            return ConfigureProviderResponse {
                diagnostics: validated.diagnostics,
            };
        }
        self.server
            .configure_provider(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.12.0".to_string(),
                    config,
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap()
    }

    pub async fn validate(&self, type_name: &str, config: &Value) -> Diagnostics {
        let ty = self.resource_schema(type_name).ty();
        self.server
            .validate_resource_config(
                Context::new(),
                v6::ValidateResourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: DynamicValue::encode(config, &ty).unwrap(),
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap()
            .diagnostics
    }

    /// Plans a change from `prior` towards `config`. A null config plans a
    /// destroy.
    pub async fn plan(&self, type_name: &str, prior: Option<&Instance>, config: &Value) -> Plan {
        let schema = self.resource_schema(type_name);
        let ty = schema.ty();
        let prior_state = prior
            .map(|p| p.state.clone())
            .unwrap_or_else(|| Value::null(ty.clone()));
        let proposed = proposed_new_state(schema, &prior_state, config);
        let response = self
            .server
            .plan_resource_change(
                Context::new(),
                PlanResourceChangeRequest {
                    type_name: type_name.to_string(),
                    prior_state: DynamicValue::encode(&prior_state, &ty).unwrap(),
                    proposed_new_state: DynamicValue::encode(&proposed, &ty).unwrap(),
                    config: DynamicValue::encode(config, &ty).unwrap(),
                    prior_private: prior.map(|p| p.private.clone()).unwrap_or_default(),
                    provider_meta: None,
                    client_capabilities: self.capabilities,
                    prior_identity: prior
                        .and_then(|p| self.encode_identity(type_name, &p.identity)),
                },
            )
            .await
            .unwrap();
        let planned = match &response.planned_state {
            Some(dv) => dv.decode(&ty).unwrap(),
            None => Value::null(ty),
        };
        Plan {
            planned,
            private: response.planned_private,
            identity: response.planned_identity,
            requires_replace: response.requires_replace,
            diagnostics: response.diagnostics,
            deferred: response.deferred,
        }
    }

    /// Applies a plan and checks the result against it.
    pub async fn apply(
        &self,
        type_name: &str,
        prior: Option<&Instance>,
        config: &Value,
        plan: &Plan,
    ) -> Result<Option<Instance>, Diagnostics> {
        let schema = self.resource_schema(type_name);
        let ty = schema.ty();
        let prior_state = prior
            .map(|p| p.state.clone())
            .unwrap_or_else(|| Value::null(ty.clone()));
        let response = self
            .server
            .apply_resource_change(
                Context::new(),
                ApplyResourceChangeRequest {
                    type_name: type_name.to_string(),
                    prior_state: DynamicValue::encode(&prior_state, &ty).unwrap(),
                    planned_state: DynamicValue::encode(&plan.planned, &ty).unwrap(),
                    config: DynamicValue::encode(config, &ty).unwrap(),
                    planned_private: plan.private.clone(),
                    provider_meta: None,
                    planned_identity: plan.identity.clone(),
                },
            )
            .await
            .unwrap();
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        let applied = match &response.new_state {
            Some(dv) => dv.decode(&ty).unwrap(),
            None => Value::null(ty),
        };
        let consistency = check_apply(type_name, schema, &plan.planned, &applied);
        if consistency.has_errors() {
            return Err(consistency);
        }
        if applied.is_null() {
            return Ok(None);
        }
        Ok(Some(Instance {
            type_name: type_name.to_string(),
            state: applied,
            private: response.private,
            identity: self.decode_identity(type_name, response.new_identity),
        }))
    }

    /// Validates, plans and applies a new instance.
    pub async fn create(&self, type_name: &str, config: Value) -> Result<Instance, Diagnostics> {
        let diagnostics = self.validate(type_name, &config).await;
        if diagnostics.has_errors() {
            return Err(diagnostics);
        }
        let plan = self.plan(type_name, None, &config).await;
        if plan.diagnostics.has_errors() {
            return Err(plan.diagnostics);
        }
        let created = self.apply(type_name, None, &config, &plan).await?;
        Ok(created.unwrap_or_else(|| panic!("{} created nothing", type_name)))
    }

    pub async fn update(&self, prior: &Instance, config: Value) -> Result<Instance, Diagnostics> {
        let plan = self.plan(&prior.type_name, Some(prior), &config).await;
        if plan.diagnostics.has_errors() {
            return Err(plan.diagnostics);
        }
        let updated = self
            .apply(&prior.type_name, Some(prior), &config, &plan)
            .await?;
        Ok(updated.unwrap_or_else(|| panic!("{} vanished on update", prior.type_name)))
    }

    pub async fn destroy(&self, prior: &Instance) -> Result<(), Diagnostics> {
        let null = Value::null(self.resource_schema(&prior.type_name).ty());
        let plan = self.plan(&prior.type_name, Some(prior), &null).await;
        if plan.diagnostics.has_errors() {
            return Err(plan.diagnostics);
        }
        match self.apply(&prior.type_name, Some(prior), &null, &plan).await? {
            None => Ok(()),
            Some(_) => panic!("{} survived destroy", prior.type_name),
        }
    }

    /// Refreshes an instance. `None` means it is gone.
    pub async fn read(&self, current: &Instance) -> Result<Option<Instance>, Diagnostics> {
        let ty = self.resource_schema(&current.type_name).ty();
        let response = self
            .server
            .read_resource(
                Context::new(),
                ReadResourceRequest {
                    type_name: current.type_name.clone(),
                    current_state: DynamicValue::encode(&current.state, &ty).unwrap(),
                    private: current.private.clone(),
                    provider_meta: None,
                    client_capabilities: self.capabilities,
                    current_identity: self.encode_identity(&current.type_name, &current.identity),
                },
            )
            .await
            .unwrap();
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        let state = match &response.new_state {
            Some(dv) => dv.decode(&ty).unwrap(),
            None => Value::null(ty),
        };
        if state.is_null() {
            return Ok(None);
        }
        Ok(Some(Instance {
            type_name: current.type_name.clone(),
            state,
            private: response.private,
            identity: self.decode_identity(&current.type_name, response.new_identity),
        }))
    }

    /// Imports by id or by identity, then reads each imported instance. An
    /// instance the read reports gone fails the import.
    pub async fn import(
        &self,
        type_name: &str,
        id: &str,
        identity: Option<Value>,
    ) -> Result<Vec<Instance>, Diagnostics> {
        let response = self
            .server
            .import_resource_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                    client_capabilities: self.capabilities,
                    identity: self.encode_identity(type_name, &identity),
                },
            )
            .await
            .unwrap();
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        let mut instances = Vec::new();
        for imported in response.imported_resources {
            let ty = self.resource_schema(&imported.type_name).ty();
            let stub = Instance {
                state: imported.state.decode(&ty).unwrap(),
                identity: self.decode_identity(&imported.type_name, imported.identity),
                type_name: imported.type_name,
                private: imported.private,
            };
            match self.read(&stub).await? {
                Some(instance) => instances.push(instance),
                None => {
                    let mut diagnostics = Diagnostics::new();
                    diagnostics.add_error(
                        "Cannot import non-existent remote object",
                        format!(
                            "While attempting to import an existing object to {}, the provider detected that no object exists with the given id.",
                            stub.type_name
                        ),
                    );
                    return Err(diagnostics);
                }
            }
        }
        Ok(instances)
    }

    pub async fn move_state(
        &self,
        source_address: &str,
        source_type_name: &str,
        source_version: i64,
        source_json: &str,
        target_type_name: &str,
    ) -> Result<Instance, Diagnostics> {
        let response = self
            .server
            .move_resource_state(
                Context::new(),
                MoveResourceStateRequest {
                    source_provider_address: source_address.to_string(),
                    source_type_name: source_type_name.to_string(),
                    source_schema_version: source_version,
                    source_state: RawState::from_json(source_json.as_bytes().to_vec()),
                    target_type_name: target_type_name.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        let ty = self.resource_schema(target_type_name).ty();
        let state = response
            .target_state
            .unwrap_or_else(|| panic!("no target state for {}", target_type_name))
            .decode(&ty)
            .unwrap();
        Ok(Instance {
            type_name: target_type_name.to_string(),
            state,
            private: response.target_private,
            identity: self.decode_identity(target_type_name, response.target_identity),
        })
    }

    pub async fn read_data(&self, type_name: &str, config: Value) -> Result<Value, Diagnostics> {
        let ty = self
            .schemas
            .data_source_schemas
            .get(type_name)
            .unwrap_or_else(|| panic!("no data source schema for {}", type_name))
            .ty();
        let response = self
            .server
            .read_data_source(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: type_name.to_string(),
                    config: DynamicValue::encode(&config, &ty).unwrap(),
                    provider_meta: None,
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap();
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        Ok(response
            .state
            .map(|dv| dv.decode(&ty).unwrap())
            .unwrap_or_else(|| Value::null(ty)))
    }

    pub fn ephemeral_type(&self, type_name: &str) -> Type {
        self.schemas
            .ephemeral_resource_schemas
            .get(type_name)
            .unwrap_or_else(|| panic!("no ephemeral schema for {}", type_name))
            .ty()
    }

    pub async fn open(&self, type_name: &str, config: Value) -> OpenEphemeralResourceResponse {
        let ty = self.ephemeral_type(type_name);
        self.server
            .open_ephemeral_resource(
                Context::new(),
                OpenEphemeralResourceRequest {
                    type_name: type_name.to_string(),
                    config: DynamicValue::encode(&config, &ty).unwrap(),
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap()
    }

    pub async fn renew(&self, type_name: &str, private: Option<Vec<u8>>) -> RenewEphemeralResourceResponse {
        self.server
            .renew_ephemeral_resource(
                Context::new(),
                RenewEphemeralResourceRequest {
                    type_name: type_name.to_string(),
                    private,
                },
            )
            .await
            .unwrap()
    }

    pub async fn close(&self, type_name: &str, private: Option<Vec<u8>>) -> Diagnostics {
        self.server
            .close_ephemeral_resource(
                Context::new(),
                CloseEphemeralResourceRequest {
                    type_name: type_name.to_string(),
                    private,
                },
            )
            .await
            .unwrap()
            .diagnostics
    }

    /// Calls a function, encoding each argument with its parameter type.
    pub async fn call(&self, name: &str, arguments: Vec<Value>) -> CallFunctionResponse {
        let definition = self
            .schemas
            .functions
            .get(name)
            .unwrap_or_else(|| panic!("no function {}", name));
        let arguments = arguments
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let parameter = definition.parameter_for(i).unwrap();
                DynamicValue::encode(value, &parameter.ty).unwrap()
            })
            .collect();
        self.server
            .call_function(
                Context::new(),
                CallFunctionRequest {
                    name: name.to_string(),
                    arguments,
                },
            )
            .await
            .unwrap()
    }

    pub fn function_return_type(&self, name: &str) -> Type {
        self.schemas.functions[name].return_type.clone()
    }

    /// Validates, plans and invokes an action, draining its progress.
    pub async fn invoke(&self, action_type: &str, config: Value) -> ActionOutcome {
        let ty = self.schemas.action_schemas[action_type].ty();
        let config = DynamicValue::encode(&config, &ty).unwrap();
        let validated = self
            .server
            .validate_action_config(
                Context::new(),
                ValidateActionConfigRequest {
                    action_type: action_type.to_string(),
                    config: config.clone(),
                },
            )
            .await
            .unwrap();
        if validated.diagnostics.has_errors() {
            return ActionOutcome {
                diagnostics: validated.diagnostics,
                ..Default::default()
            };
        }
        let planned = self
            .server
            .plan_action(
                Context::new(),
                PlanActionRequest {
                    action_type: action_type.to_string(),
                    config: config.clone(),
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap();
        if planned.diagnostics.has_errors() {
            return ActionOutcome {
                diagnostics: planned.diagnostics,
                ..Default::default()
            };
        }
        let response = self
            .server
            .invoke_action(
                Context::new(),
                InvokeActionRequest {
                    action_type: action_type.to_string(),
                    config,
                    client_capabilities: self.capabilities,
                },
            )
            .await
            .unwrap();
        collect(response.events).await
    }
}

/// The engine's proposal: configuration, with unset computed attributes
/// carried over from prior state.
pub fn proposed_new_state(schema: &Schema, prior: &Value, config: &Value) -> Value {
    if config.is_null() || prior.is_null() {
        return config.clone();
    }
    let mut proposed = config.clone();
    for attr in &schema.block.attributes {
        let unset = config.get_attr(&attr.name).is_some_and(Value::is_null);
        if attr.computed && unset {
            if let Some(prior_value) = prior.get_attr(&attr.name) {
                proposed = proposed.with_attr(&attr.name, prior_value.clone());
            }
        }
    }
    proposed
}

/// A configuration object for `schema`, with every attribute not given
/// left null.
pub fn config(schema: &Schema, given: &[(&str, Value)]) -> Value {
    let Type::Object(attributes) = schema.ty() else {
        panic!("schema type is not an object");
    };
    Value::object(attributes.into_iter().map(|(name, ty)| {
        let value = given
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| Value::null(ty));
        (name, value)
    }))
}

pub fn summaries(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.iter().map(|d| d.summary.clone()).collect()
}
