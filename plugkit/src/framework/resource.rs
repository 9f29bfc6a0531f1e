use super::upgrade::UpgradeChain;
use super::{check_type_name, decode_private, encode_private, schema_result, validate_config};
use crate::consistency;
use crate::context::Context;
use crate::error::{PlugkitError, Result};
use crate::lowlevel::{
    ApplyRequest, ApplyResponse, Call, ImportRequest, ImportResponse, ImportedState, MoveRequest,
    MoveResponse, PlanRequest, PlanResponse, ReadRequest, ReadResponse, ResourceHandler,
    UpgradeRequest, UpgradeResponse,
};
use crate::provider::ResourceFactory;
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ModifyPlanRequest, MoveStateRequest, ReadResourceRequest,
    Resource, ResourceSchemaRequest, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{DefaultRequest, IdentitySchema, PlanModifierRequest, Schema};
use crate::semantic::values_equal;
use crate::timeouts::{TimeoutOperation, Timeouts};
use crate::types::{AttributePath, Diagnostic, Diagnostics};
use crate::value::json::JsonOptions;
use crate::value::{Type, Value};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

/// Managed resource handler over a resource factory.
pub(super) struct ResourceAdapter {
    type_name: String,
    factory: ResourceFactory,
    schema: Schema,
    identity_schema: Option<IdentitySchema>,
}

impl ResourceAdapter {
    pub(super) async fn new(ctx: &Context, type_name: &str, factory: ResourceFactory) -> Result<Self> {
        let probe = factory();
        check_type_name(type_name, probe.type_name())?;
        let response = probe.schema(ctx.clone(), ResourceSchemaRequest).await;
        let schema = schema_result(type_name, response.schema, response.diagnostics)?;
        let identity_schema = probe.identity_schema();
        Ok(Self {
            type_name: type_name.to_string(),
            factory,
            schema,
            identity_schema,
        })
    }

    /// A fresh instance configured with the provider data.
    async fn instance(&self, call: &Call) -> std::result::Result<Box<dyn Resource>, Diagnostics> {
        let mut resource = (self.factory)();
        let response = resource
            .configure(
                call.ctx.clone(),
                ConfigureResourceRequest {
                    provider_data: call.provider_data.clone(),
                },
            )
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    async fn validate_all(&self, resource: &dyn Resource, call: &Call, config: &Value) -> Diagnostics {
        let mut diagnostics =
            validate_config(&self.schema, config, &resource.config_validators());
        let response = resource
            .validate(
                call.ctx.clone(),
                ValidateResourceConfigRequest {
                    type_name: self.type_name.clone(),
                    config: config.clone(),
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    /// Fills null configuration with attribute defaults.
    fn apply_defaults(&self, config: &Value, planned: Value, diagnostics: &mut Diagnostics) -> Value {
        self.schema.transform(planned, &mut |path, attr, value| {
            let Some(default) = &attr.default else {
                return value;
            };
            let configured = config.get_path(path).is_some_and(|c| !c.is_null());
            if configured {
                return value;
            }
            let response = default.default_value(DefaultRequest {
                path: path.clone(),
                ty: attr.ty.clone(),
            });
            diagnostics.extend(response.diagnostics);
            response.value
        })
    }

    /// Keeps the prior representation of values the attribute's adapter
    /// considers equal.
    fn keep_equivalent(&self, prior: &Value, value: Value) -> Value {
        if prior.is_null() || value.is_null() {
            return value;
        }
        self.schema.transform(value, &mut |path, attr, v| {
            let adapter = attr.semantic.as_ref();
            match prior.get_path(path) {
                Some(p) if adapter.is_some() && p != &v && values_equal(adapter, p, &v) => p.clone(),
                _ => v,
            }
        })
    }

    /// Marks computed attributes without configuration or default as
    /// unknown.
    fn mark_unknown(&self, config: &Value, planned: Value) -> Value {
        self.schema.transform(planned, &mut |path, attr, v| {
            let configured = config.get_path(path).is_some_and(|c| !c.is_null());
            if attr.computed && attr.default.is_none() && !configured && !v.is_unknown() {
                Value::unknown(attr.ty.clone())
            } else {
                v
            }
        })
    }

    fn run_plan_modifiers(
        &self,
        request: &PlanRequest,
        planned: Value,
        requires_replace: &mut Vec<AttributePath>,
        diagnostics: &mut Diagnostics,
    ) -> Value {
        let creating = request.prior_state.is_null();
        self.schema.transform(planned, &mut |path, attr, v| {
            if attr.plan_modifiers.is_empty() {
                return v;
            }
            let config_value = request
                .config
                .get_path(path)
                .cloned()
                .unwrap_or_else(|| Value::null(attr.ty.clone()));
            let state_value = request
                .prior_state
                .get_path(path)
                .cloned()
                .unwrap_or_else(|| Value::null(attr.ty.clone()));
            let mut plan_value = v;
            for modifier in &attr.plan_modifiers {
                let response = modifier.modify(PlanModifierRequest {
                    config_value: config_value.clone(),
                    state_value: state_value.clone(),
                    plan_value,
                    path: path.clone(),
                    creating,
                });
                if response.requires_replace && !requires_replace.contains(path) {
                    requires_replace.push(path.clone());
                }
                diagnostics.extend(response.diagnostics);
                plan_value = response.plan_value;
            }
            plan_value
        })
    }

    fn timeout(&self, value: &Value, op: TimeoutOperation, diagnostics: &mut Diagnostics) -> Option<std::time::Duration> {
        match Timeouts::from_value(value) {
            Ok(timeouts) => timeouts.get(op),
            Err(d) => {
                diagnostics.extend(d);
                None
            }
        }
    }

    /// Shows a destroy plan to the resource. The planned state stays null.
    async fn plan_destroy(&self, call: &Call, request: PlanRequest) -> PlanResponse {
        let mut diagnostics = Diagnostics::new();
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return Self::error_plan(request, d),
        };
        let null = Value::null(self.schema.ty());
        let prior_private = decode_private(&request.prior_private, &mut diagnostics);
        let modified = resource
            .modify_plan(
                call.ctx.clone(),
                ModifyPlanRequest {
                    type_name: self.type_name.clone(),
                    config: request.config.clone(),
                    prior_state: request.prior_state.clone(),
                    planned_state: null.clone(),
                    prior_private,
                    provider_meta: request.provider_meta.clone(),
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        diagnostics.extend(modified.diagnostics);
        if !modified.planned_state.is_null() {
            diagnostics.add_error(
                "Unexpected Planned Resource State on Destroy",
                format!(
                    "The {} resource planned a non-null state while being destroyed. This is always a bug in the provider.",
                    self.type_name
                ),
            );
        }
        PlanResponse {
            planned_state: null,
            requires_replace: Vec::new(),
            planned_private: encode_private(&modified.planned_private, &mut diagnostics),
            planned_identity: request.prior_identity,
            diagnostics,
            deferred: modified.deferred,
        }
    }

    fn error_plan(request: PlanRequest, diagnostics: Diagnostics) -> PlanResponse {
        let mut response = PlanResponse::proposed(request);
        response.diagnostics = diagnostics;
        response
    }
}

/// Runs `operation` under the per-operation timeout, if any. Fails
/// when the context is cancelled or the deadline passes first.
async fn with_timeout<T, F, Fut>(
    ctx: &Context,
    timeout: Option<std::time::Duration>,
    operation: F,
) -> std::result::Result<T, PlugkitError>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = T>,
{
    let scoped = match timeout {
        Some(d) => ctx.with_timeout(d),
        None => ctx.child(),
    };
    tokio::select! {
        result = operation(scoped.clone()) => Ok(result),
        _ = scoped.cancelled() => Err(scoped.err().unwrap_or(PlugkitError::Cancelled)),
    }
}

#[async_trait]
impl ResourceHandler for ResourceAdapter {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn identity_schema(&self) -> Option<IdentitySchema> {
        self.identity_schema.clone()
    }

    async fn validate(&self, call: &Call, config: &Value) -> Diagnostics {
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return d,
        };
        self.validate_all(resource.as_ref(), call, config).await
    }

    async fn plan(&self, call: &Call, request: PlanRequest) -> PlanResponse {
        debug!(type_name = %self.type_name, "planning resource change");
        let mut diagnostics = Diagnostics::new();

        if request.proposed_new_state.is_null() {
            return self.plan_destroy(call, request).await;
        }

        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return Self::error_plan(request, d),
        };
        diagnostics.extend(
            self.validate_all(resource.as_ref(), call, &request.config)
                .await,
        );
        if diagnostics.has_errors() {
            return Self::error_plan(request, diagnostics);
        }

        let creating = request.prior_state.is_null();
        let mut planned =
            self.apply_defaults(&request.config, request.proposed_new_state.clone(), &mut diagnostics);
        planned = self.keep_equivalent(&request.prior_state, planned);
        if creating || self.schema.null_write_only(planned.clone()) != request.prior_state {
            planned = self.mark_unknown(&request.config, planned);
        }

        let mut requires_replace = Vec::new();
        planned = self.run_plan_modifiers(&request, planned, &mut requires_replace, &mut diagnostics);
        if diagnostics.has_errors() {
            return Self::error_plan(request, diagnostics);
        }

        let prior_private = decode_private(&request.prior_private, &mut diagnostics);
        let modified = resource
            .modify_plan(
                call.ctx.clone(),
                ModifyPlanRequest {
                    type_name: self.type_name.clone(),
                    config: request.config.clone(),
                    prior_state: request.prior_state.clone(),
                    planned_state: planned,
                    prior_private,
                    provider_meta: request.provider_meta.clone(),
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        diagnostics.extend(modified.diagnostics);
        let mut planned = modified.planned_state;
        for path in modified.requires_replace {
            if !requires_replace.contains(&path) {
                requires_replace.push(path);
            }
        }

        // A replacement recreates every computed value.
        if !creating && !requires_replace.is_empty() {
            planned = self.mark_unknown(&request.config, planned);
        }

        diagnostics.extend(consistency::check_plan(
            &self.type_name,
            &self.schema,
            &request.config,
            &planned,
        ));

        let planned_identity = match &self.identity_schema {
            Some(identity) if creating || !requires_replace.is_empty() => {
                Some(Value::unknown(identity.ty()))
            }
            _ => request.prior_identity.clone(),
        };

        PlanResponse {
            planned_state: planned,
            requires_replace,
            planned_private: encode_private(&modified.planned_private, &mut diagnostics),
            planned_identity,
            diagnostics,
            deferred: modified.deferred,
        }
    }

    async fn apply(&self, call: &Call, request: ApplyRequest) -> ApplyResponse {
        let mut diagnostics = Diagnostics::new();
        let fallback = |state: Value, diagnostics: Diagnostics| ApplyResponse {
            new_state: state,
            private: request.planned_private.clone(),
            new_identity: request.planned_identity.clone(),
            diagnostics,
        };
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return fallback(request.prior_state.clone(), d),
        };
        let planned_private = decode_private(&request.planned_private, &mut diagnostics);

        if request.planned_state.is_null() {
            debug!(type_name = %self.type_name, "deleting resource");
            let timeout = self.timeout(&request.prior_state, TimeoutOperation::Delete, &mut diagnostics);
            let outcome = with_timeout(&call.ctx, timeout, |ctx| {
                resource.delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name: self.type_name.clone(),
                        prior_state: request.prior_state.clone(),
                        planned_private,
                        provider_meta: request.provider_meta.clone(),
                    },
                )
            })
            .await;
            return match outcome {
                Ok(response) => {
                    diagnostics.extend(response.diagnostics);
                    let new_state = if diagnostics.has_errors() {
                        request.prior_state.clone()
                    } else {
                        Value::null(self.schema.ty())
                    };
                    ApplyResponse {
                        new_state,
                        private: Vec::new(),
                        new_identity: None,
                        diagnostics,
                    }
                }
                Err(e) => {
                    warn!(type_name = %self.type_name, error = %e, "delete interrupted");
                    diagnostics.push(e.into_diagnostic());
                    fallback(request.prior_state.clone(), diagnostics)
                }
            };
        }

        let creating = request.prior_state.is_null();
        let (new_state, private, new_identity) = if creating {
            debug!(type_name = %self.type_name, "creating resource");
            let timeout = self.timeout(&request.planned_state, TimeoutOperation::Create, &mut diagnostics);
            let outcome = with_timeout(&call.ctx, timeout, |ctx| {
                resource.create(
                    ctx,
                    CreateResourceRequest {
                        type_name: self.type_name.clone(),
                        planned_state: request.planned_state.clone(),
                        config: request.config.clone(),
                        planned_private,
                        provider_meta: request.provider_meta.clone(),
                    },
                )
            })
            .await;
            match outcome {
                Ok(response) => {
                    diagnostics.extend(response.diagnostics);
                    (response.new_state, response.private, response.new_identity)
                }
                Err(e) => {
                    warn!(type_name = %self.type_name, error = %e, "create interrupted");
                    diagnostics.push(e.into_diagnostic());
                    return fallback(Value::null(self.schema.ty()), diagnostics);
                }
            }
        } else {
            debug!(type_name = %self.type_name, "updating resource");
            let timeout = self.timeout(&request.planned_state, TimeoutOperation::Update, &mut diagnostics);
            let outcome = with_timeout(&call.ctx, timeout, |ctx| {
                resource.update(
                    ctx,
                    UpdateResourceRequest {
                        type_name: self.type_name.clone(),
                        prior_state: request.prior_state.clone(),
                        planned_state: request.planned_state.clone(),
                        config: request.config.clone(),
                        planned_private,
                        provider_meta: request.provider_meta.clone(),
                        planned_identity: request.planned_identity.clone(),
                    },
                )
            })
            .await;
            match outcome {
                Ok(response) => {
                    diagnostics.extend(response.diagnostics);
                    (response.new_state, response.private, response.new_identity)
                }
                Err(e) => {
                    warn!(type_name = %self.type_name, error = %e, "update interrupted");
                    diagnostics.push(e.into_diagnostic());
                    return fallback(request.prior_state.clone(), diagnostics);
                }
            }
        };

        let new_state = self
            .schema
            .null_write_only(self.keep_equivalent(&request.planned_state, new_state));
        if !diagnostics.has_errors() {
            diagnostics.extend(consistency::check_apply(
                &self.type_name,
                &self.schema,
                &self.schema.null_write_only(request.planned_state.clone()),
                &new_state,
            ));
        }

        let new_identity = match (&self.identity_schema, new_identity) {
            (None, _) => None,
            (Some(_), None) if creating => {
                diagnostics.add_error(
                    "Missing Resource Identity After Create",
                    format!(
                        "{} declares an identity schema but create returned no identity.",
                        self.type_name
                    ),
                );
                None
            }
            (Some(_), None) => request.planned_identity.clone(),
            (Some(_), Some(identity)) => {
                if let Some(prior) = request.planned_identity.as_ref().filter(|p| p.is_wholly_known()) {
                    if !creating && prior != &identity {
                        diagnostics.push(identity_changed(&self.type_name, prior, &identity));
                    }
                }
                Some(identity)
            }
        };

        ApplyResponse {
            new_state,
            private: encode_private(&private, &mut diagnostics),
            new_identity,
            diagnostics,
        }
    }

    async fn read(&self, call: &Call, request: ReadRequest) -> ReadResponse {
        debug!(type_name = %self.type_name, "reading resource");
        let mut diagnostics = Diagnostics::new();
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => {
                let mut response = ReadResponse::unchanged(request);
                response.diagnostics = d;
                return response;
            }
        };
        let private = decode_private(&request.private, &mut diagnostics);
        let timeout = self.timeout(&request.current_state, TimeoutOperation::Read, &mut diagnostics);
        let outcome = with_timeout(&call.ctx, timeout, |ctx| {
            resource.read(
                ctx,
                ReadResourceRequest {
                    type_name: self.type_name.clone(),
                    current_state: request.current_state.clone(),
                    private,
                    provider_meta: request.provider_meta.clone(),
                    client_capabilities: call.client_capabilities,
                    current_identity: request.current_identity.clone(),
                },
            )
        })
        .await;
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                diagnostics.push(e.into_diagnostic());
                let mut response = ReadResponse::unchanged(request);
                response.diagnostics = diagnostics;
                return response;
            }
        };
        diagnostics.extend(response.diagnostics);

        let new_state = match response.new_state {
            Some(state) => self.keep_equivalent(&request.current_state, state),
            None => Value::null(self.schema.ty()),
        };
        let new_identity = match (response.new_identity, &request.current_identity) {
            (Some(new), Some(current)) if current.is_wholly_known() && &new != current => {
                diagnostics.push(identity_changed(&self.type_name, current, &new));
                Some(new)
            }
            (Some(new), _) => Some(new),
            (None, current) => current.clone(),
        };
        ReadResponse {
            new_state,
            private: encode_private(&response.private, &mut diagnostics),
            new_identity,
            diagnostics,
            deferred: response.deferred,
        }
    }

    async fn upgrade_state(&self, call: &Call, request: UpgradeRequest) -> UpgradeResponse {
        let ty = self.schema.ty();
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(diagnostics) => {
                return UpgradeResponse {
                    value: Value::null(ty),
                    diagnostics,
                }
            }
        };
        let chain = UpgradeChain::from_state_upgraders(resource.state_upgraders());
        match chain.upgrade(&request.raw, request.version, self.schema.version, &ty) {
            Ok(value) => UpgradeResponse {
                value,
                diagnostics: Diagnostics::new(),
            },
            Err(diagnostics) => UpgradeResponse {
                value: Value::null(ty),
                diagnostics,
            },
        }
    }

    async fn upgrade_identity(&self, call: &Call, request: UpgradeRequest) -> UpgradeResponse {
        let Some(identity) = &self.identity_schema else {
            return UpgradeResponse {
                value: Value::null(Type::Dynamic),
                diagnostics: Diagnostics::from(Diagnostic::error(
                    "Resource Identity Not Supported",
                    format!("{} does not declare an identity schema.", self.type_name),
                )),
            };
        };
        let ty = identity.ty();
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(diagnostics) => {
                return UpgradeResponse {
                    value: Value::null(ty),
                    diagnostics,
                }
            }
        };
        let chain = UpgradeChain::from_identity_upgraders(resource.identity_upgraders());
        match chain.upgrade(&request.raw, request.version, identity.version, &ty) {
            Ok(value) => UpgradeResponse {
                value,
                diagnostics: Diagnostics::new(),
            },
            Err(diagnostics) => UpgradeResponse {
                value: Value::null(ty),
                diagnostics,
            },
        }
    }

    async fn import(&self, call: &Call, request: ImportRequest) -> ImportResponse {
        debug!(type_name = %self.type_name, id = %request.id, "importing resource");
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(diagnostics) => {
                return ImportResponse {
                    diagnostics,
                    ..Default::default()
                }
            }
        };
        let imported = resource
            .import_state(
                call.ctx.clone(),
                ImportResourceStateRequest {
                    type_name: request.type_name.clone(),
                    id: request.id.clone(),
                    client_capabilities: call.client_capabilities,
                    identity: request.identity.clone(),
                    state_type: self.schema.ty(),
                },
            )
            .await;
        let mut response = ImportResponse {
            diagnostics: imported.diagnostics,
            deferred: imported.deferred,
            ..Default::default()
        };
        if response.diagnostics.has_errors() || response.deferred.is_some() {
            return response;
        }

        for stub in imported.imported_resources {
            response.imported.push(ImportedState {
                type_name: stub.type_name,
                state: self.schema.null_write_only(stub.state),
                private: encode_private(&stub.private, &mut response.diagnostics),
                identity: stub.identity,
            });
        }
        response
    }

    async fn move_state(&self, call: &Call, request: MoveRequest) -> MoveResponse {
        debug!(
            type_name = %self.type_name,
            source_type_name = %request.source_type_name,
            "moving resource state"
        );
        let ty = self.schema.ty();
        let unable = |diagnostics: Diagnostics| MoveResponse {
            target_state: Value::null(ty.clone()),
            target_private: Vec::new(),
            target_identity: None,
            diagnostics,
        };
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return unable(d),
        };
        let mut diagnostics = Diagnostics::new();
        let source_private = decode_private(&request.source_private, &mut diagnostics);
        let options = JsonOptions {
            ignore_undefined_attributes: true,
        };

        for mover in resource.state_movers() {
            let source_state = match &mover.source_schema {
                Some(schema) => match request.source_state.decode(&schema.ty(), options) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        debug!(error = %e, "source state does not match mover schema");
                        continue;
                    }
                },
                None => None,
            };
            let move_request = MoveStateRequest {
                source_provider_address: request.source_provider_address.clone(),
                source_type_name: request.source_type_name.clone(),
                source_schema_version: request.source_schema_version,
                source_state,
                source_raw_state: request.source_state.json.clone(),
                source_private: source_private.clone(),
                source_identity: request.source_identity.as_ref().and_then(|r| r.json.clone()),
                source_identity_schema_version: request.source_identity_schema_version,
            };
            let Some(moved) = (mover.mover)(&move_request) else {
                continue;
            };
            diagnostics.extend(moved.diagnostics);
            if !diagnostics.has_errors() && !moved.target_state.conforms_to(&ty) {
                diagnostics.add_error(
                    "Invalid Moved State",
                    format!(
                        "Moving {} produced a value of type {} where {} requires {}.",
                        request.source_type_name,
                        moved.target_state.ty(),
                        self.type_name,
                        ty
                    ),
                );
            }
            return MoveResponse {
                target_state: self.schema.null_write_only(moved.target_state),
                target_private: encode_private(&moved.target_private, &mut diagnostics),
                target_identity: moved.target_identity,
                diagnostics,
            };
        }

        diagnostics.add_error(
            "Unable to Move Resource State",
            format!(
                "The target resource type {} does not support moving state from {} {}.",
                self.type_name, request.source_provider_address, request.source_type_name
            ),
        );
        unable(diagnostics)
    }
}

fn identity_changed(type_name: &str, prior: &Value, new: &Value) -> Diagnostic {
    Diagnostic::error(
        "Unexpected Identity Change",
        format!(
            "{} returned an identity that differs from the stored one. This is always a bug in the provider.\n\nStored: {}\nReturned: {}",
            type_name, prior, new
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_modifier::RequiredOnCreate;
    use crate::resource::{
        CreateResourceResponse, DeleteResourceResponse, ReadResourceResponse,
        ImportResourceStateResponse, ModifyPlanResponse, MoveStateResponse, ResourceSchemaResponse,
        StateMover,
        UpdateResourceResponse,
    };
    use crate::schema::{AttributeBuilder, IdentityAttribute, SchemaBuilder};
    use crate::timeouts::{self as timeouts_block, TIMEOUTS_BLOCK};
    use crate::import::import_state_passthrough_id;
    use crate::types::{ClientCapabilities, PrivateStateData};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Echoes the plan, filling `id` and flipping `dyn` between a bool and
    /// a number.
    #[derive(Clone, Default)]
    struct Widget {
        sleep: Option<Duration>,
        importable: bool,
        reads: Arc<AtomicU32>,
    }

    fn widget_schema() -> Schema {
        SchemaBuilder::new()
            .attribute(AttributeBuilder::new("id", Type::String).computed().build())
            .attribute(AttributeBuilder::new("name", Type::String).required().build())
            .attribute(
                AttributeBuilder::new("password", Type::String)
                    .optional()
                    .write_only()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("serial", Type::String)
                    .optional()
                    .plan_modifier(RequiredOnCreate::create())
                    .build(),
            )
            .attribute(AttributeBuilder::new("dyn", Type::Dynamic).computed().build())
            .block(timeouts_block::block(&[TimeoutOperation::Create]))
            .build()
    }

    fn fill(planned: Value, dyn_value: Value) -> Value {
        let mut state = planned;
        if state.get_attr("id").is_some_and(Value::is_unknown) {
            state = state.with_attr("id", Value::from("w-1"));
        }
        state.with_attr("dyn", dyn_value)
    }

    #[async_trait]
    impl Resource for Widget {
        fn type_name(&self) -> &str {
            "corner_widget"
        }

        async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
            ResourceSchemaResponse {
                schema: widget_schema(),
                diagnostics: Diagnostics::new(),
            }
        }

        fn identity_schema(&self) -> Option<IdentitySchema> {
            Some(IdentitySchema::new(
                0,
                vec![IdentityAttribute::required_for_import("id", Type::String)],
            ))
        }

        async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
            if let Some(sleep) = self.sleep {
                tokio::time::sleep(sleep).await;
            }
            CreateResourceResponse {
                new_state: fill(request.planned_state, Value::from(true)),
                private: request.planned_private,
                diagnostics: Diagnostics::new(),
                new_identity: Some(Value::object([("id", Value::from("w-1"))])),
            }
        }

        async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
            let mut diagnostics = Diagnostics::new();
            if request.planned_state.is_null() {
                diagnostics.add_warning("Widget Destroyed", "the widget will be removed");
            }
            ModifyPlanResponse {
                planned_state: request.planned_state,
                requires_replace: Vec::new(),
                planned_private: request.prior_private,
                diagnostics,
                deferred: None,
            }
        }

        async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
            self.reads.fetch_add(1, Ordering::SeqCst);
            ReadResourceResponse::unchanged(&request)
        }

        async fn import_state(
            &self,
            ctx: Context,
            request: ImportResourceStateRequest,
        ) -> ImportResourceStateResponse {
            let mut response = ImportResourceStateResponse::default();
            if !self.importable {
                response.diagnostics.add_error("Resource Import Not Implemented", "no import");
                return response;
            }
            import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
            response
        }

        async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
            UpdateResourceResponse {
                new_state: fill(request.planned_state, Value::from(200)),
                private: request.planned_private,
                diagnostics: Diagnostics::new(),
                new_identity: Some(Value::object([("id", Value::from("w-2"))])),
            }
        }

        async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
            DeleteResourceResponse::default()
        }

        fn state_movers(&self) -> Vec<StateMover> {
            let source = SchemaBuilder::new()
                .attribute(AttributeBuilder::new("result", Type::String).computed().build())
                .build();
            vec![StateMover::new(Some(source), |request| {
                if request.source_type_name != "random_string" {
                    return None;
                }
                let result = request.source_state.as_ref()?.get_attr("result")?.clone();
                Some(MoveStateResponse {
                    target_state: Value::null_object(&widget_schema().ty())
                        .with_attr("id", Value::from("moved"))
                        .with_attr("name", result),
                    target_private: PrivateStateData::new(),
                    target_identity: None,
                    diagnostics: Diagnostics::new(),
                })
            })]
        }
    }

    async fn adapter(sleep: Option<Duration>) -> ResourceAdapter {
        adapter_for(Widget {
            sleep,
            ..Default::default()
        })
        .await
    }

    async fn adapter_for(widget: Widget) -> ResourceAdapter {
        ResourceAdapter::new(
            &Context::new(),
            "corner_widget",
            Box::new(move || Box::new(widget.clone())),
        )
        .await
        .unwrap()
    }

    fn call() -> Call {
        Call {
            ctx: Context::new(),
            provider_config: Value::null(Type::Dynamic),
            provider_data: None,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    fn config(name: &str, serial: Option<&str>) -> Value {
        Value::null_object(&widget_schema().ty())
            .with_attr("name", Value::from(name))
            .with_attr("password", Value::from("hunter2"))
            .with_attr(
                "serial",
                serial.map(Value::from).unwrap_or(Value::null(Type::String)),
            )
    }

    fn plan_request(prior: Value, config: Value) -> PlanRequest {
        let proposed = if prior.is_null() {
            config.clone()
        } else {
            config
                .clone()
                .with_attr("id", prior.get_attr("id").cloned().unwrap_or(Value::null(Type::String)))
                .with_attr("dyn", prior.get_attr("dyn").cloned().unwrap_or(Value::null(Type::Dynamic)))
        };
        PlanRequest {
            prior_state: prior,
            proposed_new_state: proposed,
            config,
            prior_private: Vec::new(),
            provider_meta: Value::null(Type::Dynamic),
            prior_identity: None,
        }
    }

    async fn create(adapter: &ResourceAdapter, config: Value) -> (Value, Option<Value>) {
        let prior = Value::null(widget_schema().ty());
        let plan = adapter.plan(&call(), plan_request(prior.clone(), config.clone())).await;
        assert!(!plan.diagnostics.has_errors(), "{:?}", plan.diagnostics);
        let applied = adapter
            .apply(
                &call(),
                ApplyRequest {
                    prior_state: prior,
                    planned_state: plan.planned_state,
                    config,
                    planned_private: plan.planned_private,
                    provider_meta: Value::null(Type::Dynamic),
                    planned_identity: plan.planned_identity,
                },
            )
            .await;
        assert!(!applied.diagnostics.has_errors(), "{:?}", applied.diagnostics);
        (applied.new_state, applied.new_identity)
    }

    #[tokio::test]
    async fn create_marks_computed_unknown_and_nulls_write_only() {
        let adapter = adapter(None).await;
        let plan = adapter
            .plan(&call(), plan_request(Value::null(widget_schema().ty()), config("a", Some("s1"))))
            .await;
        assert!(plan.planned_state.get_attr("id").is_some_and(Value::is_unknown));
        assert_eq!(
            plan.planned_state.get_attr("dyn"),
            Some(&Value::unknown(Type::Dynamic))
        );

        let (state, identity) = create(&adapter, config("a", Some("s1"))).await;
        assert_eq!(state.get_attr("password"), Some(&Value::null(Type::String)));
        assert_eq!(state.get_attr("dyn"), Some(&Value::from(true)));
        assert!(identity.is_some());
    }

    #[tokio::test]
    async fn unchanged_config_plans_no_diff() {
        let adapter = adapter(None).await;
        let (state, _) = create(&adapter, config("a", Some("s1"))).await;
        let mut unchanged = config("a", Some("s1"));
        unchanged = unchanged.with_attr("password", Value::null(Type::String));
        let plan = adapter.plan(&call(), plan_request(state.clone(), unchanged)).await;
        assert_eq!(plan.planned_state, state);
    }

    #[tokio::test]
    async fn update_changes_dynamic_type_and_rejects_identity_change() {
        let adapter = adapter(None).await;
        let (state, identity) = create(&adapter, config("a", Some("s1"))).await;

        let mut request = plan_request(state.clone(), config("b", None));
        request.prior_identity = identity.clone();
        let plan = adapter.plan(&call(), request).await;
        assert!(!plan.diagnostics.has_errors(), "{:?}", plan.diagnostics);
        assert_eq!(
            plan.planned_state.get_attr("dyn"),
            Some(&Value::unknown(Type::Dynamic))
        );

        let applied = adapter
            .apply(
                &call(),
                ApplyRequest {
                    prior_state: state,
                    planned_state: plan.planned_state,
                    config: config("b", None),
                    planned_private: plan.planned_private,
                    provider_meta: Value::null(Type::Dynamic),
                    planned_identity: plan.planned_identity,
                },
            )
            .await;
        assert_eq!(applied.new_state.get_attr("dyn"), Some(&Value::from(200)));
        assert_eq!(
            applied.new_state.get_attr("dyn").map(Value::ty),
            Some(Type::Number)
        );
        assert!(applied
            .diagnostics
            .errors()
            .any(|d| d.summary == "Unexpected Identity Change"));
    }

    #[tokio::test]
    async fn required_on_create_only_applies_to_create() {
        let adapter = adapter(None).await;
        let plan = adapter
            .plan(&call(), plan_request(Value::null(widget_schema().ty()), config("a", None)))
            .await;
        assert!(plan.diagnostics.has_errors());

        let (state, _) = create(&adapter, config("a", Some("s1"))).await;
        let plan = adapter.plan(&call(), plan_request(state, config("a", None))).await;
        assert!(!plan.diagnostics.has_errors(), "{:?}", plan.diagnostics);
    }

    #[tokio::test]
    async fn create_timeout_is_reported() {
        let adapter = adapter(Some(Duration::from_secs(5))).await;
        let timeouts = Value::object([("create", Value::from("10ms"))]);
        let config = config("a", Some("s1")).with_attr(TIMEOUTS_BLOCK, timeouts);
        let prior = Value::null(widget_schema().ty());
        let plan = adapter.plan(&call(), plan_request(prior.clone(), config.clone())).await;
        let applied = adapter
            .apply(
                &call(),
                ApplyRequest {
                    prior_state: prior,
                    planned_state: plan.planned_state,
                    config,
                    planned_private: plan.planned_private,
                    provider_meta: Value::null(Type::Dynamic),
                    planned_identity: None,
                },
            )
            .await;
        assert!(applied.new_state.is_null());
        assert!(applied
            .diagnostics
            .errors()
            .any(|d| d.summary == "Operation Timed Out"));
    }

    #[tokio::test]
    async fn move_state_selects_matching_mover() {
        let adapter = adapter(None).await;
        let request = |source: &str| MoveRequest {
            source_provider_address: "registry.terraform.io/hashicorp/random".to_string(),
            source_type_name: source.to_string(),
            source_schema_version: 0,
            source_state: crate::protocol::RawState::from_json(
                br#"{"result":"abc","length":3}"#.to_vec(),
            ),
            source_private: Vec::new(),
            source_identity: None,
            source_identity_schema_version: 0,
        };

        let moved = adapter.move_state(&call(), request("random_string")).await;
        assert!(!moved.diagnostics.has_errors(), "{:?}", moved.diagnostics);
        assert_eq!(moved.target_state.get_attr("name"), Some(&Value::from("abc")));

        let refused = adapter.move_state(&call(), request("random_pet")).await;
        assert_eq!(
            refused.diagnostics.errors().next().map(|d| d.summary.as_str()),
            Some("Unable to Move Resource State")
        );
    }

    #[tokio::test]
    async fn import_without_support_is_an_error() {
        let adapter = adapter(None).await;
        let response = adapter
            .import(
                &call(),
                ImportRequest {
                    type_name: "corner_widget".to_string(),
                    id: "w-1".to_string(),
                    identity: None,
                },
            )
            .await;
        assert!(response.imported.is_empty());
        assert!(response.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn import_returns_the_stub_without_reading() {
        let widget = Widget {
            importable: true,
            ..Default::default()
        };
        let reads = widget.reads.clone();
        let adapter = adapter_for(widget).await;
        let response = adapter
            .import(
                &call(),
                ImportRequest {
                    type_name: "corner_widget".to_string(),
                    id: "w-9".to_string(),
                    identity: None,
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(response.imported.len(), 1);
        let stub = &response.imported[0].state;
        assert_eq!(stub.get_attr("id"), Some(&Value::from("w-9")));
        assert_eq!(stub.get_attr("name"), Some(&Value::null(Type::String)));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn destroy_plans_reach_the_resource() {
        let adapter = adapter(None).await;
        let prior = config("alpha", Some("s-1"))
            .with_attr("id", Value::from("w-1"))
            .with_attr("password", Value::null(Type::String))
            .with_attr("dyn", Value::from(true));
        let identity = Value::object([("id", Value::from("w-1"))]);
        let plan = adapter
            .plan(
                &call(),
                PlanRequest {
                    prior_state: prior,
                    proposed_new_state: Value::null(widget_schema().ty()),
                    config: Value::null(widget_schema().ty()),
                    prior_private: Vec::new(),
                    provider_meta: Value::null(Type::Dynamic),
                    prior_identity: Some(identity.clone()),
                },
            )
            .await;
        assert!(plan.planned_state.is_null());
        assert!(!plan.diagnostics.has_errors(), "{:?}", plan.diagnostics);
        assert_eq!(
            plan.diagnostics.iter().map(|d| d.summary.as_str()).collect::<Vec<_>>(),
            vec!["Widget Destroyed"]
        );
        assert_eq!(plan.planned_identity, Some(identity));
    }
}
