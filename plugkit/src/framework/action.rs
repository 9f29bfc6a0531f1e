use super::{check_type_name, schema_result, validate_config};
use crate::action::{
    Action, ActionSchemaRequest, ConfigureActionRequest, InvokeActionRequest, PlanActionRequest,
    ProgressSink, ValidateActionConfigRequest,
};
use crate::context::Context;
use crate::error::Result;
use crate::lowlevel::{ActionHandler, ActionPlanResponse, Call};
use crate::provider::ActionFactory;
use crate::schema::Schema;
use crate::types::Diagnostics;
use crate::value::Value;
use async_trait::async_trait;
use tracing::debug;

pub(super) struct ActionAdapter {
    type_name: String,
    factory: ActionFactory,
    schema: Schema,
}

impl ActionAdapter {
    pub(super) async fn new(ctx: &Context, type_name: &str, factory: ActionFactory) -> Result<Self> {
        let probe = factory();
        check_type_name(type_name, probe.type_name())?;
        let response = probe.schema(ctx.clone(), ActionSchemaRequest).await;
        Ok(Self {
            type_name: type_name.to_string(),
            schema: schema_result(type_name, response.schema, response.diagnostics)?,
            factory,
        })
    }

    async fn instance(&self, call: &Call) -> std::result::Result<Box<dyn Action>, Diagnostics> {
        let mut action = (self.factory)();
        let response = action
            .configure(
                call.ctx.clone(),
                ConfigureActionRequest {
                    provider_data: call.provider_data.clone(),
                },
            )
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        Ok(action)
    }
}

#[async_trait]
impl ActionHandler for ActionAdapter {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    async fn validate(&self, call: &Call, config: &Value) -> Diagnostics {
        let action = match self.instance(call).await {
            Ok(a) => a,
            Err(d) => return d,
        };
        let mut diagnostics = validate_config(&self.schema, config, &[]);
        let response = action
            .validate(
                call.ctx.clone(),
                ValidateActionConfigRequest {
                    action_type: self.type_name.clone(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    async fn plan(&self, call: &Call, config: &Value) -> ActionPlanResponse {
        let action = match self.instance(call).await {
            Ok(a) => a,
            Err(diagnostics) => {
                return ActionPlanResponse {
                    diagnostics,
                    deferred: None,
                }
            }
        };
        let mut diagnostics = validate_config(&self.schema, config, &[]);
        let response = action
            .plan(
                call.ctx.clone(),
                PlanActionRequest {
                    action_type: self.type_name.clone(),
                    config: config.clone(),
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        ActionPlanResponse {
            diagnostics,
            deferred: response.deferred,
        }
    }

    async fn invoke(&self, call: &Call, config: Value, progress: ProgressSink) -> Diagnostics {
        debug!(type_name = %self.type_name, "invoking action");
        let action = match self.instance(call).await {
            Ok(a) => a,
            Err(d) => return d,
        };
        action
            .invoke(
                call.ctx.clone(),
                InvokeActionRequest {
                    action_type: self.type_name.clone(),
                    config,
                },
                progress,
            )
            .await
            .diagnostics
    }
}
