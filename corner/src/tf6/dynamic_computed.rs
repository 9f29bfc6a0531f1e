//! Computed dynamic attribute: `true` after create, `200` after update

use async_trait::async_trait;
use plugkit::lowlevel::{
    mark_computed_unknown, ApplyRequest, ApplyResponse, Call, PlanRequest, PlanResponse,
    ResourceHandler,
};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::{Type, Value};

pub struct DynamicComputedHandler;

#[async_trait]
impl ResourceHandler for DynamicComputedHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(AttributeBuilder::new("trigger", Type::String).optional().build())
            .attribute(
                AttributeBuilder::new("dynamic_computed", Type::Dynamic)
                    .computed()
                    .build(),
            )
            .build()
    }

    async fn plan(&self, _call: &Call, request: PlanRequest) -> PlanResponse {
        let changed = request.prior_state.is_null()
            || request.prior_state.get_attr("trigger") != request.config.get_attr("trigger");
        if !changed {
            return PlanResponse::proposed(request);
        }
        let planned = mark_computed_unknown(
            &self.schema(),
            &request.config,
            request.proposed_new_state.clone(),
        );
        PlanResponse {
            planned_state: planned,
            ..PlanResponse::proposed(request)
        }
    }

    async fn apply(&self, _call: &Call, request: ApplyRequest) -> ApplyResponse {
        let new_state = if request.planned_state.is_null() {
            request.planned_state
        } else if request.prior_state.is_null() {
            request
                .planned_state
                .with_attr("dynamic_computed", Value::from(true))
        } else {
            request
                .planned_state
                .with_attr("dynamic_computed", Value::from(200_i64))
        };
        ApplyResponse {
            new_state,
            private: request.planned_private,
            new_identity: None,
            diagnostics: Diagnostics::new(),
        }
    }
}
