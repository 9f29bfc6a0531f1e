//! Resource that defers its change while its configuration is unknown

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ModifyPlanRequest, ModifyPlanResponse, ReadResourceRequest, ReadResourceResponse, Resource,
    ResourceSchemaRequest, ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::{Deferred, DeferredReason, Diagnostics};
use plugkit::value::Type;
use tracing::debug;

pub struct DeferredResource;

#[async_trait]
impl Resource for DeferredResource {
    fn type_name(&self) -> &str {
        "framework_deferred"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(AttributeBuilder::new("name", Type::String).required().build())
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        let deferred = if !request.config.is_wholly_known()
            && request.client_capabilities.deferral_allowed
        {
            debug!("configuration unknown, deferring framework_deferred");
            Some(Deferred::new(DeferredReason::ResourceConfigUnknown))
        } else {
            None
        };
        ModifyPlanResponse {
            planned_state: request.planned_state,
            requires_replace: Vec::new(),
            planned_private: request.prior_private,
            diagnostics: Diagnostics::new(),
            deferred,
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        CreateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        ReadResourceResponse::unchanged(&request)
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse::default()
    }
}
