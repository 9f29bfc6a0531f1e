//! Resource with a required dynamic attribute, echoed back verbatim

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::Type;

pub struct DynamicResource;

#[async_trait]
impl Resource for DynamicResource {
    fn type_name(&self) -> &str {
        "framework_dynamic"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("dyn", Type::Dynamic)
                        .description("Any value; its concrete type is kept in state")
                        .required()
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
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
