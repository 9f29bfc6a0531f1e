//! Resource whose computed dynamic attribute changes type between create
//! and update

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::{Type, Value};

pub struct DynamicComputedResource;

#[async_trait]
impl Resource for DynamicComputedResource {
    fn type_name(&self) -> &str {
        "framework_dynamic_computed"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("trigger", Type::String)
                        .description("Changing this causes an update")
                        .optional()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("dynamic_computed", Type::Dynamic)
                        .description("true after create, 200 after every update")
                        .computed()
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        CreateResourceResponse {
            new_state: request
                .planned_state
                .with_attr("dynamic_computed", Value::from(true)),
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
            new_state: request
                .planned_state
                .with_attr("dynamic_computed", Value::from(200_i64)),
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse::default()
    }
}
