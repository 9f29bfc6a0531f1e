//! Resource with an attribute that must be set on create but may be
//! dropped from configuration later

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::plan_modifier::{RequiredOnCreate, UseStateForUnknown};
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::{Type, Value};

pub struct RequiredOnCreateResource;

#[async_trait]
impl Resource for RequiredOnCreateResource {
    fn type_name(&self) -> &str {
        "framework_required_on_create"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("id", Type::String)
                        .computed()
                        .plan_modifier(UseStateForUnknown::create())
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("name", Type::String)
                        .optional()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("initial_password", Type::String)
                        .description("Required when the resource is created, ignored afterwards")
                        .optional()
                        .sensitive()
                        .plan_modifier(RequiredOnCreate::create())
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
                .with_attr("id", Value::from(uuid::Uuid::new_v4().to_string())),
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
