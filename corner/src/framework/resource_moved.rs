//! Target for state moved from a `random_string` resource

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    MoveStateResponse, ReadResourceRequest, ReadResourceResponse, Resource,
    ResourceSchemaRequest, ResourceSchemaResponse, StateMover, UpdateResourceRequest,
    UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::{Diagnostics, PrivateStateData};
use plugkit::value::{Type, Value};
use tracing::debug;

pub const SOURCE_TYPE_NAME: &str = "random_string";

pub struct MovedRandomStringResource;

impl MovedRandomStringResource {
    pub fn schema() -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("moved_random_string", Type::String)
                    .description("Random string, generated on create or carried over from random_string.result")
                    .computed()
                    .build(),
            )
            .build()
    }

    /// The part of the random provider's schema the mover reads.
    fn source_schema() -> Schema {
        SchemaBuilder::new()
            .version(2)
            .attribute(AttributeBuilder::new("id", Type::String).computed().build())
            .attribute(AttributeBuilder::new("length", Type::Number).required().build())
            .attribute(AttributeBuilder::new("result", Type::String).computed().build())
            .build()
    }
}

#[async_trait]
impl Resource for MovedRandomStringResource {
    fn type_name(&self) -> &str {
        "framework_moved_random_string"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: Self::schema(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let generated = uuid::Uuid::new_v4().simple().to_string();
        CreateResourceResponse {
            new_state: request
                .planned_state
                .with_attr("moved_random_string", Value::from(generated)),
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

    fn state_movers(&self) -> Vec<StateMover> {
        vec![StateMover::new(Some(Self::source_schema()), |request| {
            if request.source_type_name != SOURCE_TYPE_NAME {
                return None;
            }
            let result = request.source_state.as_ref()?.get_attr("result")?.clone();
            debug!(
                source_provider = %request.source_provider_address,
                "moving random_string into framework_moved_random_string"
            );
            let mut diagnostics = Diagnostics::new();
            if result.is_null() {
                diagnostics.add_error(
                    "Unable to Move Resource State",
                    "The source random_string has no result to carry over.",
                );
            }
            Some(MoveStateResponse {
                target_state: Value::object([("moved_random_string", result)]),
                target_private: PrivateStateData::new(),
                target_identity: None,
                diagnostics,
            })
        })]
    }
}
