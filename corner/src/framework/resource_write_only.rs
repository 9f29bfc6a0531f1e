//! Resource with a write-only attribute that never reaches state

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::{Type, Value};
use tracing::debug;

pub struct WriteOnlyResource;

impl WriteOnlyResource {
    /// Reads the password from configuration, the only place it exists.
    fn password_length(config: &Value) -> usize {
        config
            .get_optional_string(&AttributePath::new("writeonly_password"))
            .ok()
            .flatten()
            .map(|p| p.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Resource for WriteOnlyResource {
    fn type_name(&self) -> &str {
        "framework_write_only"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("name", Type::String)
                        .optional()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("writeonly_password", Type::String)
                        .description("Sent to the provider on every apply, never stored")
                        .required()
                        .sensitive()
                        .write_only()
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        debug!(
            password_length = Self::password_length(&request.config),
            "creating framework_write_only"
        );
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
        debug!(
            password_length = Self::password_length(&request.config),
            "updating framework_write_only"
        );
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
