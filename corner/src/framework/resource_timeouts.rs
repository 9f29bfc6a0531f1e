//! Resource whose create takes as long as configured, bounded by the
//! `timeouts` block

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::timeouts::{self, parse_duration, TimeoutOperation};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::Type;
use tracing::debug;

pub struct TimeoutsResource;

#[async_trait]
impl Resource for TimeoutsResource {
    fn type_name(&self) -> &str {
        "framework_timeouts"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("create_duration", Type::String)
                        .description("How long create takes, such as \"2s\"")
                        .optional()
                        .build(),
                )
                .block(timeouts::block(&[
                    TimeoutOperation::Create,
                    TimeoutOperation::Delete,
                ]))
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let mut diagnostics = Diagnostics::new();
        let path = AttributePath::new("create_duration");
        match request.planned_state.get_optional_string(&path) {
            Ok(Some(raw)) => match parse_duration(&raw) {
                Ok(duration) => {
                    debug!(duration = ?duration, "simulating slow create");
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = ctx.cancelled() => debug!("create abandoned"),
                    }
                }
                Err(e) => diagnostics.add_attribute_error(path, "Invalid Duration", e.to_string()),
            },
            Ok(None) => {}
            Err(e) => diagnostics.add_attribute_error(path, "Invalid Duration", e.to_string()),
        }
        CreateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics,
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
