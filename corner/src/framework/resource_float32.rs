//! Number attribute stored with 32-bit precision

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::semantic::Float32Adapter;
use plugkit::types::Diagnostics;
use plugkit::value::number::to_f32;
use plugkit::value::{Type, Value};

pub struct Float32Resource;

impl Float32Resource {
    /// What the remote side keeps: the value narrowed to `f32` and read
    /// back as `f64`, so 1.1 comes back as 1.100000023841858.
    fn stored(planned: Value) -> Value {
        let narrowed = planned
            .get_attr("number")
            .and_then(Value::as_number)
            .and_then(|n| to_f32(n).ok())
            .and_then(|f| Value::from_f64(f64::from(f)));
        match narrowed {
            Some(n) => planned.with_attr("number", n),
            None => planned,
        }
    }
}

#[async_trait]
impl Resource for Float32Resource {
    fn type_name(&self) -> &str {
        "framework_float32"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("number", Type::Number)
                        .description("Stored as a 32-bit float")
                        .required()
                        .semantic(Float32Adapter::create())
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        CreateResourceResponse {
            new_state: Self::stored(request.planned_state),
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
            new_state: Self::stored(request.planned_state),
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugkit::semantic::values_equal;

    #[test]
    fn stored_value_is_semantically_equal_to_config() {
        let config = Value::object([("number", Value::from_f64(1.1).unwrap())]);
        let stored = Float32Resource::stored(config.clone());
        assert_ne!(stored, config);
        assert!(values_equal(
            Some(&Float32Adapter::create()),
            stored.get_attr("number").unwrap(),
            config.get_attr("number").unwrap(),
        ));
    }
}
