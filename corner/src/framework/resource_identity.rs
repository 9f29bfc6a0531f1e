//! Named record addressable by resource identity

use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::import::import_state_passthrough_with_identity;
use plugkit::plan_modifier::UseStateForUnknown;
use plugkit::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, IdentityAttribute, IdentitySchema, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::{Type, Value};

#[derive(Default)]
pub struct IdentityResource {
    provider_data: Option<CornerProviderData>,
}

impl IdentityResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn identity(id: &str) -> Value {
        Value::object([("id", Value::from(id))])
    }
}

#[async_trait]
impl Resource for IdentityResource {
    fn type_name(&self) -> &str {
        "framework_identity"
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
                .attribute(AttributeBuilder::new("name", Type::String).required().build())
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn identity_schema(&self) -> Option<IdentitySchema> {
        Some(IdentitySchema::new(
            0,
            vec![IdentityAttribute::required_for_import("id", Type::String)],
        ))
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut response = ConfigureResourceResponse::default();
        match CornerProviderData::from_any(request.provider_data) {
            Ok(data) => self.provider_data = data,
            Err(diagnostic) => response.diagnostics.push(diagnostic),
        }
        response
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: request.planned_private,
                diagnostics,
                new_identity: None,
            };
        };
        let name = request
            .planned_state
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default();
        let id = provider_data.backend.put_record(&name).await;
        CreateResourceResponse {
            new_state: request.planned_state.with_attr("id", Value::from(id.as_str())),
            private: request.planned_private,
            diagnostics,
            new_identity: Some(Self::identity(&id)),
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut response = ReadResourceResponse::unchanged(&request);
        let Some(provider_data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };
        let Ok(id) = request.current_state.get_string(&AttributePath::new("id")) else {
            response.new_state = None;
            return response;
        };
        match provider_data.backend.get_record(&id).await {
            Some(name) => {
                response.new_state = Some(Value::object([
                    ("id", Value::from(id.as_str())),
                    ("name", Value::from(name)),
                ]));
                response.new_identity = Some(Self::identity(&id));
            }
            None => response.new_state = None,
        }
        response
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: request.planned_private,
                diagnostics,
                new_identity: request.planned_identity,
            };
        };
        let id = request
            .prior_state
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();
        let name = request
            .planned_state
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default();
        if let Err(e) = provider_data.backend.rename_record(&id, &name).await {
            diagnostics.add_error("Failed to update record", e.to_string());
        }
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics,
            new_identity: Some(Self::identity(&id)),
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut response = DeleteResourceResponse::default();
        let Some(provider_data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };
        if let Ok(id) = request.prior_state.get_string(&AttributePath::new("id")) {
            provider_data.backend.delete_record(&id).await;
        }
        response
    }

    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_with_identity(
            &ctx,
            AttributePath::new("id"),
            AttributePath::new("id"),
            &request,
            &mut response,
        );
        response
    }
}
