//! User resource backed by the in-process backend

use crate::backend::User;
use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::import::import_state_passthrough_id;
use plugkit::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
use plugkit::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostic, Diagnostics};
use plugkit::validator::{NumberRangeValidator, StringLengthValidator, StringPatternValidator};
use plugkit::value::{Type, Value};
use tracing::debug;

#[derive(Default)]
pub struct UserResource {
    provider_data: Option<CornerProviderData>,
}

impl UserResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema() -> Schema {
        let mut email = AttributeBuilder::new("email", Type::String)
            .description("Unique address of the user")
            .required()
            .plan_modifier(RequiresReplaceIfChanged::create());
        if let Ok(pattern) = regex::Regex::new(r"^[^@\s]+@[^@\s]+$") {
            email = email.validator(StringPatternValidator::create(pattern, "an email address"));
        }

        SchemaBuilder::new()
            .version(0)
            .description("Manages a user of the corner backend")
            .attribute(
                AttributeBuilder::new("id", Type::String)
                    .description("Same as email")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(email.build())
            .attribute(
                AttributeBuilder::new("name", Type::String)
                    .description("Display name")
                    .required()
                    .validator(StringLengthValidator::create(Some(1), None))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("age", Type::Number)
                    .description("Age in years")
                    .required()
                    .validator(NumberRangeValidator::create(Some(0), Some(150)))
                    .build(),
            )
            .build()
    }

    fn user_from(value: &Value) -> Result<User, Diagnostic> {
        let invalid = |e: plugkit::PlugkitError| {
            Diagnostic::error("Invalid user configuration", e.to_string())
        };
        Ok(User {
            email: value.get_string(&AttributePath::new("email")).map_err(invalid)?,
            name: value.get_string(&AttributePath::new("name")).map_err(invalid)?,
            age: value.get_i64(&AttributePath::new("age")).map_err(invalid)?,
        })
    }

    fn state_from(user: &User) -> Value {
        Value::object([
            ("id", Value::from(user.email.as_str())),
            ("email", Value::from(user.email.as_str())),
            ("name", Value::from(user.name.as_str())),
            ("age", Value::from(user.age)),
        ])
    }
}

#[async_trait]
impl Resource for UserResource {
    fn type_name(&self) -> &str {
        "framework_user"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: Self::schema(),
            diagnostics: Diagnostics::new(),
        }
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

        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                diagnostics.push(not_configured());
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: request.planned_private,
                    diagnostics,
                    new_identity: None,
                };
            }
        };

        let user = match Self::user_from(&request.planned_state) {
            Ok(user) => user,
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: request.planned_private,
                    diagnostics,
                    new_identity: None,
                };
            }
        };

        debug!(email = %user.email, "creating framework_user");
        if let Err(e) = provider_data.backend.create_user(user.clone()).await {
            diagnostics.add_error("Failed to create user", e.to_string());
        }

        CreateResourceResponse {
            new_state: Self::state_from(&user),
            private: request.planned_private,
            diagnostics,
            new_identity: None,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            let mut response = ReadResourceResponse::unchanged(&request);
            response.diagnostics.push(not_configured());
            return response;
        };

        let email = match request.current_state.get_string(&AttributePath::new("email")) {
            Ok(email) => email,
            Err(e) => {
                let mut response = ReadResourceResponse::unchanged(&request);
                response
                    .diagnostics
                    .add_error("Failed to read user", e.to_string());
                return response;
            }
        };

        let mut response = ReadResourceResponse::unchanged(&request);
        response.new_state = provider_data
            .backend
            .read_user(&email)
            .await
            .map(|user| Self::state_from(&user));
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
                new_identity: None,
            };
        };

        let user = match Self::user_from(&request.planned_state) {
            Ok(user) => user,
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: request.planned_private,
                    diagnostics,
                    new_identity: None,
                };
            }
        };

        if let Err(e) = provider_data.backend.update_user(user.clone()).await {
            diagnostics.add_error("Failed to update user", e.to_string());
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: request.planned_private,
                diagnostics,
                new_identity: None,
            };
        }

        UpdateResourceResponse {
            new_state: Self::state_from(&user),
            private: request.planned_private,
            diagnostics,
            new_identity: None,
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut response = DeleteResourceResponse::default();
        let Some(provider_data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };
        let email = match request.prior_state.get_string(&AttributePath::new("email")) {
            Ok(email) => email,
            Err(e) => {
                response
                    .diagnostics
                    .add_error("Failed to delete user", e.to_string());
                return response;
            }
        };
        if let Err(e) = provider_data.backend.delete_user(&email).await {
            response
                .diagnostics
                .add_error("Failed to delete user", e.to_string());
        }
        response
    }

    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_id(&ctx, AttributePath::new("email"), &request, &mut response);
        response
    }
}
