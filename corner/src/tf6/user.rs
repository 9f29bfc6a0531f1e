//! Low-level user resource and data source
//!
//! One handler serves every low-level provider; each registers it under its
//! own type name.

use crate::backend::{Backend, User};
use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use plugkit::lowlevel::{
    mark_computed_unknown, ApplyRequest, ApplyResponse, Call, DataSourceHandler, ImportRequest,
    ImportResponse, ImportedState, PlanRequest, PlanResponse, ReadDataRequest, ReadDataResponse,
    ReadRequest, ReadResponse, ResourceHandler,
};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostic, Diagnostics};
use plugkit::value::{Type, Value};
use std::sync::Arc;
use tracing::debug;

fn backend(call: &Call) -> Result<Arc<Backend>, Diagnostic> {
    call.provider_data::<CornerProviderData>()
        .map(|data| data.backend.clone())
        .ok_or_else(not_configured)
}

fn user_from(value: &Value) -> Result<User, Diagnostic> {
    let invalid = |e: plugkit::PlugkitError| Diagnostic::error("Invalid user", e.to_string());
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

pub struct UserHandler {
    type_name: String,
}

impl UserHandler {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

#[async_trait]
impl ResourceHandler for UserHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(AttributeBuilder::new("id", Type::String).computed().build())
            .attribute(AttributeBuilder::new("email", Type::String).required().build())
            .attribute(AttributeBuilder::new("name", Type::String).required().build())
            .attribute(AttributeBuilder::new("age", Type::Number).required().build())
            .build()
    }

    async fn plan(&self, _call: &Call, request: PlanRequest) -> PlanResponse {
        if request.proposed_new_state.is_null() || !request.prior_state.is_null() {
            let email_changed = !request.proposed_new_state.is_null()
                && request.prior_state.get_attr("email")
                    != request.proposed_new_state.get_attr("email");
            let mut response = PlanResponse::proposed(request);
            if email_changed {
                response.requires_replace.push(AttributePath::new("email"));
                response.planned_state = response
                    .planned_state
                    .with_attr("id", Value::unknown(Type::String));
            }
            return response;
        }
        let planned = mark_computed_unknown(
            &self.schema(),
            &request.config,
            request.proposed_new_state.clone(),
        );
        PlanResponse {
            planned_state: planned,
            ..PlanResponse::proposed(request)
        }
    }

    async fn apply(&self, call: &Call, request: ApplyRequest) -> ApplyResponse {
        let mut diagnostics = Diagnostics::new();
        let fail = |state: Value, diagnostic: Diagnostic, private: Vec<u8>| ApplyResponse {
            new_state: state,
            private,
            new_identity: None,
            diagnostics: Diagnostics::from(diagnostic),
        };
        let backend = match backend(call) {
            Ok(b) => b,
            Err(d) => return fail(request.prior_state, d, request.planned_private),
        };

        if request.planned_state.is_null() {
            debug!(type_name = %self.type_name, "deleting user");
            if let Ok(email) = request.prior_state.get_string(&AttributePath::new("email")) {
                if let Err(e) = backend.delete_user(&email).await {
                    diagnostics.add_error("Failed to delete user", e.to_string());
                }
            }
            return ApplyResponse {
                new_state: request.planned_state,
                private: Vec::new(),
                new_identity: None,
                diagnostics,
            };
        }

        let user = match user_from(&request.planned_state) {
            Ok(user) => user,
            Err(d) => return fail(request.prior_state, d, request.planned_private),
        };
        let result = if request.prior_state.is_null() {
            debug!(type_name = %self.type_name, email = %user.email, "creating user");
            backend.create_user(user.clone()).await
        } else {
            debug!(type_name = %self.type_name, email = %user.email, "updating user");
            backend.update_user(user.clone()).await
        };
        if let Err(e) = result {
            let diagnostic = Diagnostic::error(format!("Failed to apply {}", self.type_name), e.to_string());
            return fail(request.prior_state, diagnostic, request.planned_private);
        }

        ApplyResponse {
            new_state: state_from(&user),
            private: request.planned_private,
            new_identity: None,
            diagnostics,
        }
    }

    async fn read(&self, call: &Call, request: ReadRequest) -> ReadResponse {
        let backend = match backend(call) {
            Ok(b) => b,
            Err(d) => {
                let mut response = ReadResponse::unchanged(request);
                response.diagnostics.push(d);
                return response;
            }
        };
        let email = request
            .current_state
            .get_string(&AttributePath::new("email"))
            .unwrap_or_default();
        let ty = self.schema().ty();
        let mut response = ReadResponse::unchanged(request);
        response.new_state = match backend.read_user(&email).await {
            Some(user) => state_from(&user),
            None => Value::null(ty),
        };
        response
    }

    async fn import(&self, call: &Call, request: ImportRequest) -> ImportResponse {
        let mut response = ImportResponse::default();
        let backend = match backend(call) {
            Ok(b) => b,
            Err(d) => {
                response.diagnostics.push(d);
                return response;
            }
        };
        match backend.read_user(&request.id).await {
            Some(user) => response.imported.push(ImportedState {
                type_name: request.type_name,
                state: state_from(&user),
                private: Vec::new(),
                identity: None,
            }),
            None => response.diagnostics.add_error(
                "Cannot import non-existent remote object",
                format!("No user with email {:?} exists", request.id),
            ),
        }
        response
    }
}

pub struct UserDataHandler;

#[async_trait]
impl DataSourceHandler for UserDataHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(AttributeBuilder::new("email", Type::String).required().build())
            .attribute(AttributeBuilder::new("name", Type::String).computed().build())
            .attribute(AttributeBuilder::new("age", Type::Number).computed().build())
            .build()
    }

    async fn read(&self, call: &Call, request: ReadDataRequest) -> ReadDataResponse {
        let mut response = ReadDataResponse {
            state: request.config.clone(),
            diagnostics: Diagnostics::new(),
            deferred: None,
        };
        let backend = match backend(call) {
            Ok(b) => b,
            Err(d) => {
                response.diagnostics.push(d);
                return response;
            }
        };
        let email = request
            .config
            .get_string(&AttributePath::new("email"))
            .unwrap_or_default();
        match backend.read_user(&email).await {
            Some(user) => {
                response.state = request
                    .config
                    .with_attr("name", Value::from(user.name))
                    .with_attr("age", Value::from(user.age));
            }
            None => response.diagnostics.add_error(
                "User not found",
                format!("No user with email {:?} exists", email),
            ),
        }
        response
    }
}
