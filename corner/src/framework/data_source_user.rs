//! User lookup by email

use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, ReadDataSourceRequest, ReadDataSourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::{Type, Value};

#[derive(Default)]
pub struct UserDataSource {
    provider_data: Option<CornerProviderData>,
}

impl UserDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataSource for UserDataSource {
    fn type_name(&self) -> &str {
        "framework_user"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: SchemaBuilder::new()
                .description("Reads a user of the corner backend")
                .attribute(AttributeBuilder::new("email", Type::String).required().build())
                .attribute(AttributeBuilder::new("name", Type::String).computed().build())
                .attribute(AttributeBuilder::new("age", Type::Number).computed().build())
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut response = ConfigureDataSourceResponse::default();
        match CornerProviderData::from_any(request.provider_data) {
            Ok(data) => self.provider_data = data,
            Err(diagnostic) => response.diagnostics.push(diagnostic),
        }
        response
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadDataSourceResponse {
                state: request.config,
                diagnostics,
                deferred: None,
            };
        };

        let path = AttributePath::new("email");
        let email = match request.config.get_string(&path) {
            Ok(email) => email,
            Err(e) => {
                diagnostics.add_attribute_error(path, "Invalid email", e.to_string());
                return ReadDataSourceResponse {
                    state: request.config,
                    diagnostics,
                    deferred: None,
                };
            }
        };

        match provider_data.backend.read_user(&email).await {
            Some(user) => ReadDataSourceResponse {
                state: request
                    .config
                    .with_attr("name", Value::from(user.name))
                    .with_attr("age", Value::from(user.age)),
                diagnostics,
                deferred: None,
            },
            None => {
                diagnostics.add_attribute_error(
                    path,
                    "User not found",
                    format!("No user with email {:?} exists", email),
                );
                ReadDataSourceResponse {
                    state: request.config,
                    diagnostics,
                    deferred: None,
                }
            }
        }
    }
}
