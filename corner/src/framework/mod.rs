//! Typed-framework corner provider
//!
//! Every type here is named `framework_*`. Most resources exercise one
//! behavior of the framework runtime each, against the in-process backend.

pub mod action_notify;
pub mod data_source_user;
pub mod ephemeral_token;
pub mod functions;
pub mod resource_deferred;
pub mod resource_dynamic;
pub mod resource_dynamic_computed;
pub mod resource_float32;
pub mod resource_identity;
pub mod resource_ip_set;
pub mod resource_moved;
pub mod resource_required_on_create;
pub mod resource_set_pseudo;
pub mod resource_timeouts;
pub mod resource_user;
pub mod resource_write_only;

use crate::backend::Backend;
use crate::provider_data::{CornerProviderData, DEFAULT_RENEW_INTERVAL};
use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::provider::{
    ActionFactory, ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory,
    EphemeralResourceFactory, FunctionFactory, Provider, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory, ValidateProviderConfigRequest,
    ValidateProviderConfigResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::timeouts::parse_duration;
use plugkit::types::{AttributePath, Deferred, DeferredReason, Diagnostics};
use plugkit::value::{Type, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct CornerProvider {
    backend: Arc<Backend>,
    set_pseudo: bool,
}

impl Default for CornerProvider {
    fn default() -> Self {
        Self::new(Arc::new(Backend::new()))
    }
}

impl CornerProvider {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            set_pseudo: false,
        }
    }

    /// Also registers `framework_set_pseudo`, whose schema every server
    /// must reject.
    pub fn with_set_pseudo(mut self) -> Self {
        self.set_pseudo = true;
        self
    }
}

fn renew_interval(config: &Value) -> Result<Duration, Diagnostics> {
    let path = AttributePath::new("renew_interval");
    match config.get_path(&path).and_then(Value::as_str) {
        None => Ok(DEFAULT_RENEW_INTERVAL),
        Some(raw) => parse_duration(raw).map_err(|e| {
            let mut diagnostics = Diagnostics::new();
            diagnostics.add_attribute_error(path, "Invalid Renew Interval", e.to_string());
            diagnostics
        }),
    }
}

#[async_trait]
impl Provider for CornerProvider {
    fn type_name(&self) -> &str {
        "framework"
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .description("Corner-case provider built on the typed framework")
            .attribute(
                AttributeBuilder::new("renew_interval", Type::String)
                    .description("How long ephemeral tokens stay valid before renewal, such as \"5s\"")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        let diagnostics = match renew_interval(&request.config) {
            Ok(_) => Diagnostics::new(),
            Err(diagnostics) => diagnostics,
        };
        ValidateProviderConfigResponse { diagnostics }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        if !request.config.is_wholly_known() {
            let mut response = ConfigureProviderResponse::default();
            if request.client_capabilities.deferral_allowed {
                debug!("provider configuration unknown, deferring");
                response.deferred = Some(Deferred::new(DeferredReason::ProviderConfigUnknown));
            } else {
                response.diagnostics.add_error(
                    "Unknown Provider Configuration",
                    "The provider configuration contains values that are not known until apply.",
                );
            }
            return response;
        }

        let interval = match renew_interval(&request.config) {
            Ok(interval) => interval,
            Err(diagnostics) => {
                return ConfigureProviderResponse {
                    diagnostics,
                    ..Default::default()
                }
            }
        };

        info!(
            terraform_version = %request.terraform_version,
            renew_interval = ?interval,
            "configured framework provider"
        );
        let data = CornerProviderData::new(self.backend.clone()).with_renew_interval(interval);
        ConfigureProviderResponse {
            provider_data: Some(Arc::new(data)),
            ..Default::default()
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "framework_user".to_string(),
            Box::new(|| Box::new(resource_user::UserResource::new())),
        );
        resources.insert(
            "framework_dynamic".to_string(),
            Box::new(|| Box::new(resource_dynamic::DynamicResource)),
        );
        resources.insert(
            "framework_dynamic_computed".to_string(),
            Box::new(|| Box::new(resource_dynamic_computed::DynamicComputedResource)),
        );
        resources.insert(
            "framework_write_only".to_string(),
            Box::new(|| Box::new(resource_write_only::WriteOnlyResource)),
        );
        resources.insert(
            "framework_moved_random_string".to_string(),
            Box::new(|| Box::new(resource_moved::MovedRandomStringResource)),
        );
        resources.insert(
            "framework_identity".to_string(),
            Box::new(|| Box::new(resource_identity::IdentityResource::new())),
        );
        resources.insert(
            "framework_required_on_create".to_string(),
            Box::new(|| Box::new(resource_required_on_create::RequiredOnCreateResource)),
        );
        resources.insert(
            "framework_float32".to_string(),
            Box::new(|| Box::new(resource_float32::Float32Resource)),
        );
        resources.insert(
            "framework_ip_set".to_string(),
            Box::new(|| Box::new(resource_ip_set::IpSetResource)),
        );
        resources.insert(
            "framework_timeouts".to_string(),
            Box::new(|| Box::new(resource_timeouts::TimeoutsResource)),
        );
        resources.insert(
            "framework_deferred".to_string(),
            Box::new(|| Box::new(resource_deferred::DeferredResource)),
        );
        if self.set_pseudo {
            resources.insert(
                "framework_set_pseudo".to_string(),
                Box::new(|| Box::new(resource_set_pseudo::SetPseudoResource)),
            );
        }
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(
            "framework_user".to_string(),
            Box::new(|| Box::new(data_source_user::UserDataSource::new())),
        );
        data_sources
    }

    fn ephemeral_resources(&self) -> HashMap<String, EphemeralResourceFactory> {
        let mut ephemeral: HashMap<String, EphemeralResourceFactory> = HashMap::new();
        ephemeral.insert(
            "framework_token".to_string(),
            Box::new(|| Box::new(ephemeral_token::TokenEphemeralResource::new())),
        );
        ephemeral
    }

    fn functions(&self) -> HashMap<String, FunctionFactory> {
        let mut functions: HashMap<String, FunctionFactory> = HashMap::new();
        functions.insert("bool".to_string(), Box::new(|| Box::new(functions::BoolFunction)));
        functions.insert(
            "concat".to_string(),
            Box::new(|| Box::new(functions::ConcatFunction)),
        );
        functions.insert(
            "float32".to_string(),
            Box::new(|| Box::new(functions::Float32Function)),
        );
        functions
    }

    fn actions(&self) -> HashMap<String, ActionFactory> {
        let mut actions: HashMap<String, ActionFactory> = HashMap::new();
        actions.insert(
            "framework_notify".to_string(),
            Box::new(|| Box::new(action_notify::NotifyAction::new())),
        );
        actions
    }
}
