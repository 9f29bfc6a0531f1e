//! Action that reports progress while it sends a notification

use crate::backend::Event;
use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use plugkit::action::{
    Action, ActionSchemaRequest, ActionSchemaResponse, ConfigureActionRequest,
    ConfigureActionResponse, InvokeActionRequest, InvokeActionResponse, ProgressSink,
    ValidateActionConfigRequest, ValidateActionConfigResponse,
};
use plugkit::context::Context;
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::validator::NumberRangeValidator;
use plugkit::value::Type;
use tracing::debug;

const DEFAULT_STEPS: i64 = 3;

#[derive(Default)]
pub struct NotifyAction {
    provider_data: Option<CornerProviderData>,
}

impl NotifyAction {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Action for NotifyAction {
    fn type_name(&self) -> &str {
        "framework_notify"
    }

    async fn schema(&self, _ctx: Context, _request: ActionSchemaRequest) -> ActionSchemaResponse {
        ActionSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(AttributeBuilder::new("message", Type::String).required().build())
                .attribute(
                    AttributeBuilder::new("steps", Type::Number)
                        .description("Number of progress events to send")
                        .optional()
                        .validator(NumberRangeValidator::create(Some(1), Some(10)))
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureActionRequest,
    ) -> ConfigureActionResponse {
        let mut response = ConfigureActionResponse::default();
        match CornerProviderData::from_any(request.provider_data) {
            Ok(data) => self.provider_data = data,
            Err(diagnostic) => response.diagnostics.push(diagnostic),
        }
        response
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateActionConfigRequest,
    ) -> ValidateActionConfigResponse {
        let mut diagnostics = Diagnostics::new();
        let path = AttributePath::new("message");
        if let Ok(Some(message)) = request.config.get_optional_string(&path) {
            if message.trim().is_empty() {
                diagnostics.add_attribute_error(path, "Empty Message", "message must not be blank");
            }
        }
        ValidateActionConfigResponse { diagnostics }
    }

    async fn invoke(
        &self,
        _ctx: Context,
        request: InvokeActionRequest,
        progress: ProgressSink,
    ) -> InvokeActionResponse {
        let mut response = InvokeActionResponse::default();
        let Some(provider_data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };
        let message = request
            .config
            .get_string(&AttributePath::new("message"))
            .unwrap_or_default();
        let steps = request
            .config
            .get_i64(&AttributePath::new("steps"))
            .unwrap_or(DEFAULT_STEPS);

        for step in 1..=steps {
            let line = format!("{} ({}/{})", message, step, steps);
            provider_data.backend.record(Event::Progress(line.clone())).await;
            if !progress.send(line).await {
                debug!(step, "progress receiver gone, stopping notification");
                break;
            }
        }
        response
    }
}
