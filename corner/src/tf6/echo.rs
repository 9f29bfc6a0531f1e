//! Echoes its dynamic `data` attribute into state

use async_trait::async_trait;
use plugkit::lowlevel::{ApplyRequest, ApplyResponse, Call, PlanRequest, PlanResponse, ResourceHandler};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::{Diagnostic, Diagnostics};
use plugkit::value::Type;

pub struct EchoHandler;

impl EchoHandler {
    fn unknown_provider_config(call: &Call) -> Option<Diagnostic> {
        if call.provider_config.is_wholly_known() {
            return None;
        }
        Some(Diagnostic::error(
            "Unknown Provider Configuration",
            "The echo resource cannot be planned or applied while the provider configuration contains unknown values.",
        ))
    }
}

#[async_trait]
impl ResourceHandler for EchoHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("data", Type::Dynamic)
                    .description("Any value, stored as given")
                    .optional()
                    .build(),
            )
            .build()
    }

    async fn plan(&self, call: &Call, request: PlanRequest) -> PlanResponse {
        let mut response = PlanResponse::proposed(request);
        if let Some(diagnostic) = Self::unknown_provider_config(call) {
            response.diagnostics.push(diagnostic);
        }
        response
    }

    async fn apply(&self, call: &Call, request: ApplyRequest) -> ApplyResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(diagnostic) = Self::unknown_provider_config(call) {
            diagnostics.push(diagnostic);
        }
        ApplyResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            new_identity: None,
            diagnostics,
        }
    }
}
