//! Low-level target for state moved from `random_string`

use async_trait::async_trait;
use plugkit::lowlevel::{ApplyRequest, ApplyResponse, Call, MoveRequest, MoveResponse, ResourceHandler};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::{Type, Value};
use tracing::debug;

pub struct MovedRandomStringHandler;

#[async_trait]
impl ResourceHandler for MovedRandomStringHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("moved_random_string", Type::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    async fn apply(&self, _call: &Call, request: ApplyRequest) -> ApplyResponse {
        let new_state = if request.prior_state.is_null() && !request.planned_state.is_null() {
            request.planned_state.with_attr(
                "moved_random_string",
                Value::from(uuid::Uuid::new_v4().simple().to_string()),
            )
        } else {
            request.planned_state
        };
        ApplyResponse {
            new_state,
            private: request.planned_private,
            new_identity: None,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn move_state(&self, _call: &Call, request: MoveRequest) -> MoveResponse {
        let mut diagnostics = Diagnostics::new();
        let null = Value::null(self.schema().ty());
        if request.source_type_name != "random_string" {
            diagnostics.add_error(
                "Unable to Move Resource State",
                format!(
                    "tf6_moved_random_string only accepts state from random_string, not {}.",
                    request.source_type_name
                ),
            );
            return MoveResponse {
                target_state: null,
                target_private: Vec::new(),
                target_identity: None,
                diagnostics,
            };
        }

        let result = request
            .source_state
            .json
            .as_deref()
            .and_then(|raw| serde_json::from_slice::<serde_json::Value>(raw).ok())
            .and_then(|json| json.get("result").and_then(|r| r.as_str()).map(str::to_string));
        match result {
            Some(result) => {
                debug!(source_provider = %request.source_provider_address, "moving random_string");
                MoveResponse {
                    target_state: Value::object([("moved_random_string", Value::from(result))]),
                    target_private: Vec::new(),
                    target_identity: None,
                    diagnostics,
                }
            }
            None => {
                diagnostics.add_error(
                    "Unable to Move Resource State",
                    "The source state has no string result attribute.",
                );
                MoveResponse {
                    target_state: null,
                    target_private: Vec::new(),
                    target_identity: None,
                    diagnostics,
                }
            }
        }
    }
}
