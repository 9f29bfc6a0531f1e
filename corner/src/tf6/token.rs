//! Low-level ephemeral token

use crate::backend::Event;
use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plugkit::lowlevel::{
    Call, CloseRequest, EphemeralHandler, OpenRequest, OpenResponse, RenewRequest, RenewResponse,
};
use plugkit::schema::{AttributeBuilder, Schema, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::{Type, Value};

pub struct TokenHandler;

fn renew_at(data: &CornerProviderData) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(data.renew_interval)
        .ok()
        .map(|d| Utc::now() + d)
}

#[async_trait]
impl EphemeralHandler for TokenHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(AttributeBuilder::new("name", Type::String).required().build())
            .attribute(
                AttributeBuilder::new("token", Type::String)
                    .computed()
                    .sensitive()
                    .build(),
            )
            .build()
    }

    async fn open(&self, call: &Call, request: OpenRequest) -> OpenResponse {
        let Some(data) = call.provider_data::<CornerProviderData>() else {
            return OpenResponse {
                result: request.config,
                renew_at: None,
                private: Vec::new(),
                diagnostics: Diagnostics::from(not_configured()),
                deferred: None,
            };
        };
        let name = request
            .config
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default();
        data.backend.record(Event::Opened(name.clone())).await;
        OpenResponse {
            result: request
                .config
                .with_attr("token", Value::from(uuid::Uuid::new_v4().to_string())),
            renew_at: renew_at(&data),
            private: name.into_bytes(),
            diagnostics: Diagnostics::new(),
            deferred: None,
        }
    }

    async fn renew(&self, call: &Call, request: RenewRequest) -> RenewResponse {
        let Some(data) = call.provider_data::<CornerProviderData>() else {
            return RenewResponse {
                private: request.private,
                diagnostics: Diagnostics::from(not_configured()),
                ..Default::default()
            };
        };
        let name = String::from_utf8_lossy(&request.private).into_owned();
        data.backend.record(Event::Renewed(name)).await;
        RenewResponse {
            renew_at: renew_at(&data),
            private: request.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn close(&self, call: &Call, request: CloseRequest) -> Diagnostics {
        let Some(data) = call.provider_data::<CornerProviderData>() else {
            return Diagnostics::from(not_configured());
        };
        let name = String::from_utf8_lossy(&request.private).into_owned();
        data.backend.record(Event::Closed(name)).await;
        Diagnostics::new()
    }
}
