//! Short-lived token that must be renewed while in use

use crate::backend::Event;
use crate::provider_data::{not_configured, CornerProviderData};
use async_trait::async_trait;
use chrono::Utc;
use plugkit::context::Context;
use plugkit::ephemeral::{
    CloseEphemeralResourceRequest, CloseEphemeralResourceResponse,
    ConfigureEphemeralResourceRequest, ConfigureEphemeralResourceResponse, EphemeralResource,
    EphemeralResourceSchemaRequest, EphemeralResourceSchemaResponse, OpenEphemeralResourceRequest,
    OpenEphemeralResourceResponse, RenewEphemeralResourceRequest, RenewEphemeralResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder};
use plugkit::types::{AttributePath, Diagnostics, PrivateStateData};
use plugkit::value::{Type, Value};
use tracing::debug;

const NAME_KEY: &str = "name";

#[derive(Default)]
pub struct TokenEphemeralResource {
    provider_data: Option<CornerProviderData>,
}

impl TokenEphemeralResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn renew_at(&self) -> Option<chrono::DateTime<Utc>> {
        let interval = self.provider_data.as_ref()?.renew_interval;
        chrono::Duration::from_std(interval)
            .ok()
            .map(|d| Utc::now() + d)
    }

    fn name(private: &PrivateStateData) -> String {
        private
            .get_key(NAME_KEY)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EphemeralResource for TokenEphemeralResource {
    fn type_name(&self) -> &str {
        "framework_token"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: EphemeralResourceSchemaRequest,
    ) -> EphemeralResourceSchemaResponse {
        EphemeralResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(AttributeBuilder::new("name", Type::String).required().build())
                .attribute(
                    AttributeBuilder::new("token", Type::String)
                        .computed()
                        .sensitive()
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureEphemeralResourceRequest,
    ) -> ConfigureEphemeralResourceResponse {
        let mut response = ConfigureEphemeralResourceResponse::default();
        match CornerProviderData::from_any(request.provider_data) {
            Ok(data) => self.provider_data = data,
            Err(diagnostic) => response.diagnostics.push(diagnostic),
        }
        response
    }

    async fn open(
        &self,
        _ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> OpenEphemeralResourceResponse {
        let mut diagnostics = Diagnostics::new();
        let mut private = PrivateStateData::new();
        let Some(provider_data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return OpenEphemeralResourceResponse {
                diagnostics,
                renew_at: None,
                result: request.config,
                private,
                deferred: None,
            };
        };

        let name = request
            .config
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default();
        debug!(name = %name, "opening framework_token");
        provider_data.backend.record(Event::Opened(name.clone())).await;
        private.set_key(NAME_KEY, name.into_bytes());

        OpenEphemeralResourceResponse {
            diagnostics,
            renew_at: self.renew_at(),
            result: request
                .config
                .with_attr("token", Value::from(uuid::Uuid::new_v4().to_string())),
            private,
            deferred: None,
        }
    }

    async fn renew(
        &self,
        _ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> RenewEphemeralResourceResponse {
        let mut diagnostics = Diagnostics::new();
        match &self.provider_data {
            Some(provider_data) => {
                provider_data
                    .backend
                    .record(Event::Renewed(Self::name(&request.private)))
                    .await
            }
            None => diagnostics.push(not_configured()),
        }
        RenewEphemeralResourceResponse {
            diagnostics,
            renew_at: self.renew_at(),
            private: request.private,
        }
    }

    async fn close(
        &self,
        _ctx: Context,
        request: CloseEphemeralResourceRequest,
    ) -> CloseEphemeralResourceResponse {
        let mut response = CloseEphemeralResourceResponse::default();
        match &self.provider_data {
            Some(provider_data) => {
                provider_data
                    .backend
                    .record(Event::Closed(Self::name(&request.private)))
                    .await
            }
            None => response.diagnostics.push(not_configured()),
        }
        response
    }
}
