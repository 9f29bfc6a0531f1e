//! Ephemeral resource trait for temporary resources
//!
//! Ephemeral results are never persisted. The framework tracks every open
//! instance and only renews or closes instances it opened.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Deferred, Diagnostics, PrivateStateData};
use crate::value::Value;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;

/// EphemeralResource trait for resources with temporary lifecycle
#[async_trait]
pub trait EphemeralResource: Send + Sync {
    /// MUST match the key used in Provider.ephemeral_resources()
    fn type_name(&self) -> &str;

    async fn schema(
        &self,
        ctx: Context,
        request: EphemeralResourceSchemaRequest,
    ) -> EphemeralResourceSchemaResponse;

    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureEphemeralResourceRequest,
    ) -> ConfigureEphemeralResourceResponse {
        ConfigureEphemeralResourceResponse::default()
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateEphemeralResourceConfigRequest,
    ) -> ValidateEphemeralResourceConfigResponse {
        ValidateEphemeralResourceConfigResponse::default()
    }

    /// Open/create the ephemeral resource (e.g., issue a token)
    async fn open(
        &self,
        ctx: Context,
        request: OpenEphemeralResourceRequest,
    ) -> OpenEphemeralResourceResponse;

    /// Renew the ephemeral resource (e.g., refresh a token)
    async fn renew(
        &self,
        _ctx: Context,
        request: RenewEphemeralResourceRequest,
    ) -> RenewEphemeralResourceResponse {
        RenewEphemeralResourceResponse {
            diagnostics: Diagnostics::new(),
            renew_at: None,
            private: request.private,
        }
    }

    /// Close the ephemeral resource (e.g., revoke a token)
    async fn close(
        &self,
        _ctx: Context,
        _request: CloseEphemeralResourceRequest,
    ) -> CloseEphemeralResourceResponse {
        CloseEphemeralResourceResponse::default()
    }
}

pub struct EphemeralResourceSchemaRequest;

pub struct EphemeralResourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Diagnostics,
}

pub struct ConfigureEphemeralResourceRequest {
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub struct ConfigureEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
}

pub struct ValidateEphemeralResourceConfigRequest {
    pub type_name: String,
    pub config: Value,
}

#[derive(Default)]
pub struct ValidateEphemeralResourceConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct OpenEphemeralResourceRequest {
    pub type_name: String,
    pub config: Value,
    pub client_capabilities: ClientCapabilities,
}

pub struct OpenEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
    /// Wall-clock deadline by which the engine should call renew
    pub renew_at: Option<DateTime<Utc>>,
    pub result: Value,
    pub private: PrivateStateData,
    pub deferred: Option<Deferred>,
}

pub struct RenewEphemeralResourceRequest {
    pub type_name: String,
    pub private: PrivateStateData,
}

pub struct RenewEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
    pub renew_at: Option<DateTime<Utc>>,
    pub private: PrivateStateData,
}

pub struct CloseEphemeralResourceRequest {
    pub type_name: String,
    pub private: PrivateStateData,
}

#[derive(Default)]
pub struct CloseEphemeralResourceResponse {
    pub diagnostics: Diagnostics,
}
