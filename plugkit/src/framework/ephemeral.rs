use super::{check_type_name, decode_private, encode_private, schema_result, validate_config};
use crate::context::Context;
use crate::ephemeral::{
    CloseEphemeralResourceRequest, ConfigureEphemeralResourceRequest, EphemeralResource,
    EphemeralResourceSchemaRequest, OpenEphemeralResourceRequest, RenewEphemeralResourceRequest,
    ValidateEphemeralResourceConfigRequest,
};
use crate::error::Result;
use crate::lowlevel::{
    Call, CloseRequest, EphemeralHandler, OpenRequest, OpenResponse, RenewRequest, RenewResponse,
};
use crate::provider::EphemeralResourceFactory;
use crate::schema::Schema;
use crate::types::Diagnostics;
use crate::value::Value;
use async_trait::async_trait;
use tracing::debug;

pub(super) struct EphemeralAdapter {
    type_name: String,
    factory: EphemeralResourceFactory,
    schema: Schema,
}

impl EphemeralAdapter {
    pub(super) async fn new(
        ctx: &Context,
        type_name: &str,
        factory: EphemeralResourceFactory,
    ) -> Result<Self> {
        let probe = factory();
        check_type_name(type_name, probe.type_name())?;
        let response = probe
            .schema(ctx.clone(), EphemeralResourceSchemaRequest)
            .await;
        Ok(Self {
            type_name: type_name.to_string(),
            schema: schema_result(type_name, response.schema, response.diagnostics)?,
            factory,
        })
    }

    async fn instance(
        &self,
        call: &Call,
    ) -> std::result::Result<Box<dyn EphemeralResource>, Diagnostics> {
        let mut resource = (self.factory)();
        let response = resource
            .configure(
                call.ctx.clone(),
                ConfigureEphemeralResourceRequest {
                    provider_data: call.provider_data.clone(),
                },
            )
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }
}

#[async_trait]
impl EphemeralHandler for EphemeralAdapter {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    async fn validate(&self, call: &Call, config: &Value) -> Diagnostics {
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return d,
        };
        let mut diagnostics = validate_config(&self.schema, config, &[]);
        let response = resource
            .validate(
                call.ctx.clone(),
                ValidateEphemeralResourceConfigRequest {
                    type_name: self.type_name.clone(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    async fn open(&self, call: &Call, request: OpenRequest) -> OpenResponse {
        debug!(type_name = %self.type_name, "opening ephemeral resource");
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(diagnostics) => {
                return OpenResponse {
                    result: Value::null(self.schema.ty()),
                    renew_at: None,
                    private: Vec::new(),
                    diagnostics,
                    deferred: None,
                }
            }
        };
        let response = resource
            .open(
                call.ctx.clone(),
                OpenEphemeralResourceRequest {
                    type_name: self.type_name.clone(),
                    config: request.config,
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        let mut diagnostics = response.diagnostics;
        let private = encode_private(&response.private, &mut diagnostics);
        OpenResponse {
            result: response.result,
            renew_at: response.renew_at,
            private,
            diagnostics,
            deferred: response.deferred,
        }
    }

    async fn renew(&self, call: &Call, request: RenewRequest) -> RenewResponse {
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(diagnostics) => {
                return RenewResponse {
                    private: request.private,
                    diagnostics,
                    ..Default::default()
                }
            }
        };
        let mut diagnostics = Diagnostics::new();
        let private = decode_private(&request.private, &mut diagnostics);
        let response = resource
            .renew(
                call.ctx.clone(),
                RenewEphemeralResourceRequest {
                    type_name: self.type_name.clone(),
                    private,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        RenewResponse {
            renew_at: response.renew_at,
            private: encode_private(&response.private, &mut diagnostics),
            diagnostics,
        }
    }

    async fn close(&self, call: &Call, request: CloseRequest) -> Diagnostics {
        let resource = match self.instance(call).await {
            Ok(r) => r,
            Err(d) => return d,
        };
        let mut diagnostics = Diagnostics::new();
        let private = decode_private(&request.private, &mut diagnostics);
        let response = resource
            .close(
                call.ctx.clone(),
                CloseEphemeralResourceRequest {
                    type_name: self.type_name.clone(),
                    private,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }
}
