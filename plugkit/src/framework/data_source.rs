use super::{check_type_name, schema_result, validate_config};
use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSource, DataSourceSchemaRequest, ReadDataSourceRequest,
    ValidateDataSourceConfigRequest,
};
use crate::error::Result;
use crate::lowlevel::{Call, DataSourceHandler, ReadDataRequest, ReadDataResponse};
use crate::provider::DataSourceFactory;
use crate::schema::Schema;
use crate::types::Diagnostics;
use crate::value::Value;
use async_trait::async_trait;
use tracing::debug;

pub(super) struct DataSourceAdapter {
    type_name: String,
    factory: DataSourceFactory,
    schema: Schema,
}

impl DataSourceAdapter {
    pub(super) async fn new(
        ctx: &Context,
        type_name: &str,
        factory: DataSourceFactory,
    ) -> Result<Self> {
        let probe = factory();
        check_type_name(type_name, probe.type_name())?;
        let response = probe.schema(ctx.clone(), DataSourceSchemaRequest).await;
        Ok(Self {
            type_name: type_name.to_string(),
            schema: schema_result(type_name, response.schema, response.diagnostics)?,
            factory,
        })
    }

    async fn instance(&self, call: &Call) -> std::result::Result<Box<dyn DataSource>, Diagnostics> {
        let mut data_source = (self.factory)();
        let response = data_source
            .configure(
                call.ctx.clone(),
                ConfigureDataSourceRequest {
                    provider_data: call.provider_data.clone(),
                },
            )
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }
}

#[async_trait]
impl DataSourceHandler for DataSourceAdapter {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    async fn validate(&self, call: &Call, config: &Value) -> Diagnostics {
        let data_source = match self.instance(call).await {
            Ok(d) => d,
            Err(d) => return d,
        };
        let mut diagnostics =
            validate_config(&self.schema, config, &data_source.config_validators());
        let response = data_source
            .validate(
                call.ctx.clone(),
                ValidateDataSourceConfigRequest {
                    type_name: self.type_name.clone(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    async fn read(&self, call: &Call, request: ReadDataRequest) -> ReadDataResponse {
        debug!(type_name = %self.type_name, "reading data source");
        let data_source = match self.instance(call).await {
            Ok(d) => d,
            Err(diagnostics) => {
                return ReadDataResponse {
                    state: Value::null(self.schema.ty()),
                    diagnostics,
                    deferred: None,
                }
            }
        };
        let response = data_source
            .read(
                call.ctx.clone(),
                ReadDataSourceRequest {
                    type_name: self.type_name.clone(),
                    config: request.config,
                    provider_meta: request.provider_meta,
                    client_capabilities: call.client_capabilities,
                },
            )
            .await;
        ReadDataResponse {
            state: response.state,
            diagnostics: response.diagnostics,
            deferred: response.deferred,
        }
    }
}
