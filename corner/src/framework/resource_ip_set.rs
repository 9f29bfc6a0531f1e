//! Set of IP addresses compared by address rather than spelling

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
};
use plugkit::schema::{AttributeBuilder, SchemaBuilder, ValueAdapter};
use plugkit::semantic::ElementsAdapter;
use plugkit::types::{AttributePath, Diagnostics};
use plugkit::value::{Type, Value};
use std::net::IpAddr;
use std::sync::Arc;

/// IPv4 or IPv6 address in any textual form. `2001:0db8::0001` and
/// `2001:db8::1` are the same address.
pub struct IpAddressAdapter;

impl IpAddressAdapter {
    pub fn create() -> Arc<dyn ValueAdapter> {
        Arc::new(Self)
    }
}

impl ValueAdapter for IpAddressAdapter {
    fn description(&self) -> String {
        "IP address".to_string()
    }

    fn canonicalize(&self, value: &Value) -> Value {
        match value.as_str().and_then(|s| s.parse::<IpAddr>().ok()) {
            Some(addr) => Value::from(addr.to_string()),
            None => value.clone(),
        }
    }

    fn validate(&self, value: &Value, path: &AttributePath) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Some(s) = value.as_str() {
            if let Err(e) = s.parse::<IpAddr>() {
                diagnostics.add_attribute_error(
                    path.clone(),
                    "Invalid IP Address Value",
                    format!("{:?} is not an IP address: {}", s, e),
                );
            }
        }
        diagnostics
    }
}

pub struct IpSetResource;

impl IpSetResource {
    fn adapter() -> Arc<dyn ValueAdapter> {
        ElementsAdapter::create(IpAddressAdapter::create())
    }

    /// The backend normalizes every address it is given.
    fn stored(planned: Value) -> Value {
        let normalized = planned
            .get_attr("addresses")
            .map(|a| Self::adapter().canonicalize(a));
        match normalized {
            Some(a) => planned.with_attr("addresses", a),
            None => planned,
        }
    }
}

#[async_trait]
impl Resource for IpSetResource {
    fn type_name(&self) -> &str {
        "framework_ip_set"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("addresses", Type::set(Type::String))
                        .required()
                        .semantic(Self::adapter())
                        .build(),
                )
                .build(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        CreateResourceResponse {
            new_state: Self::stored(request.planned_state),
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        ReadResourceResponse::unchanged(&request)
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: Self::stored(request.planned_state),
            private: request.planned_private,
            diagnostics: Diagnostics::new(),
            new_identity: None,
        }
    }

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse::default()
    }
}
