//! Low-level protocol 6 corner provider
//!
//! Handlers here talk to the low-level server directly: they plan, apply
//! and handle deletes themselves, with no framework in between.

pub mod dynamic_computed;
pub mod echo;
pub mod function;
pub mod moved;
pub mod token;
pub mod user;

use crate::backend::Backend;
use crate::provider_data::CornerProviderData;
use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::lowlevel::{
    ApplyRequest, ApplyResponse, Call, ConfigureRequest, ConfigureResponse, LowLevelServer,
    ProviderHandler, ResourceHandler,
};
use plugkit::schema::{AttributeBuilder, NestedBlock, NestingMode, Schema, SchemaBuilder};
use plugkit::types::Diagnostics;
use plugkit::value::Type;
use std::sync::Arc;
use tracing::info;

/// Provider handler shared by every low-level corner server.
pub struct CornerProviderHandler {
    backend: Arc<Backend>,
}

impl CornerProviderHandler {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ProviderHandler for CornerProviderHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("tenant", Type::String)
                    .description("Free-form tenant label")
                    .optional()
                    .build(),
            )
            .build()
    }

    async fn configure(&self, _ctx: &Context, request: ConfigureRequest) -> ConfigureResponse {
        info!(
            terraform_version = %request.terraform_version,
            known = request.config.is_wholly_known(),
            "configured low-level provider"
        );
        ConfigureResponse {
            provider_data: Some(Arc::new(CornerProviderData::new(self.backend.clone()))),
            ..Default::default()
        }
    }
}

/// The `tf6` provider.
pub fn server(backend: Arc<Backend>) -> LowLevelServer {
    LowLevelServer::new(Arc::new(CornerProviderHandler::new(backend)))
        .resource("tf6_echo", Arc::new(echo::EchoHandler))
        .resource(
            "tf6_dynamic_computed",
            Arc::new(dynamic_computed::DynamicComputedHandler),
        )
        .resource("tf6_user", Arc::new(user::UserHandler::new("tf6_user")))
        .resource(
            "tf6_moved_random_string",
            Arc::new(moved::MovedRandomStringHandler),
        )
        .data_source("tf6_user", Arc::new(user::UserDataHandler))
        .ephemeral_resource("tf6_token", Arc::new(token::TokenHandler))
        .function("dynamic", Arc::new(function::DynamicFunction))
}

/// Resource with a list-nested block holding a dynamic attribute.
pub struct NestedPseudoHandler;

#[async_trait]
impl ResourceHandler for NestedPseudoHandler {
    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .block(NestedBlock::new(
                "foo",
                NestingMode::List,
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("bar", Type::Dynamic).optional().build())
                    .build_block(),
            ))
            .build()
    }

    async fn apply(&self, _call: &Call, request: ApplyRequest) -> ApplyResponse {
        ApplyResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            new_identity: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// A `tf6` server whose schema no engine accepts: list-nested blocks may
/// not contain dynamic attributes.
pub fn nested_pseudo_server(backend: Arc<Backend>) -> LowLevelServer {
    server(backend).resource("tf6_nested_pseudo", Arc::new(NestedPseudoHandler))
}
