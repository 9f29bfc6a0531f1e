//! plugkit - provider plugin runtime for Rust
//!
//! Implements both versions (5 and 6) of the provider plugin protocol used by
//! declarative infrastructure engines: a type-preserving value model, schemas,
//! a low-level server, a multiplexer, a protocol 5 adapter and a typed
//! framework on top.

// Core modules
pub mod context;
pub mod error;
pub mod path;
pub mod schema;
pub mod types;
pub mod value;

// Wire protocol and servers
pub mod downgrade;
pub mod grpc;
pub mod lifecycle;
pub mod lowlevel;
pub mod mux;
pub mod proto;
pub mod protocol;
pub mod serve;

// Framework API modules
pub mod action;
pub mod data_source;
pub mod ephemeral;
pub mod framework;
pub mod function;
pub mod provider;
pub mod resource;

// Helper modules
pub mod consistency;
pub mod defaults;
pub mod import;
pub mod plan_modifier;
pub mod semantic;
pub mod timeouts;
pub mod validator;

// Re-exports for convenience
pub use action::{Action, ProgressSink};
pub use context::Context;
pub use data_source::DataSource;
pub use downgrade::DowngradeServer;
pub use ephemeral::EphemeralResource;
pub use error::{PlugkitError, Result};
pub use function::Function;
pub use import::{import_state_passthrough_id, import_state_passthrough_with_identity};
pub use lowlevel::LowLevelServer;
pub use mux::MuxServer;
pub use protocol::DynamicValue;
pub use provider::{Provider, ProviderMetadataRequest, ProviderMetadataResponse};
pub use resource::Resource;
pub use schema::{AttributeBuilder, Schema, SchemaBuilder};
pub use serve::{serve, LogLevel, ServeConfig};
pub use types::{AttributePath, Diagnostic, Diagnostics, PrivateStateData};
pub use value::{Type, Value};

// Convenience macro for main function
#[macro_export]
macro_rules! serve_provider {
    ($provider:expr) => {
        $crate::serve_provider!($provider, $crate::ServeConfig::default());
    };
    ($provider:expr, $config:expr) => {
        #[tokio::main]
        async fn main() -> $crate::Result<()> {
            let server = $crate::framework::server($provider).await?;
            $crate::serve(::std::sync::Arc::new(server), $config).await
        }
    };
}
