pub mod backend;
pub mod framework;
pub mod provider_data;
pub mod tf5;
pub mod tf6;
pub mod tf6mux;

pub use backend::Backend;
pub use framework::CornerProvider;
pub use provider_data::CornerProviderData;

use plugkit::protocol::v6;
use std::sync::Arc;

/// Which corner provider to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    Framework,
    Tf6,
    Tf5,
    Tf6mux,
}

impl ProviderKind {
    pub fn protocol_version(&self) -> u8 {
        match self {
            ProviderKind::Tf5 => 5,
            _ => 6,
        }
    }

    /// Registry address the engine knows the provider by.
    pub fn address(&self) -> &'static str {
        match self {
            ProviderKind::Framework => "registry.terraform.io/hashicorp/framework",
            ProviderKind::Tf6 => "registry.terraform.io/hashicorp/tf6",
            ProviderKind::Tf5 => "registry.terraform.io/hashicorp/tf5",
            ProviderKind::Tf6mux => "registry.terraform.io/hashicorp/tf6mux",
        }
    }
}

/// Builds the protocol 6 server for a provider. Protocol 5 providers are
/// downgraded when served.
pub async fn server(
    kind: ProviderKind,
    backend: Arc<Backend>,
) -> plugkit::Result<Arc<dyn v6::ProviderServer>> {
    let server: Arc<dyn v6::ProviderServer> = match kind {
        ProviderKind::Framework => {
            Arc::new(plugkit::framework::server(CornerProvider::new(backend)).await?)
        }
        ProviderKind::Tf6 => Arc::new(tf6::server(backend)),
        ProviderKind::Tf5 => Arc::new(tf5::server(backend)),
        ProviderKind::Tf6mux => Arc::new(tf6mux::server(backend).await?),
    };
    Ok(server)
}
