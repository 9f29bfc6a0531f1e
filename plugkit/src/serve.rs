//! Serving a provider over gRPC
//!
//! The server binds a loopback TCP listener, announces itself on stdout with
//! the plugin handshake line and then serves the generated gRPC service for
//! the negotiated protocol version until interrupted.

use crate::context::Context;
use crate::downgrade::DowngradeServer;
use crate::error::{PlugkitError, Result};
use crate::grpc::{GrpcProviderServer, GrpcProviderServerV5};
use crate::protocol::{v5, v6, GetProviderSchemaRequest};
use crate::types::Diagnostics;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::{info, warn};

/// Environment variable listing the protocol versions the client speaks.
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Log level for the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing-subscriber` filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = PlugkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(PlugkitError::Custom(format!("unknown log level {:?}", other))),
        }
    }
}

/// Server configuration for serving a provider
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Registry address the provider is known by, used in reattach output
    pub address: String,
    /// Print reattach configuration instead of the handshake line
    pub debug: bool,
    pub log_level: LogLevel,
    /// Protocol version to speak, 5 or 6
    pub protocol_version: u8,
    /// Maximum gRPC message size in bytes, in both directions
    pub max_message_size: usize,
    /// Time given to in-flight requests after an interrupt
    pub shutdown_grace: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            address: "registry.terraform.io/hashicorp/corner".to_string(),
            debug: false,
            log_level: LogLevel::Info,
            protocol_version: v6::PROTOCOL_VERSION,
            max_message_size: 256 << 20, // 256MB
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ServeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Checks the server's protocol version against the versions the client
/// offered. No offer means the client accepts whatever the server speaks.
pub fn negotiate(server: u8, offered: Option<&str>) -> Result<u8> {
    let Some(offered) = offered else {
        return Ok(server);
    };
    let versions: Vec<u8> = offered
        .split(',')
        .filter_map(|v| v.trim().parse().ok())
        .collect();
    if versions.contains(&server) {
        Ok(server)
    } else {
        Err(PlugkitError::ProtocolMismatch {
            server,
            client: versions.into_iter().max().unwrap_or(0),
        })
    }
}

fn schema_errors(diagnostics: &Diagnostics) -> Result<()> {
    if !diagnostics.has_errors() {
        return Ok(());
    }
    let messages: Vec<String> = diagnostics.errors().map(|d| d.to_string()).collect();
    Err(PlugkitError::SchemaInvalid(messages.join("; ")))
}

/// Builds the gRPC router for `version`.
///
/// Version 5 wraps the server in [`DowngradeServer`]. Fails when the served
/// schema carries error diagnostics, before anything is announced.
pub async fn router(
    server: Arc<dyn v6::ProviderServer>,
    version: u8,
    max_message_size: usize,
) -> Result<Router> {
    match version {
        v6::PROTOCOL_VERSION => {
            let schema = server
                .get_provider_schema(Context::new(), GetProviderSchemaRequest {})
                .await?;
            schema_errors(&schema.diagnostics)?;
            Ok(Server::builder()
                .add_service(GrpcProviderServer::new(server).into_service(max_message_size)))
        }
        v5::PROTOCOL_VERSION => {
            let server: Arc<dyn v5::ProviderServer> = Arc::new(DowngradeServer::new(server));
            let schema = server
                .get_schema(Context::new(), GetProviderSchemaRequest {})
                .await?;
            schema_errors(&schema.diagnostics)?;
            Ok(Server::builder()
                .add_service(GrpcProviderServerV5::new(server).into_service(max_message_size)))
        }
        other => Err(PlugkitError::ProtocolMismatch {
            server: other,
            client: v6::PROTOCOL_VERSION,
        }),
    }
}

fn handshake(protocol: u8, addr: &str) -> String {
    format!("1|{}|tcp|{}|grpc", protocol, addr)
}

fn reattach_config(config: &ServeConfig, protocol: u8, addr: &str) -> serde_json::Value {
    let mut providers = serde_json::Map::new();
    providers.insert(
        config.address.clone(),
        serde_json::json!({
            "Protocol": "grpc",
            "ProtocolVersion": protocol,
            "Pid": std::process::id(),
            "Test": true,
            "Addr": { "Network": "tcp", "String": addr },
        }),
    );
    serde_json::Value::Object(providers)
}

fn joined(result: std::result::Result<std::result::Result<(), tonic::transport::Error>, JoinError>) -> Result<()> {
    result.map_err(|e| PlugkitError::Transport(e.to_string()))??;
    Ok(())
}

/// Serves `server` until interrupted.
///
/// Startup fails when the client does not speak the configured version or
/// the served schema is invalid. After an interrupt, in-flight calls get
/// `shutdown_grace` to finish.
pub async fn serve(server: Arc<dyn v6::ProviderServer>, config: ServeConfig) -> Result<()> {
    let offered = std::env::var(PROTOCOL_VERSIONS_ENV).ok();
    let version = negotiate(config.protocol_version, offered.as_deref())?;
    let router = router(server, version, config.max_message_size).await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    if config.debug {
        println!("Provider started. To attach, export:");
        println!(
            "\tTF_REATTACH_PROVIDERS='{}'",
            reattach_config(&config, version, &addr)
        );
    } else {
        println!("{}", handshake(version, &addr));
    }
    info!(address = %addr, protocol = version, "provider serving");

    let (stop, stopped) = oneshot::channel::<()>();
    let mut serving = tokio::spawn(router.serve_with_incoming_shutdown(
        TcpListenerStream::new(listener),
        async move {
            let _ = stopped.await;
        },
    ));

    tokio::select! {
        result = &mut serving => return joined(result),
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }
    let _ = stop.send(());
    match tokio::time::timeout(config.shutdown_grace, &mut serving).await {
        Ok(result) => joined(result),
        Err(_) => {
            warn!(grace = ?config.shutdown_grace, "in-flight calls outlived the shutdown grace period");
            serving.abort();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ProgressSink;
    use crate::lowlevel::{ActionHandler, Call, LowLevelServer, ProviderHandler};
    use crate::proto::{tfplugin5, tfplugin6};
    use crate::protocol::DynamicValue;
    use crate::schema::{AttributeBuilder, Schema, SchemaBuilder};
    use crate::value::{Type, Value};
    use async_trait::async_trait;
    use tonic::Code;

    struct Provider;

    #[async_trait]
    impl ProviderHandler for Provider {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(AttributeBuilder::new("region", Type::String).optional().build())
                .build()
        }
    }

    struct Notify;

    #[async_trait]
    impl ActionHandler for Notify {
        fn schema(&self) -> Schema {
            SchemaBuilder::new()
                .attribute(AttributeBuilder::new("steps", Type::Number).required().build())
                .build()
        }

        async fn invoke(&self, _call: &Call, _config: Value, progress: ProgressSink) -> Diagnostics {
            progress.send("one").await;
            progress.send("two").await;
            Diagnostics::new()
        }
    }

    fn server() -> Arc<dyn v6::ProviderServer> {
        Arc::new(LowLevelServer::new(Arc::new(Provider)).action("notify", Arc::new(Notify)))
    }

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));
        format!("http://{}", addr)
    }

    fn notify_config(steps: i64) -> tfplugin6::DynamicValue {
        let ty = Notify.schema().ty();
        DynamicValue::encode(&Value::object([("steps", Value::from(steps))]), &ty)
            .unwrap()
            .into()
    }

    #[test]
    fn log_levels_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::default().to_string(), "info");
    }

    #[test]
    fn negotiation_requires_a_shared_version() {
        assert_eq!(negotiate(6, None).unwrap(), 6);
        assert_eq!(negotiate(5, Some("5,6")).unwrap(), 5);
        match negotiate(6, Some("4, 5")) {
            Err(PlugkitError::ProtocolMismatch { server, client }) => {
                assert_eq!((server, client), (6, 5));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn handshake_and_reattach_advertise_grpc() {
        assert_eq!(handshake(6, "127.0.0.1:4000"), "1|6|tcp|127.0.0.1:4000|grpc");

        let config = ServeConfig::new().with_address("registry.example.com/acme/corner");
        let reattach = reattach_config(&config, 5, "127.0.0.1:4000");
        let entry = &reattach["registry.example.com/acme/corner"];
        assert_eq!(entry["Protocol"], "grpc");
        assert_eq!(entry["ProtocolVersion"], 5);
        assert_eq!(entry["Addr"]["String"], "127.0.0.1:4000");
    }

    #[tokio::test]
    async fn answers_calls_and_streams_action_events() {
        let url = spawn(router(server(), 6, 1 << 20).await.unwrap()).await;
        let mut client = tfplugin6::provider_client::ProviderClient::connect(url)
            .await
            .unwrap();

        let schema = client
            .get_provider_schema(tfplugin6::get_provider_schema::Request {})
            .await
            .unwrap()
            .into_inner();
        assert!(schema.action_schemas.contains_key("notify"));
        assert!(schema.diagnostics.is_empty());

        let request = tfplugin6::invoke_action::Request {
            action_type: "notify".to_string(),
            config: Some(notify_config(2)),
            client_capabilities: None,
        };
        let mut stream = client.invoke_action(request).await.unwrap().into_inner();
        let mut events = Vec::new();
        while let Some(event) = stream.message().await.unwrap() {
            events.push(event.r#type.unwrap());
        }
        use tfplugin6::invoke_action::event::{Completed, Progress, Type as Kind};
        assert_eq!(
            events,
            vec![
                Kind::Progress(Progress { message: "one".to_string() }),
                Kind::Progress(Progress { message: "two".to_string() }),
                Kind::Completed(Completed { diagnostics: Vec::new() }),
            ]
        );

        let unknown = tfplugin6::invoke_action::Request {
            action_type: "page".to_string(),
            config: Some(notify_config(1)),
            client_capabilities: None,
        };
        let status = client.invoke_action(unknown).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn protocol_five_serves_the_downgraded_surface() {
        let url = spawn(router(server(), 5, 1 << 20).await.unwrap()).await;
        let mut client = tfplugin5::provider_client::ProviderClient::connect(url)
            .await
            .unwrap();

        let schema = client
            .get_schema(tfplugin5::get_provider_schema::Request {})
            .await
            .unwrap()
            .into_inner();
        let provider = schema.provider.unwrap().block.unwrap();
        assert_eq!(provider.attributes[0].name, "region");

        let stop = client.stop(tfplugin5::stop::Request {}).await.unwrap().into_inner();
        assert!(stop.error.is_empty());
    }

    #[tokio::test]
    async fn oversized_messages_are_rejected() {
        let url = spawn(router(server(), 6, 1024).await.unwrap()).await;
        let mut client = tfplugin6::provider_client::ProviderClient::connect(url)
            .await
            .unwrap();

        let request = tfplugin6::call_function::Request {
            name: "anything".to_string(),
            arguments: vec![tfplugin6::DynamicValue {
                msgpack: vec![0xc0; 4096],
                json: Vec::new(),
            }],
        };
        assert!(client.call_function(request).await.is_err());
    }

    #[tokio::test]
    async fn invalid_schema_fails_before_serving() {
        struct Broken;

        #[async_trait]
        impl ProviderHandler for Broken {
            fn schema(&self) -> Schema {
                SchemaBuilder::new()
                    .attribute(AttributeBuilder::new("x", Type::String).build())
                    .build()
            }
        }

        let server = Arc::new(LowLevelServer::new(Arc::new(Broken)));
        for version in [6, 5] {
            assert!(matches!(
                router(server.clone(), version, 1 << 20).await,
                Err(PlugkitError::SchemaInvalid(_))
            ));
        }
    }
}
