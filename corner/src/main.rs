use clap::Parser;
use corner::{Backend, ProviderKind};
use plugkit::{LogLevel, ServeConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, Level};

/// Environment variable consulted when `--log-level` is not given.
const LOG_ENV: &str = "CORNER_LOG";

#[derive(Debug, Parser)]
#[command(name = "terraform-provider-corner", about = "Corner-case providers for the plugin protocol")]
struct Args {
    /// Which provider to serve
    #[arg(long, value_enum, default_value = "framework")]
    provider: ProviderKind,

    /// Print reattach configuration and serve until interrupted
    #[arg(long)]
    debug: bool,

    /// trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<LogLevel>,
}

fn log_level(flag: Option<LogLevel>) -> LogLevel {
    flag.or_else(|| std::env::var(LOG_ENV).ok().and_then(|v| v.parse().ok()))
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = log_level(args.log_level);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_str().parse::<Level>().unwrap_or(Level::INFO))
        .init();

    let config = ServeConfig::new()
        .with_address(args.provider.address())
        .with_debug(args.debug)
        .with_log_level(level)
        .with_protocol_version(args.provider.protocol_version());

    let served = match corner::server(args.provider, Arc::new(Backend::new())).await {
        Ok(server) => plugkit::serve(server, config).await,
        Err(e) => Err(e),
    };
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, provider = ?args.provider, "provider failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn flag_wins_over_environment() {
        std::env::set_var(LOG_ENV, "error");
        let level = log_level(Some(LogLevel::Trace));
        std::env::remove_var(LOG_ENV);

        assert_eq!(level, LogLevel::Trace);
    }

    #[test]
    #[serial]
    fn environment_is_used_without_flag() {
        std::env::set_var(LOG_ENV, "warn");
        let level = log_level(None);
        std::env::remove_var(LOG_ENV);

        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    #[serial]
    fn unparseable_environment_falls_back_to_info() {
        std::env::set_var(LOG_ENV, "loud");
        let level = log_level(None);
        std::env::remove_var(LOG_ENV);

        assert_eq!(level, LogLevel::Info);
    }

    #[test]
    fn provider_flag_parses() {
        let args = Args::parse_from(["terraform-provider-corner", "--provider", "tf6mux", "--debug"]);
        assert_eq!(args.provider, ProviderKind::Tf6mux);
        assert!(args.debug);
        assert_eq!(args.log_level, None);
    }
}
