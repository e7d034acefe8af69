//! Gateway binary

use clap::{Parser, Subcommand};
use miniblob::common::Config;
use miniblob::Gateway;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "miniblob-gateway")]
#[command(about = "miniblob client-facing gateway")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Directory URL
        #[arg(long)]
        coordinator: Option<String>,

        /// Timeout for directory and volume calls, e.g. "10s"
        #[arg(long)]
        timeout: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            coordinator,
            timeout,
        } => {
            let mut gateway_config = config.gateway;
            if let Some(bind) = bind {
                gateway_config.bind_addr = bind;
            }
            if let Some(coordinator) = coordinator {
                gateway_config.coordinator = coordinator;
            }
            if let Some(timeout) = timeout {
                gateway_config.request_timeout = timeout;
            }

            Gateway::new(gateway_config).serve().await?;
        }
    }

    Ok(())
}
