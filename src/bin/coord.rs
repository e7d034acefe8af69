//! Directory binary

use clap::{Parser, Subcommand};
use miniblob::common::{Config, PlacementKind};
use miniblob::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "miniblob-coord")]
#[command(about = "miniblob directory: volume registry, placement and liveness")]
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
    /// Start the directory server
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Interval between heartbeats, e.g. "10s"
        #[arg(long)]
        heartbeat_interval: Option<String>,

        /// Deadline for one heartbeat exchange, e.g. "5s"
        #[arg(long)]
        heartbeat_timeout: Option<String>,

        /// Placement strategy
        #[arg(long, value_enum)]
        placement: Option<Placement>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Placement {
    Random,
    RoundRobin,
}

impl From<Placement> for PlacementKind {
    fn from(p: Placement) -> Self {
        match p {
            Placement::Random => PlacementKind::Random,
            Placement::RoundRobin => PlacementKind::RoundRobin,
        }
    }
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
            heartbeat_interval,
            heartbeat_timeout,
            placement,
        } => {
            // CLI flags take priority over file and environment
            let mut coord_config = config.coordinator;
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if let Some(interval) = heartbeat_interval {
                coord_config.heartbeat_interval = interval;
            }
            if let Some(timeout) = heartbeat_timeout {
                coord_config.heartbeat_timeout = timeout;
            }
            if let Some(placement) = placement {
                coord_config.placement = placement.into();
            }

            Coordinator::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
