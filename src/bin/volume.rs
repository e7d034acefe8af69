//! Storage server binary

use clap::{Parser, Subcommand};
use miniblob::common::{Config, SyncPolicy};
use miniblob::VolumeServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "miniblob-volume")]
#[command(about = "miniblob storage server holding one volume")]
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
    /// Start the storage server
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Bind address for heartbeat connections
        #[arg(long)]
        heartbeat: Option<SocketAddr>,

        /// Address the directory hands out to clients
        #[arg(long)]
        advertise: Option<String>,

        /// Heartbeat address the directory dials
        #[arg(long)]
        advertise_heartbeat: Option<String>,

        /// Directory URL
        #[arg(long)]
        coordinator: Option<String>,

        /// Data directory
        #[arg(long)]
        data: Option<PathBuf>,

        /// Skip fsync after each append
        #[arg(long)]
        no_sync: bool,
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
            heartbeat,
            advertise,
            advertise_heartbeat,
            coordinator,
            data,
            no_sync,
        } => {
            let mut volume_config = config.volume;
            if let Some(bind) = bind {
                volume_config.bind_addr = bind;
            }
            if let Some(heartbeat) = heartbeat {
                volume_config.heartbeat_addr = heartbeat;
            }
            if advertise.is_some() {
                volume_config.advertise_addr = advertise;
            }
            if advertise_heartbeat.is_some() {
                volume_config.advertise_heartbeat_addr = advertise_heartbeat;
            }
            if let Some(coordinator) = coordinator {
                volume_config.coordinator = coordinator;
            }
            if let Some(data) = data {
                volume_config.data_dir = data;
            }
            if no_sync {
                volume_config.sync = SyncPolicy::Never;
            }

            VolumeServer::new(volume_config).serve().await?;
        }
    }

    Ok(())
}
