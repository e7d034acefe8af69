//! Volume server

use crate::common::{retry_with_backoff, Error, Result, VolumeConfig};
use crate::coordinator::DirectoryClient;
use crate::volume::heartbeat::serve_heartbeats;
use crate::volume::http::{create_router, VolumeState};
use crate::volume::identity;
use crate::volume::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const REGISTER_ATTEMPTS: usize = 8;
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct VolumeServer {
    config: VolumeConfig,
}

impl VolumeServer {
    pub fn new(config: VolumeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let volume_id = identity::load_or_create(&self.config.data_dir)?;
        let address = self.config.advertised_addr();
        let heartbeat_addr = self.config.advertised_heartbeat_addr();

        tracing::info!("Starting volume server: {}", volume_id);
        tracing::info!("  HTTP API: {} (advertised as {})", self.config.bind_addr, address);
        tracing::info!(
            "  Heartbeats: {} (advertised as {})",
            self.config.heartbeat_addr,
            heartbeat_addr
        );
        tracing::info!("  Data path: {}", self.config.data_dir.display());
        tracing::info!("  Directory: {}", self.config.coordinator);

        let data_dir = self.config.data_dir.clone();
        let sync = self.config.sync;
        let store = tokio::task::spawn_blocking(move || Store::open(&data_dir, volume_id, sync))
            .await??;

        let max_blob_size = usize::try_from(self.config.max_blob_size).map_err(|_| {
            Error::InvalidConfig(format!("max_blob_size {} too large", self.config.max_blob_size))
        })?;
        let router = create_router(
            VolumeState {
                store: Arc::new(store),
            },
            max_blob_size,
        );

        // Both listeners must be up before registering: the directory dials
        // the heartbeat address during registration.
        let heartbeat_listener = TcpListener::bind(self.config.heartbeat_addr).await?;
        let http_listener = TcpListener::bind(self.config.bind_addr).await?;
        let heartbeats = tokio::spawn(serve_heartbeats(heartbeat_listener));
        let http_server = axum::serve(http_listener, router);

        let directory = DirectoryClient::new(self.config.coordinator.clone(), DIRECTORY_TIMEOUT)?;
        retry_with_backoff(
            || directory.register_volume(volume_id, &address, Some(heartbeat_addr.as_str())),
            REGISTER_ATTEMPTS,
            Duration::from_millis(500),
        )
        .await?;

        tracing::info!("✓ Volume server ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            res = heartbeats => {
                match res {
                    Ok(Err(e)) => tracing::error!("Heartbeat listener error: {}", e),
                    Err(e) => tracing::error!("Heartbeat listener panicked: {}", e),
                    Ok(Ok(())) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down volume server {}", volume_id);
            }
        }

        Ok(())
    }
}
