//! Directory server

use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::directory::Directory;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::liveness::{HeartbeatSettings, LivenessMonitor};
use crate::coordinator::placement::policy_for;
use std::sync::Arc;

pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Build the shared state without binding any socket
    pub fn state(&self) -> Result<CoordState> {
        let settings = HeartbeatSettings {
            interval: self.config.heartbeat_interval()?,
            io_timeout: self.config.heartbeat_timeout()?,
        };
        let directory = Arc::new(Directory::new(policy_for(self.config.placement)));
        let liveness = Arc::new(LivenessMonitor::new(directory.clone(), settings));
        Ok(CoordState {
            directory,
            liveness,
        })
    }

    pub async fn serve(self) -> Result<()> {
        let state = self.state()?;

        tracing::info!("Starting directory");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!(
            "  Heartbeat: every {}, timeout {}",
            self.config.heartbeat_interval,
            self.config.heartbeat_timeout
        );
        tracing::info!("  Placement: {}", state.directory.placement_name());

        let liveness = state.liveness.clone();
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(listener, router);

        tracing::info!("✓ Directory ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down directory");
            }
        }

        liveness.shutdown();
        Ok(())
    }
}
