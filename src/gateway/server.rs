//! Gateway server

use crate::common::{Error, GatewayConfig, Result};
use crate::coordinator::DirectoryClient;
use crate::gateway::http::{create_router, GatewayState};

pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn state(&self) -> Result<GatewayState> {
        let timeout = self.config.request_timeout()?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GatewayState {
            directory: DirectoryClient::with_client(self.config.coordinator.clone(), http.clone()),
            http,
        })
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting gateway");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Directory: {}", self.config.coordinator);
        tracing::info!("  Request timeout: {}", self.config.request_timeout);

        let max_blob_size = usize::try_from(self.config.max_blob_size).map_err(|_| {
            Error::InvalidConfig(format!("max_blob_size {} too large", self.config.max_blob_size))
        })?;
        let router = create_router(self.state()?, max_blob_size);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(listener, router);

        tracing::info!("✓ Gateway ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down gateway");
            }
        }

        Ok(())
    }
}
