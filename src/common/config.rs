//! Configuration for miniblob components
//!
//! Values come from (lowest to highest priority): built-in defaults, an
//! optional TOML file, `MINIBLOB__*` environment variables, and finally the
//! command-line flags of each binary.

use crate::common::{parse_duration, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub volume: VolumeConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            volume: VolumeConfig::default(),
            gateway: GatewayConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("MINIBLOB")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// When to fsync data-log and index-log appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// `sync_data` after every append
    #[default]
    Always,
    /// Leave flushing to the OS
    Never,
}

/// Placement strategy used by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    #[default]
    Random,
    RoundRobin,
}

/// Coordinator (directory) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the directory HTTP API
    #[serde(default = "default_coord_bind")]
    pub bind_addr: SocketAddr,

    /// Interval between heartbeat pings, e.g. "10s"
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: String,

    /// Deadline for a single heartbeat exchange or dial
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: String,

    #[serde(default)]
    pub placement: PlacementKind,
}

fn default_coord_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}
fn default_heartbeat_interval() -> String {
    "10s".to_string()
}
fn default_heartbeat_timeout() -> String {
    "5s".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_coord_bind(),
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_timeout: default_heartbeat_timeout(),
            placement: PlacementKind::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn heartbeat_interval(&self) -> Result<Duration> {
        parse_duration(&self.heartbeat_interval)
    }

    pub fn heartbeat_timeout(&self) -> Result<Duration> {
        parse_duration(&self.heartbeat_timeout)
    }
}

/// Volume server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Bind address for the volume HTTP API
    #[serde(default = "default_volume_bind")]
    pub bind_addr: SocketAddr,

    /// Bind address for heartbeat connections from the directory
    #[serde(default = "default_heartbeat_bind")]
    pub heartbeat_addr: SocketAddr,

    /// Address advertised to the directory (defaults to `bind_addr`)
    #[serde(default)]
    pub advertise_addr: Option<String>,

    /// Address advertised for heartbeats (defaults to `heartbeat_addr`)
    #[serde(default)]
    pub advertise_heartbeat_addr: Option<String>,

    /// Directory base URL
    #[serde(default = "default_coordinator_url")]
    pub coordinator: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub sync: SyncPolicy,

    /// Maximum accepted object size in bytes
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_volume_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
fn default_heartbeat_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}
fn default_coordinator_url() -> String {
    "http://127.0.0.1:9090".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_blob_size() -> u64 {
    64 * 1024 * 1024
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_volume_bind(),
            heartbeat_addr: default_heartbeat_bind(),
            advertise_addr: None,
            advertise_heartbeat_addr: None,
            coordinator: default_coordinator_url(),
            data_dir: default_data_dir(),
            sync: SyncPolicy::default(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

impl VolumeConfig {
    pub fn advertised_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.bind_addr.to_string())
    }

    pub fn advertised_heartbeat_addr(&self) -> String {
        self.advertise_heartbeat_addr
            .clone()
            .unwrap_or_else(|| self.heartbeat_addr.to_string())
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind_addr: SocketAddr,

    /// Directory base URL
    #[serde(default = "default_coordinator_url")]
    pub coordinator: String,

    /// Client-side timeout for directory and volume calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_gateway_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}
fn default_request_timeout() -> String {
    "10s".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_gateway_bind(),
            coordinator: default_coordinator_url(),
            request_timeout: default_request_timeout(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout)
    }
}
