//! Common utilities and types shared across miniblob

pub mod config;
pub mod error;
pub mod id;
pub mod protocol;
pub mod tracing_middleware;
pub mod utils;

pub use config::{
    Config, CoordinatorConfig, GatewayConfig, PlacementKind, SyncPolicy, VolumeConfig,
};
pub use error::{Error, Result};
pub use id::{FatId, Id, ObjectId, VolumeId, ID_SIZE};
pub use utils::{crc32, format_bytes, parse_duration, retry_with_backoff};
