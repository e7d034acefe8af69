//! # miniblob
//!
//! A small distributed object store in the Haystack style:
//! - Storage servers keep objects as needles in one append-only data-log
//!   per volume, located through an in-memory index rebuilt from an
//!   index-log at startup
//! - A directory maps volume ids to storage servers, places new writes and
//!   heartbeats every registered server
//! - A stateless gateway exposes `write` / `read` over HTTP
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐
//!  client ──▶│   Gateway    │──── assign / lookup ────┐
//!            └──────┬───────┘                         │
//!                   │ HTTP                     ┌──────▼───────┐
//!     ┌─────────────┼─────────────┐            │  Directory   │
//!     │             │             │            │ (+ liveness) │
//! ┌───▼──────┐ ┌────▼─────┐ ┌─────▼────┐       └──────┬───────┘
//! │ Volume A │ │ Volume B │ │ Volume C │◀── heartbeat ┘
//! │ .dat+.idx│ │ .dat+.idx│ │ .dat+.idx│
//! └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the directory
//! ```bash
//! miniblob-coord serve --bind 0.0.0.0:9090
//! ```
//!
//! ### Start a storage server
//! ```bash
//! miniblob-volume serve \
//!   --bind 127.0.0.1:8080 \
//!   --heartbeat 127.0.0.1:8081 \
//!   --data ./vol-data \
//!   --coordinator http://localhost:9090
//! ```
//!
//! ### Start the gateway and use the CLI
//! ```bash
//! miniblob-gateway serve --bind 0.0.0.0:8000 --coordinator http://localhost:9090
//!
//! miniblob put ./photo.jpg
//! miniblob get <volume-id>:<object-id> --output ./out.jpg
//!
//! # Offline maintenance
//! miniblob verify --data ./vol-data
//! miniblob rebuild-index --data ./vol-data
//! ```

#![allow(clippy::result_large_err)]

pub mod common;
pub mod coordinator;
pub mod gateway;
pub mod ops;
pub mod volume;

// Re-export commonly used types
pub use common::{Config, Error, FatId, ObjectId, Result, VolumeId};
pub use coordinator::{Coordinator, Directory, DirectoryClient};
pub use gateway::Gateway;
pub use volume::{Store, VolumeServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
