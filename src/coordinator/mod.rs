//! Directory (coordinator)
//!
//! - Volume id → address records, in memory only
//! - Placement of new writes across eligible volumes
//! - Liveness monitoring of storage servers over the heartbeat protocol
//! - HTTP API and the client used to reach it

pub mod client;
pub mod directory;
pub mod http;
pub mod liveness;
pub mod placement;
pub mod server;

pub use client::DirectoryClient;
pub use directory::{Directory, ServerRecord, ServerState};
pub use server::Coordinator;
