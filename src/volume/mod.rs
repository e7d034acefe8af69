//! Storage server
//!
//! Holds one volume on local disk:
//! - Needle codec and data-log / index-log store
//! - Stable volume identity
//! - HTTP API for reads and writes
//! - Heartbeat responder for the directory

pub mod heartbeat;
pub mod http;
pub mod identity;
pub mod index;
pub mod needle;
pub mod scan;
pub mod server;
pub mod store;

pub use server::VolumeServer;
pub use store::Store;
