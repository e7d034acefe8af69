//! Client-facing gateway
//!
//! Stateless: asks the directory where to write or where a volume lives,
//! then forwards the request to that storage server.

pub mod http;
pub mod server;

pub use server::Gateway;
