//! Offline maintenance of a volume's on-disk files

pub mod rebuild;
pub mod verify;

pub use rebuild::{rebuild_index, RebuildReport};
pub use verify::{verify_volume, VerifyReport};
