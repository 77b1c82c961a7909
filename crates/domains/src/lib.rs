//! bloodbridge/crates/domains/src/lib.rs
//!
//! The central domain model and port definitions for BloodBridge.
//! Nothing in here performs I/O.

pub mod compatibility;
pub mod errors;
pub mod geo;
pub mod models;
pub mod ports;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
