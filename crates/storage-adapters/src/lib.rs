//! # storage-adapters
//!
//! Outbound adapters for the engine's ports.
//!
//! - [`memory::MemoryStore`]: always compiled; used by tests and single-node runs.
//! - [`postgres::PgStore`]: behind the `db-postgres` feature.
//! - [`notify::LogNotifier`]: dispatcher that writes alerts to the log.

pub mod memory;
pub mod notify;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;
pub use notify::LogNotifier;

#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
