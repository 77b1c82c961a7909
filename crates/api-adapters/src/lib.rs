//! # api-adapters
//!
//! The HTTP surface of the matching engine.
//!
//! The error mapping, request bodies and metrics registry compile without a
//! web framework; the axum router and handlers sit behind `web-axum`.

pub mod dto;
pub mod error;
pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod router;

pub use error::ApiError;
pub use metrics::ApiMetrics;

#[cfg(feature = "web-axum")]
pub use router::{build_router, AppState};
