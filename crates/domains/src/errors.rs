//! # DomainError
//!
//! Centralized error handling for the BloodBridge engine.
//! Maps validation, state-dependent and infrastructure failures to
//! actionable error types.

use thiserror::Error;
use uuid::Uuid;

/// Coarse classification used by transports to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Precondition,
    Infrastructure,
}

/// The primary error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Missing or malformed input, rejected before any state is read
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (e.g., request, donor, blood bank)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Caller is not allowed to act on the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("request is not available")]
    RequestNotAvailable,

    #[error("donor is in donation cooldown for another {remaining_days} day(s)")]
    CooldownActive { remaining_days: i64 },

    #[error("donor has already responded to this request")]
    DuplicateResponse,

    #[error("insufficient stock: {available} unit(s) available, {required} required")]
    InsufficientStock { available: u32, required: u32 },

    #[error("request is already fulfilled")]
    AlreadyFulfilled,

    #[error("request is already cancelled")]
    AlreadyCancelled,

    #[error("search radius is already at its maximum")]
    EscalationExhausted,

    /// A donor has accepted; the search must not widen any further
    #[error("a donor has already accepted this request")]
    DonorCommitted,

    #[error("donor is {distance_m:.0} m from the hospital, outside the {radius_m:.0} m geofence")]
    OutsideGeofence { distance_m: f64, radius_m: f64 },

    #[error("donor location is not available")]
    LocationUnavailable,

    /// Concurrent writers kept winning; safe to retry
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// Storage or dispatch backend failure (e.g., DB down); safe to retry
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound(..) => ErrorKind::NotFound,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::Conflict(_) | DomainError::Infrastructure(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Precondition,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::NotFound(..) => "not_found",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::RequestNotAvailable => "request_not_available",
            DomainError::CooldownActive { .. } => "cooldown_active",
            DomainError::DuplicateResponse => "duplicate_response",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::AlreadyFulfilled => "already_fulfilled",
            DomainError::AlreadyCancelled => "already_cancelled",
            DomainError::EscalationExhausted => "escalation_exhausted",
            DomainError::DonorCommitted => "donor_committed",
            DomainError::OutsideGeofence { .. } => "outside_geofence",
            DomainError::LocationUnavailable => "location_unavailable",
            DomainError::Conflict(_) => "conflict",
            DomainError::Infrastructure(_) => "infrastructure",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

/// A specialized Result type for engine logic.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Failures reported by storage ports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The stored request changed since it was read
    #[error("request {0} was modified concurrently")]
    VersionConflict(Uuid),

    #[error("insufficient stock: {available} available, {required} required")]
    InsufficientStock { available: u32, required: u32 },

    #[error("storage backend: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict(id) => {
                DomainError::Conflict(format!("request {id} was modified concurrently"))
            }
            StoreError::InsufficientStock { available, required } => {
                DomainError::InsufficientStock { available, required }
            }
            StoreError::Backend(msg) => DomainError::Infrastructure(msg),
        }
    }
}

/// A notification could not be handed to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification dispatch failed: {0}")]
pub struct DispatchError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        assert_eq!(DomainError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(DomainError::DuplicateResponse.kind(), ErrorKind::Precondition);
        assert_eq!(DomainError::EscalationExhausted.kind(), ErrorKind::Precondition);
        assert!(DomainError::Infrastructure("db".into()).is_retryable());
        assert!(!DomainError::AlreadyCancelled.is_retryable());
    }

    #[test]
    fn store_errors_convert() {
        let id = Uuid::nil();
        assert!(matches!(
            DomainError::from(StoreError::VersionConflict(id)),
            DomainError::Conflict(_)
        ));
        assert_eq!(
            DomainError::from(StoreError::InsufficientStock { available: 1, required: 2 }),
            DomainError::InsufficientStock { available: 1, required: 2 }
        );
    }
}
