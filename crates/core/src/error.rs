//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is an expected, typed outcome of a rejected mutation; a
/// rejection leaves ledger state untouched. There is no fatal class here;
/// infrastructure failures belong to the collaborator crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (empty name, negative estimate, zero pack size, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An adjustment that would drive a container or loose-unit count
    /// below zero. Rejected rather than clamped, so callers can tell a
    /// no-op from an out-of-range request.
    #[error("invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// A loose-unit amount that is not a multiple of half a tablet.
    #[error("invalid unit granularity: {0}")]
    InvalidGranularity(String),

    /// A medication id that the ledger does not know.
    #[error("unknown medication: {0}")]
    UnknownMedication(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn adjustment(msg: impl Into<String>) -> Self {
        Self::InvalidAdjustment(msg.into())
    }

    pub fn granularity(msg: impl Into<String>) -> Self {
        Self::InvalidGranularity(msg.into())
    }

    pub fn unknown_medication(msg: impl Into<String>) -> Self {
        Self::UnknownMedication(msg.into())
    }
}
