//! Error types for the alert engine.
//!
//! Malformed alert definitions are rejected back to the management surface;
//! they are never silently accepted or coerced.

use thiserror::Error;
use uuid::Uuid;
use volspike_core::AlertKind;

/// Errors raised while managing or evaluating user alerts.
#[derive(Debug, Error)]
pub enum AlertError {
    /// No alert with the given id exists.
    #[error("alert not found: {0}")]
    NotFound(Uuid),

    /// The threshold value could not be parsed or is out of range.
    #[error("invalid threshold {value:?}: {reason}")]
    InvalidThreshold {
        /// Raw threshold as submitted.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The threshold unit does not apply to the alert kind (for example a
    /// percent threshold on a price cross).
    #[error("unit mismatch: {unit} threshold is not valid for {kind:?}")]
    UnitMismatch {
        /// Submitted unit.
        unit: String,
        /// Alert kind the unit was submitted for.
        kind: AlertKind,
    },

    /// Durable store failure.
    #[error("alert store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Persisted alert document could not be decoded.
    #[error("corrupt alert record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl AlertError {
    /// Creates an invalid-threshold error.
    pub fn invalid_threshold(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True when the error is caused by a bad request rather than an
    /// internal fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidThreshold { .. } | Self::UnitMismatch { .. }
        )
    }
}

/// Result type alias for alert engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
