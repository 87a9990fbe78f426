use thiserror::Error;

use crate::store::StoreError;

/// Typed failures surfaced to collaborators. No raw HTTP constructs here;
/// controllers map these to status codes themselves.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Entity or token absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Principal exists but is not entitled (status or claims mismatch).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An invariant-protecting uniqueness constraint was hit.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Request exceeds the principal's resolvable rights.
    #[error("insufficient scope: missing {0:?}")]
    InsufficientScope(Vec<String>),

    /// Malformed, unverifiable, or expired credential. One variant on
    /// purpose: callers must not be able to tell forged from expired.
    #[error("invalid token")]
    InvalidToken,

    /// Missing or unusable signing key. Fatal at startup, never a
    /// per-request condition.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => ServiceError::UniqueViolation(what),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}
