//! Crate-wide error type for storage and transient failures.
//!
//! Rejected credentials are not errors: they come back as outcome enums
//! (`RotationOutcome`, `AccessRejection`, `PollOutcome`, ...). `AuthError`
//! is reserved for things the caller may retry or must log.

use crate::kv::KvError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Relational store failure. Nothing was half-written: every mutating
    /// path runs as a single statement or inside a transaction.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Expiring key-value store failure on a write that must not be lost.
    #[error("cache error: {0}")]
    Cache(#[from] KvError),

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("system clock is before the unix epoch")]
    Clock,

    /// The presented credential could not be used for the requested action.
    #[error("invalid credential")]
    InvalidCredential,
}

impl AuthError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::Cache(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Current wall-clock time in unix seconds.
pub fn now_secs() -> AuthResult<i64> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| AuthError::Clock)
}
