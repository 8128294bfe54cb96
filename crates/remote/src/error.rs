//! Remote Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking. The
//! classification here drives the whole failure-handling design: the
//! orchestrator queues retryable failures, logs permission failures, and
//! treats everything else as a bug in the backend implementation.

use derive_more::{Display, Error};

/// A remote store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Network or availability failure; the write may succeed later.
    #[display("remote store unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// The caller's credentials don't permit the operation. Retrying
    /// without re-authentication cannot succeed.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Backend-specific error that isn't a clean availability signal.
    #[display("remote backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// Referenced entity does not exist remotely.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// A model value couldn't be serialized for the wire.
    #[display("invalid remote data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }

    /// Returns `true` for authorization failures, which are never queued
    /// for retry — a credential change is required for success.
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
