//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking. The
//! cache tier is advisory — the orchestrator downgrades these to warnings
//! — but the kinds stay distinct so logs say what actually broke.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A row held data that no longer maps onto the model (e.g. a books
    /// column written by a newer schema).
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Local storage failures are never retried by the sync engine; the
    /// tier is repopulated from the remote store instead.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
