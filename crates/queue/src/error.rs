//! Queue Error Types
//!
//! Structured errors using `exn` for automatic location tracking. These
//! cover the queue's own persistence; failures *replaying* an operation
//! are a separate channel ([`ReplayError`](crate::ReplayError)) because
//! they belong to the handler, not the queue.

use derive_more::{Display, Error};

/// A queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("queue database error")]
    Database,
    #[display("queue schema setup error")]
    Schema,
    /// A payload failed to (de)serialize.
    #[display("invalid queue data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
