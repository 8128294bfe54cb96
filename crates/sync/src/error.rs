//! Sync Error Types
//!
//! Structured errors using `exn` for automatic location tracking. Most
//! failures inside the orchestrator are policy, not errors — swallowed
//! for the local tier, queued for the remote tier. What's left reaches
//! the caller through these kinds, carrying the originating crate's
//! error tree as a child frame.

use derive_more::{Display, Error as DeriveError};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, DeriveError)]
pub enum ErrorKind {
    /// The remote tier failed and no other tier could satisfy the call.
    #[display("remote store failure")]
    Remote,
    /// The local cache tier failed while being set up.
    #[display("local cache failure")]
    Cache,
    /// The pending-operation queue failed while being set up.
    #[display("operation queue failure")]
    Queue,
}

impl ErrorKind {
    /// Wrap a remote store error, preserving its error tree.
    #[track_caller]
    pub fn remote(err: lectern_remote::error::Error) -> Error {
        err.raise(ErrorKind::Remote)
    }

    /// Wrap a local cache error, preserving its error tree.
    #[track_caller]
    pub fn cache(err: lectern_cache::error::Error) -> Error {
        err.raise(ErrorKind::Cache)
    }

    /// Wrap a queue error, preserving its error tree.
    #[track_caller]
    pub fn queue(err: lectern_queue::error::Error) -> Error {
        err.raise(ErrorKind::Queue)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote)
    }
}
