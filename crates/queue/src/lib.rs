//! Durable FIFO of operations that must eventually reach the remote store.
//!
//! When a remote write can't be attempted (offline, unauthenticated) or
//! fails transiently, the orchestrator parks it here. Entries are persisted
//! to the same SQLite file as the local cache before `enqueue` returns, so
//! a crash between "user saved" and "remote acknowledged" loses nothing.
//!
//! Each entry carries a retry counter bounded by the queue's configured
//! maximum. Entries at or above the cap stop appearing in
//! [`pending`](OperationQueue::pending) passes and become *dead letters*:
//! they are never silently purged, and
//! [`dead_letters`](OperationQueue::dead_letters) /
//! [`clear_dead_letters`](OperationQueue::clear_dead_letters) exist so an
//! operator can inspect and dispose of them deliberately.

pub mod error;
mod model;
mod queue;

pub use crate::model::{OperationKind, PendingOperation};
pub use crate::queue::{DrainReport, OperationQueue, ReplayError, ReplayHandler};

/// Default retry bound before an entry is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
