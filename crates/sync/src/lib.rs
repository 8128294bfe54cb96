//! Tiered cache orchestration for lectern.
//!
//! Callers talk only to the [`CacheManager`]. Reads consult the in-memory
//! map (L1), then the durable local database (L2), then the remote
//! authoritative store (L3). Writes update L1 synchronously, write
//! through to L2 on a best-effort basis, and either reach L3 directly or
//! park a [`PendingOperation`](lectern_queue::PendingOperation) in the
//! durable queue for replay when connectivity and authentication return.
//!
//! The failure policy is deliberate and asymmetric:
//!
//! - local-tier and queue-persistence failures are logged, never
//!   propagated — the local tiers are advisory;
//! - transient remote failures are queued for retry;
//! - permission failures are logged and surfaced as
//!   [`WriteOutcome::Denied`], never queued — retrying without a
//!   credential change cannot succeed;
//! - a remote failure on a direct read propagates only when no tier could
//!   satisfy the read at all.

pub mod error;
mod locks;
mod manager;
mod replay;

pub use crate::manager::{CacheManager, Merged, WriteOutcome};
pub use crate::replay::ProjectorPayload;
pub use lectern_queue::{DrainReport, PendingOperation};
