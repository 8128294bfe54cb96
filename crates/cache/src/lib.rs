//! Durable local cache tier (L2) for lectern.
//!
//! This crate holds the SQLite database that survives process restarts:
//! full translation snapshots (books serialized as a JSON column) and the
//! last known projection-channel references. The database is advisory,
//! not authoritative — the remote store owns the truth, and losing this
//! file only costs a re-download. The orchestrator therefore treats every
//! error from this crate as a logged warning, never a hard failure; the
//! error channel stays a real `Result` here so callers *can* observe what
//! went wrong.
//!
//! All writes are idempotent upserts keyed by id, so replaying the same
//! save is harmless.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::Repository;
