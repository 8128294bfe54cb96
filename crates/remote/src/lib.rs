//! Remote authoritative store boundary (L3).
//!
//! The sync engine never talks to a concrete backend directly; it holds a
//! [`RemoteHandle`] and relies on the [`RemoteStore`] contract. The one
//! piece of real logic that lives on this side of the boundary is the
//! [`chunk`] module: hierarchical writes are split by book and by chapter
//! into [`WriteUnit`]s so that no single write can exceed the peer
//! store's per-document size ceiling — a full translation is never
//! shipped as one unit.
//!
//! The [`MockRemote`] (behind the `mock` feature) is the in-memory
//! implementation other crates use in their tests: it records every
//! applied unit, can be flipped between reachable/unreachable and
//! authenticated/anonymous, and supports one-shot failure injection.

pub mod chunk;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod store;

pub use crate::chunk::{WRITE_UNIT_CEILING, WriteUnit, split_books};
#[cfg(feature = "mock")]
pub use crate::mock::{Failure, MockRemote};
pub use crate::store::{RemoteEvent, RemoteHandle, RemoteStore};
