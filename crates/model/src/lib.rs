//! Core data model for the lectern cache tiers.
//!
//! A [`Translation`] is a complete scripture edition: a flat list of
//! [`Book`]s, each holding [`Chapter`]s, each holding [`Verse`]s. The
//! hierarchy is keyed structurally — book names are unique within a
//! translation, chapter numbers within a book, verse numbers within a
//! chapter — and every tier (memory, local database, remote store) passes
//! these types around unchanged.
//!
//! The [`merge`] module implements the reconciliation algorithm that keeps
//! partial updates from different sources from clobbering each other.

pub mod merge;
mod projector;
mod translation;

pub use crate::projector::ProjectorRef;
pub use crate::translation::{Book, Chapter, Translation, Verse};
