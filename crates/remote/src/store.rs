//! The remote store contract the sync engine depends on.

use crate::WRITE_UNIT_CEILING;
use crate::chunk::{WriteUnit, split_books};
use crate::error::Result;
use async_trait::async_trait;
use lectern_model::{Book, ProjectorRef, Translation};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared handle to whichever backend implements the contract.
pub type RemoteHandle = Arc<dyn RemoteStore>;

/// A change pushed by the remote store.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A translation was created or changed remotely; carries the full
    /// snapshot so subscribers can repopulate their tiers directly.
    TranslationUpserted(Translation),
}

/// Unified interface to the remote authoritative store.
///
/// All operations are asynchronous and the handle is shared freely
/// (`Arc<dyn RemoteStore>`). Implementations own their transport,
/// timeouts, and credential refresh; this crate only fixes the contract
/// the sync engine needs:
///
/// - reads return `Ok(None)` for absence — "not found" is an answer, not
///   an error;
/// - hierarchical writes go through [`save_books`](Self::save_books),
///   which never ships a full translation as one document;
/// - [`is_authenticated`](Self::is_authenticated) is a cheap synchronous
///   snapshot, queried before every write attempt.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the current session may write. Queried before every write
    /// attempt and before every queue drain.
    fn is_authenticated(&self) -> bool;

    /// Fetch a full translation by id.
    async fn get_translation(&self, id: &str) -> Result<Option<Translation>>;

    /// Fetch every translation the store holds.
    async fn get_all_translations(&self) -> Result<Vec<Translation>>;

    /// Upsert a translation's identity (id, display name, timestamps)
    /// without touching its book content.
    async fn save_translation(&self, translation: &Translation) -> Result<()>;

    /// Apply one bounded write unit.
    ///
    /// Units arrive in the order produced by [`split_books`]; the header
    /// for a translation always precedes its chapter batches.
    async fn put_unit(&self, unit: &WriteUnit) -> Result<()>;

    /// Write a book set, chunked by book and by chapter.
    ///
    /// Provided: splits the books into units under [`WRITE_UNIT_CEILING`]
    /// and applies them sequentially. A failure part-way leaves the
    /// remote with a prefix of the units applied — safe, because units
    /// are upserts and the whole write is replayed by the queue.
    async fn save_books(&self, id: &str, name: &str, books: &[Book]) -> Result<()> {
        for unit in split_books(id, name, books, WRITE_UNIT_CEILING)? {
            self.put_unit(&unit).await?;
        }
        Ok(())
    }

    /// Push-based change feed for translations.
    fn subscribe_translations(&self) -> broadcast::Receiver<RemoteEvent>;

    /// Fetch a projection channel's current reference.
    async fn get_projection_channel(&self, channel: &str) -> Result<Option<ProjectorRef>>;

    /// Publish a projection channel reference (last-write-wins).
    async fn save_projection_channel(&self, channel: &str, reference: &ProjectorRef) -> Result<()>;

    /// Push-based feed of one channel's reference changes.
    fn subscribe_projection_channel(&self, channel: &str) -> broadcast::Receiver<ProjectorRef>;
}
