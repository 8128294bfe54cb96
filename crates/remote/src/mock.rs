//! In-memory remote store for testing.

use crate::chunk::WriteUnit;
use crate::error::{ErrorKind, Result};
use crate::store::{RemoteEvent, RemoteStore};
use async_trait::async_trait;
use lectern_model::{Book, ProjectorRef, Translation};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcDateTime;
use tokio::sync::{RwLock, broadcast};

/// Failure injected into the next mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    PermissionDenied,
    Backend,
}

impl Failure {
    fn raise<T>(self, operation: &str) -> Result<T> {
        match self {
            Self::Unavailable => exn::bail!(ErrorKind::Unavailable(format!("injected failure during {operation}"))),
            Self::PermissionDenied => {
                exn::bail!(ErrorKind::PermissionDenied(format!("injected failure during {operation}")))
            },
            Self::Backend => exn::bail!(ErrorKind::Backend(format!("injected failure during {operation}"))),
        }
    }
}

/// In-memory [`RemoteStore`] for tests.
///
/// State is assembled exactly the way a real backend would see it: from
/// applied [`WriteUnit`]s, not from whole translations. Every applied
/// unit is recorded with its serialized size so tests can assert the
/// chunking contract. Toggles cover the states the sync engine has to
/// survive:
///
/// - [`set_reachable(false)`](Self::set_reachable) — every call fails
///   with [`ErrorKind::Unavailable`];
/// - [`set_authenticated(false)`](Self::set_authenticated) — writes fail
///   with [`ErrorKind::PermissionDenied`] (reads stay open, matching
///   stores with public read rules);
/// - [`fail_next`](Self::fail_next) — one-shot injected failure on the
///   next mutating call.
pub struct MockRemote {
    authenticated: AtomicBool,
    reachable: AtomicBool,
    next_failure: StdMutex<Option<Failure>>,
    applied_units: StdMutex<Vec<(WriteUnit, usize)>>,
    translations: RwLock<HashMap<String, Translation>>,
    channels: RwLock<HashMap<String, ProjectorRef>>,
    events: broadcast::Sender<RemoteEvent>,
    channel_events: StdMutex<HashMap<String, broadcast::Sender<ProjectorRef>>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// An empty, reachable, authenticated store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            authenticated: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            next_failure: StdMutex::new(None),
            applied_units: StdMutex::new(Vec::new()),
            translations: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            events,
            channel_events: StdMutex::new(HashMap::new()),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Inject a failure into the next mutating call only.
    pub fn fail_next(&self, failure: Failure) {
        *self.next_failure.lock().unwrap() = Some(failure);
    }

    /// Pre-populate a translation, bypassing the unit path.
    pub async fn seed(&self, translation: Translation) {
        self.translations.write().await.insert(translation.id.clone(), translation);
    }

    /// Every unit applied so far, with serialized sizes.
    pub fn applied_units(&self) -> Vec<(WriteUnit, usize)> {
        self.applied_units.lock().unwrap().clone()
    }

    /// Snapshot of the assembled remote state.
    pub async fn translations_snapshot(&self) -> Vec<Translation> {
        let mut all: Vec<Translation> = self.translations.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Simulate a change pushed from another client.
    pub async fn push_translation(&self, translation: Translation) {
        self.translations.write().await.insert(translation.id.clone(), translation.clone());
        _ = self.events.send(RemoteEvent::TranslationUpserted(translation));
    }

    fn check_reachable(&self, operation: &str) -> Result<()> {
        match self.reachable.load(Ordering::SeqCst) {
            true => Ok(()),
            false => exn::bail!(ErrorKind::Unavailable(format!("unreachable during {operation}"))),
        }
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        self.check_reachable(operation)?;
        if let Some(failure) = self.next_failure.lock().unwrap().take() {
            return failure.raise(operation);
        }
        match self.authenticated.load(Ordering::SeqCst) {
            true => Ok(()),
            false => exn::bail!(ErrorKind::PermissionDenied(format!("anonymous write during {operation}"))),
        }
    }

    async fn apply(&self, unit: &WriteUnit) {
        let mut translations = self.translations.write().await;
        match unit {
            WriteUnit::Header { translation, name } => {
                let entry = translations
                    .entry(translation.clone())
                    .or_insert_with(|| Translation::new(translation.clone(), name.clone()));
                if !name.is_empty() {
                    entry.name = name.clone();
                }
                entry.updated_at = Some(UtcDateTime::now());
            },
            WriteUnit::Chapters { translation, book, chapters } => {
                let entry = translations
                    .entry(translation.clone())
                    .or_insert_with(|| Translation::new(translation.clone(), String::new()));
                let target = match entry.books.iter().position(|b| b.name == *book) {
                    Some(index) => &mut entry.books[index],
                    None => {
                        entry.books.push(Book::new(book.clone()));
                        entry.books.last_mut().unwrap()
                    },
                };
                for chapter in chapters {
                    match target.chapters.iter().position(|c| c.number == chapter.number) {
                        Some(index) => target.chapters[index] = chapter.clone(),
                        None => target.chapters.push(chapter.clone()),
                    }
                }
                target.chapters.sort_by_key(|c| c.number);
            },
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn get_translation(&self, id: &str) -> Result<Option<Translation>> {
        self.check_reachable("get_translation")?;
        Ok(self.translations.read().await.get(id).cloned())
    }

    async fn get_all_translations(&self) -> Result<Vec<Translation>> {
        self.check_reachable("get_all_translations")?;
        Ok(self.translations_snapshot().await)
    }

    async fn save_translation(&self, translation: &Translation) -> Result<()> {
        self.check_write("save_translation")?;
        self.apply(&WriteUnit::Header {
            translation: translation.id.clone(),
            name: translation.name.clone(),
        })
        .await;
        Ok(())
    }

    async fn put_unit(&self, unit: &WriteUnit) -> Result<()> {
        self.check_write("put_unit")?;
        let size = unit.size()?;
        self.applied_units.lock().unwrap().push((unit.clone(), size));
        self.apply(unit).await;
        if let WriteUnit::Chapters { translation, .. } = unit {
            let current = self.translations.read().await.get(translation).cloned();
            if let Some(current) = current {
                _ = self.events.send(RemoteEvent::TranslationUpserted(current));
            }
        }
        Ok(())
    }

    fn subscribe_translations(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    async fn get_projection_channel(&self, channel: &str) -> Result<Option<ProjectorRef>> {
        self.check_reachable("get_projection_channel")?;
        Ok(self.channels.read().await.get(channel).cloned())
    }

    async fn save_projection_channel(&self, channel: &str, reference: &ProjectorRef) -> Result<()> {
        self.check_write("save_projection_channel")?;
        self.channels.write().await.insert(channel.to_string(), reference.clone());
        if let Some(sender) = self.channel_events.lock().unwrap().get(channel) {
            _ = sender.send(reference.clone());
        }
        Ok(())
    }

    fn subscribe_projection_channel(&self, channel: &str) -> broadcast::Receiver<ProjectorRef> {
        self.channel_events
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WRITE_UNIT_CEILING;
    use lectern_model::{Chapter, Verse};

    fn translation() -> Translation {
        Translation {
            id: "asv".to_string(),
            name: "American Standard Version".to_string(),
            books: vec![Book {
                name: "John".to_string(),
                chapters: vec![Chapter {
                    number: 3,
                    verses: vec![Verse::new(16, "For God so loved the world...")],
                }],
            }],
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_books_assembles_translation() {
        let remote = MockRemote::new();
        let t = translation();
        remote.save_books(&t.id, &t.name, &t.books).await.unwrap();
        let stored = remote.get_translation("asv").await.unwrap().unwrap();
        assert_eq!(stored.name, "American Standard Version");
        assert_eq!(stored.book("John").unwrap().chapter(3).unwrap().verse(16).unwrap().text, t.books[0].chapters[0].verses[0].text);
        // Header + one chapter batch were recorded.
        let units = remote.applied_units();
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|(_, size)| *size <= WRITE_UNIT_CEILING));
    }

    #[tokio::test]
    async fn test_unreachable_store_errors_on_reads_and_writes() {
        let remote = MockRemote::new();
        remote.set_reachable(false);
        let err = remote.get_all_translations().await.unwrap_err();
        assert!((*err).is_retryable());
        let err = remote.save_translation(&translation()).await.unwrap_err();
        assert!((*err).is_retryable());
    }

    #[tokio::test]
    async fn test_anonymous_writes_are_denied_but_reads_open() {
        let remote = MockRemote::new();
        remote.seed(translation()).await;
        remote.set_authenticated(false);
        assert!(remote.get_translation("asv").await.unwrap().is_some());
        let err = remote.save_translation(&translation()).await.unwrap_err();
        assert!((*err).is_permission());
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let remote = MockRemote::new();
        remote.fail_next(Failure::Backend);
        assert!(remote.save_translation(&translation()).await.is_err());
        assert!(remote.save_translation(&translation()).await.is_ok());
    }

    #[tokio::test]
    async fn test_translation_events_broadcast() {
        let remote = MockRemote::new();
        let mut events = remote.subscribe_translations();
        remote.push_translation(translation()).await;
        let RemoteEvent::TranslationUpserted(pushed) = events.recv().await.unwrap();
        assert_eq!(pushed.id, "asv");
    }

    #[tokio::test]
    async fn test_channel_round_trip_and_events() {
        let remote = MockRemote::new();
        let mut events = remote.subscribe_projection_channel("main");
        let reference = ProjectorRef::new("ASV", "John", 3, 16, "For God so loved the world...");
        remote.save_projection_channel("main", &reference).await.unwrap();
        assert_eq!(remote.get_projection_channel("main").await.unwrap().unwrap(), reference);
        assert_eq!(events.recv().await.unwrap(), reference);
    }
}
