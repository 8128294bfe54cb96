//! The cache manager: the only component callers talk to.

use crate::error::{ErrorKind, Result};
use crate::locks::IdLocks;
use crate::replay::ProjectorPayload;
use lectern_cache::{Database, Repository};
use lectern_config::Config;
use lectern_model::{ProjectorRef, Translation, merge::merge};
use lectern_queue::{DrainReport, OperationKind, OperationQueue, PendingOperation};
use lectern_remote::{RemoteEvent, RemoteHandle};
use lectern_signal::NetworkStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, instrument, warn};

/// Where a write ended up.
///
/// Callers are not expected to branch on this in steady state — the
/// local view is presumed correct until the next successful queue drain
/// — but the outcome keeps the deferred/denied paths observable instead
/// of silently swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote store acknowledged the write.
    Synced,
    /// The write was deferred to the pending-operation queue.
    Queued,
    /// The remote store denied the write; it was logged and *not*
    /// queued, since a retry without re-authentication cannot succeed.
    Denied,
}

/// Result of [`CacheManager::merge_translation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// The reconciled translation, as now held in the memory tier.
    pub translation: Translation,
    /// Where the persistence attempt ended up.
    pub outcome: WriteOutcome,
}

/// Orchestrates the three storage tiers.
///
/// Reads go L1 → L2 → L3 (except the bulk read, which is online-first —
/// see [`get_all_translations`](Self::get_all_translations)). Writes
/// update L1 synchronously, write through to L2 best-effort, and reach
/// L3 directly or through the queue. Construction subscribes to
/// [`NetworkStatus`]; an offline→online transition drains the queue,
/// provided the remote session is authenticated.
pub struct CacheManager {
    memory: RwLock<HashMap<String, Translation>>,
    local: Repository,
    remote: RemoteHandle,
    queue: OperationQueue,
    network: NetworkStatus,
    locks: IdLocks,
    /// Present when this manager opened the database itself (via
    /// [`from_config`](Self::from_config)) and therefore owns closing it.
    db: Option<Database>,
    /// Self-reference for the background tasks this manager spawns;
    /// weak, so dropping the last caller handle ends them.
    weak: Weak<CacheManager>,
}

impl CacheManager {
    /// Assemble a manager from already-constructed parts.
    ///
    /// Spawns the connectivity watcher that replays the queue on
    /// reconnect. Must be called within a tokio runtime.
    pub fn new(
        local: Repository,
        remote: RemoteHandle,
        queue: OperationQueue,
        network: NetworkStatus,
    ) -> Arc<Self> {
        Self::assemble(local, remote, queue, network, None, true)
    }

    /// Open the local database and queue from configuration.
    pub async fn from_config(config: &Config, remote: RemoteHandle, network: NetworkStatus) -> Result<Arc<Self>> {
        if let Some(parent) = config.cache.db_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(error = %err, "could not create cache directory, connect may fail");
            }
        }
        let db = Database::connect(&config.cache.db_path).await.map_err(ErrorKind::cache)?;
        let queue = OperationQueue::open(&db, config.queue.max_retries).await.map_err(ErrorKind::queue)?;
        let local = Repository::from(&db);
        Ok(Self::assemble(local, remote, queue, network, Some(db), config.sync.replay_on_connect))
    }

    fn assemble(
        local: Repository,
        remote: RemoteHandle,
        queue: OperationQueue,
        network: NetworkStatus,
        db: Option<Database>,
        replay_on_connect: bool,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|weak| Self {
            memory: RwLock::new(HashMap::new()),
            local,
            remote,
            queue,
            network,
            locks: IdLocks::default(),
            db,
            weak: weak.clone(),
        });
        if replay_on_connect {
            manager.spawn_replay_watcher();
        }
        manager
    }

    /// Watches connectivity; every offline→online transition triggers a
    /// queue drain. Holds only a weak reference so dropping the last
    /// caller handle ends the task.
    fn spawn_replay_watcher(&self) {
        let mut changes = self.network.changes();
        let weak = self.weak.clone();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let online = *changes.borrow_and_update();
                if !online {
                    continue;
                }
                let Some(manager) = weak.upgrade() else { break };
                let report = manager.process_pending_operations().await;
                debug!(completed = report.completed, retried = report.retried, "queue drain after reconnect");
            }
        });
    }

    /// Apply pushed remote changes to the local tiers as they arrive.
    ///
    /// Optional: call once after construction when the backend supports
    /// push notifications. The remote store is authoritative, so pushed
    /// snapshots overwrite L1/L2 directly.
    pub fn watch_remote(&self) {
        let mut events = self.remote.subscribe_translations();
        let weak = self.weak.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RemoteEvent::TranslationUpserted(translation)) => {
                        let Some(manager) = weak.upgrade() else { break };
                        debug!(id = %translation.id, "remote change pushed");
                        manager.memory.write().await.insert(translation.id.clone(), translation.clone());
                        if let Err(err) = manager.local.save_translation(&translation).await {
                            warn!(error = %err, "local write-through of pushed change failed");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "remote change feed lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// The pending-operation queue, for inspection.
    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a translation, cache-first: L1, then L2 (populating L1),
    /// then — when online — L3 (populating L1 and, best-effort, L2).
    ///
    /// Absence is `Ok(None)`, not an error. A remote failure propagates
    /// only when no tier could satisfy the read.
    #[instrument(skip(self))]
    pub async fn get_translation(&self, id: &str) -> Result<Option<Translation>> {
        if let Some(hit) = self.memory.read().await.get(id).cloned() {
            return Ok(Some(hit));
        }
        match self.local.get_translation(id).await {
            Ok(Some(cached)) => {
                self.memory.write().await.insert(id.to_string(), cached.clone());
                return Ok(Some(cached));
            },
            Ok(None) => {},
            Err(err) => warn!(error = %err, "local cache read failed, trying remote"),
        }
        if !self.network.is_online() {
            return Ok(None);
        }
        match self.remote.get_translation(id).await {
            Ok(Some(fetched)) => {
                self.memory.write().await.insert(id.to_string(), fetched.clone());
                if let Err(err) = self.local.save_translation(&fetched).await {
                    warn!(error = %err, "local write-through after remote read failed");
                }
                Ok(Some(fetched))
            },
            Ok(None) => Ok(None),
            Err(err) => Err(ErrorKind::remote(err)),
        }
    }

    /// Fetch every known translation, online-first.
    ///
    /// Intentionally asymmetric with [`get_translation`](Self::get_translation):
    /// the translation list is a shared resource, so freshness wins over
    /// latency when the remote store is reachable. A non-empty remote
    /// result repopulates L1 and L2 and wins outright. An empty or
    /// failing remote result falls back to L2 (kicking off a
    /// fire-and-forget background refresh) — a remote that reports zero
    /// translations never erases a populated local cache. Offline with an
    /// empty L2, the remote is attempted once anyway, since some store
    /// clients serve from their own offline persistence. Nothing found
    /// anywhere is an empty list; this cache never invents seed content.
    #[instrument(skip(self))]
    pub async fn get_all_translations(&self) -> Vec<Translation> {
        let online = self.network.is_online();
        if online {
            match self.remote.get_all_translations().await {
                Ok(all) if !all.is_empty() => {
                    self.repopulate(&all).await;
                    return all;
                },
                Ok(_) => debug!("remote holds no translations, falling back to local cache"),
                Err(err) => warn!(error = %err, "remote bulk read failed, falling back to local cache"),
            }
        }
        match self.local.get_all_translations().await {
            Ok(cached) if !cached.is_empty() => {
                {
                    let mut memory = self.memory.write().await;
                    for translation in &cached {
                        memory.insert(translation.id.clone(), translation.clone());
                    }
                }
                if online {
                    self.spawn_background_refresh();
                }
                return cached;
            },
            Ok(_) => {},
            Err(err) => warn!(error = %err, "local bulk read failed"),
        }
        if !online {
            // The store client may have transport-level persistence that
            // answers even while the network flag says offline.
            match self.remote.get_all_translations().await {
                Ok(all) if !all.is_empty() => {
                    self.repopulate(&all).await;
                    return all;
                },
                Ok(_) => {},
                Err(err) => debug!(error = %err, "offline remote attempt failed"),
            }
        }
        Vec::new()
    }

    /// Refresh L1/L2 from the remote store without blocking the caller.
    fn spawn_background_refresh(&self) {
        let Some(manager) = self.weak.upgrade() else { return };
        tokio::spawn(async move {
            match manager.remote.get_all_translations().await {
                Ok(all) if !all.is_empty() => manager.repopulate(&all).await,
                Ok(_) => {},
                Err(err) => debug!(error = %err, "background refresh failed"),
            }
        });
    }

    /// Upsert a set of translations into L1 and, best-effort, L2.
    async fn repopulate(&self, all: &[Translation]) {
        let mut memory = self.memory.write().await;
        for translation in all {
            memory.insert(translation.id.clone(), translation.clone());
        }
        drop(memory);
        for translation in all {
            if let Err(err) = self.local.save_translation(translation).await {
                warn!(error = %err, id = %translation.id, "local repopulate failed");
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Save a translation through all tiers.
    ///
    /// L1 is updated synchronously and L2 written through best-effort
    /// before this returns. The remote write is attempted only when
    /// online, authenticated, and the payload carries books; otherwise a
    /// `save-translation` operation is queued for replay.
    #[instrument(skip_all, fields(id = %translation.id))]
    pub async fn save_translation(&self, translation: Translation) -> WriteOutcome {
        self.memory.write().await.insert(translation.id.clone(), translation.clone());
        self.persist(&translation, OperationKind::SaveTranslation).await
    }

    /// Merge a (possibly partial) incoming snapshot into the cached
    /// state and persist the reconciled result through all tiers.
    ///
    /// The whole read-merge-write sequence holds the per-id lock, so two
    /// concurrent merges for the same translation serialize instead of
    /// silently discarding each other's verses. The merged translation
    /// is returned synchronously; remote persistence may still be
    /// pending or queued — and when the remote write *is* attempted it
    /// pushes the entire reconciled book set, not just the incoming
    /// delta.
    #[instrument(skip_all, fields(id = %incoming.id))]
    pub async fn merge_translation(&self, incoming: Translation) -> Merged {
        let _guard = self.locks.acquire(&incoming.id).await;
        let existing = match self.get_translation(&incoming.id).await {
            Ok(existing) => existing,
            Err(err) => {
                // The queued replay re-reconciles against the remote, so
                // merging against a miss here can't lose data for good.
                warn!(error = %err, "read before merge failed, merging against local miss");
                None
            },
        };
        let merged = merge(existing, incoming);
        self.memory.write().await.insert(merged.id.clone(), merged.clone());
        let outcome = self.persist(&merged, OperationKind::MergeTranslation).await;
        Merged { translation: merged, outcome }
    }

    /// Shared tail of both write paths: L2 write-through, then remote or
    /// queue. The memory tier is already updated by the caller.
    async fn persist(&self, translation: &Translation, kind: OperationKind) -> WriteOutcome {
        if let Err(err) = self.local.save_translation(translation).await {
            warn!(error = %err, "local write-through failed");
        }
        let preconditions =
            self.network.is_online() && self.remote.is_authenticated() && !translation.is_empty();
        if !preconditions {
            return self.enqueue(kind, translation).await;
        }
        match self.push_remote(translation).await {
            Ok(()) => WriteOutcome::Synced,
            Err(err) if (*err).is_permission() => {
                warn!(error = %err, "remote write denied, not queueing");
                WriteOutcome::Denied
            },
            Err(err) => {
                warn!(error = %err, "remote write failed, queueing for replay");
                self.enqueue(kind, translation).await
            },
        }
    }

    /// Push identity then content, chunked by book and chapter.
    pub(crate) async fn push_remote(&self, translation: &Translation) -> lectern_remote::error::Result<()> {
        self.remote.save_translation(translation).await?;
        self.remote.save_books(&translation.id, &translation.name, &translation.books).await
    }

    /// Replay a queued merge: re-run the full merge algorithm against
    /// whatever the remote now holds — not a raw overwrite — and push
    /// the entire reconciled book set.
    ///
    /// The remote read happens first and on purpose: the queued payload
    /// was reconciled against a snapshot that may be stale by now, and
    /// another client may have written in the meantime. The result is
    /// also folded back into L1/L2 (unioned with the current local view,
    /// so a concurrent local edit isn't regressed).
    pub(crate) async fn replay_merge(&self, incoming: Translation) -> lectern_remote::error::Result<()> {
        let _guard = self.locks.acquire(&incoming.id).await;
        let remote_existing = self.remote.get_translation(&incoming.id).await?;
        let reconciled = merge(remote_existing, incoming);
        self.push_remote(&reconciled).await?;
        let local_view = self.memory.read().await.get(&reconciled.id).cloned();
        let folded = merge(local_view, reconciled);
        self.memory.write().await.insert(folded.id.clone(), folded.clone());
        if let Err(err) = self.local.save_translation(&folded).await {
            warn!(error = %err, "local write-through after merge replay failed");
        }
        Ok(())
    }

    pub(crate) fn remote_store(&self) -> &RemoteHandle {
        &self.remote
    }

    async fn enqueue<P: Serialize + ?Sized>(&self, kind: OperationKind, payload: &P) -> WriteOutcome {
        if let Err(err) = self.queue.enqueue(kind, payload).await {
            // Queue persistence failures never propagate; the write is
            // still visible in L1/L2, it just won't self-heal remotely.
            error!(error = %err, "failed to persist pending operation");
        }
        WriteOutcome::Queued
    }

    // =========================================================================
    // Projection channels
    // =========================================================================

    /// Read a channel's live reference: L2, then — when online — L3
    /// (backfilling L2 on a hit).
    pub async fn get_projection_channel(&self, channel: &str) -> Result<Option<ProjectorRef>> {
        match self.local.get_projection_channel(channel).await {
            Ok(Some(reference)) => return Ok(Some(reference)),
            Ok(None) => {},
            Err(err) => warn!(error = %err, "local channel read failed, trying remote"),
        }
        if !self.network.is_online() {
            return Ok(None);
        }
        match self.remote.get_projection_channel(channel).await {
            Ok(Some(reference)) => {
                if let Err(err) = self.local.save_projection_channel(channel, &reference).await {
                    warn!(error = %err, "local channel backfill failed");
                }
                Ok(Some(reference))
            },
            Ok(None) => Ok(None),
            Err(err) => Err(ErrorKind::remote(err)),
        }
    }

    /// Publish a channel reference: L2 best-effort, then L3 or the queue.
    /// Last-write-wins; there are no merge semantics for channels.
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn save_projection_channel(&self, channel: &str, reference: ProjectorRef) -> WriteOutcome {
        if let Err(err) = self.local.save_projection_channel(channel, &reference).await {
            warn!(error = %err, "local channel write-through failed");
        }
        let payload = ProjectorPayload {
            channel: channel.to_string(),
            reference: reference.clone(),
        };
        if !(self.network.is_online() && self.remote.is_authenticated()) {
            return self.enqueue(OperationKind::SendToProjector, &payload).await;
        }
        match self.remote.save_projection_channel(channel, &reference).await {
            Ok(()) => WriteOutcome::Synced,
            Err(err) if (*err).is_permission() => {
                warn!(error = %err, "channel write denied, not queueing");
                WriteOutcome::Denied
            },
            Err(err) => {
                warn!(error = %err, "channel write failed, queueing for replay");
                self.enqueue(OperationKind::SendToProjector, &payload).await
            },
        }
    }

    /// Live feed of one channel's reference changes, straight from the
    /// remote store.
    pub fn subscribe_projection_channel(&self, channel: &str) -> broadcast::Receiver<ProjectorRef> {
        self.remote.subscribe_projection_channel(channel)
    }

    // =========================================================================
    // Queue replay
    // =========================================================================

    /// Drain the pending-operation queue against the remote store.
    ///
    /// A no-op without remote authentication: every replay would fail
    /// with a permission error anyway, burning retries for nothing.
    /// Triggered automatically on reconnect, callable directly.
    #[instrument(skip(self))]
    pub async fn process_pending_operations(&self) -> DrainReport {
        if !self.remote.is_authenticated() {
            debug!("skipping queue replay without remote authentication");
            return DrainReport::default();
        }
        match self.queue.process(self).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "queue drain failed");
                DrainReport::default()
            },
        }
    }

    /// Pending operations that exhausted their retries.
    pub async fn dead_letters(&self) -> Vec<PendingOperation> {
        match self.queue.dead_letters().await {
            Ok(dead) => dead,
            Err(err) => {
                warn!(error = %err, "dead letter inspection failed");
                Vec::new()
            },
        }
    }

    /// Purge dead letters, returning how many were removed.
    pub async fn clear_dead_letters(&self) -> u64 {
        match self.queue.clear_dead_letters().await {
            Ok(cleared) => cleared,
            Err(err) => {
                warn!(error = %err, "dead letter purge failed");
                0
            },
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop the in-memory tier. The next read repopulates from L2/L3.
    pub async fn clear_memory_cache(&self) {
        self.memory.write().await.clear();
    }

    /// Drop the memory *and* local database tiers. The remote store is
    /// untouched, as is the pending-operation queue — queued writes
    /// haven't reached the authority yet and clearing caches must not
    /// lose them.
    pub async fn clear_all_caches(&self) {
        self.clear_memory_cache().await;
        if let Err(err) = self.local.clear().await {
            warn!(error = %err, "local cache clear failed");
        }
    }

    /// Close the underlying database, when this manager opened it (see
    /// [`from_config`](Self::from_config)). No-op otherwise.
    pub async fn close(&self) {
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}
