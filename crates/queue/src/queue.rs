//! The queue itself: persistence, retry accounting, and the drain pass.

use crate::error::{ErrorKind, Result};
use crate::model::{PendingOperation, QueueRow};
use async_trait::async_trait;
use derive_more::{Display, Error};
use exn::ResultExt;
use lectern_cache::Database;
use serde::Serialize;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::{debug, instrument, warn};

use crate::OperationKind;

/// How a single replay attempt failed.
///
/// The distinction drives retry accounting: transient failures burn one
/// retry and stay queued, permanent failures (a permission denial, a
/// payload that can't succeed) go straight to the dead-letter state —
/// re-running them without outside intervention cannot help.
#[derive(Debug, Display, Error)]
pub enum ReplayError {
    #[display("transient replay failure: {_0}")]
    Transient(#[error(not(source))] String),
    #[display("permanent replay failure: {_0}")]
    Permanent(#[error(not(source))] String),
}

/// Dispatches one pending operation back at the remote store.
#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn replay(&self, operation: &PendingOperation) -> std::result::Result<(), ReplayError>;
}

/// Outcome counts for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries examined this pass.
    pub processed: usize,
    /// Replayed successfully and removed.
    pub completed: usize,
    /// Failed transiently; retry counter bumped, still queued.
    pub retried: usize,
    /// Failed transiently and hit the retry cap; now dead letters.
    pub exhausted: usize,
    /// Failed permanently; promoted to dead letters without burning retries.
    pub dead_lettered: usize,
    /// Unrecognized operation tags, removed so they can't block the queue.
    pub dropped: usize,
}

/// Durable FIFO of pending remote writes.
///
/// Lives in its own table inside the local cache database — the schema is
/// created here rather than in the cache crate's migrations because this
/// crate owns it.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    pool: SqlitePool,
    max_retries: u32,
}

impl OperationQueue {
    /// Open the queue over the local cache database, creating its table
    /// if this is the first run.
    pub async fn open(db: &Database, max_retries: u32) -> Result<Self> {
        let queue = Self { pool: db.pool().clone(), max_retries };
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                kind      TEXT NOT NULL,
                payload   TEXT NOT NULL,
                retries   INTEGER NOT NULL DEFAULT 0,
                queued_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&queue.pool)
        .await
        .or_raise(|| ErrorKind::Schema)?;
        Ok(queue)
    }

    /// The configured retry bound.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Append an operation with a zeroed retry counter.
    ///
    /// The row is durable before this returns; a crash immediately after
    /// still replays the write on the next online transition.
    pub async fn enqueue<P: Serialize + ?Sized>(&self, kind: OperationKind, payload: &P) -> Result<PendingOperation> {
        let payload = serde_json::to_string(payload).or_raise(|| ErrorKind::InvalidData("payload"))?;
        let queued_at = UtcDateTime::now();
        let result = sqlx::query(
            r#"
            INSERT INTO pending_operations (kind, payload, retries, queued_at)
            VALUES (?, ?, 0, ?)
            "#,
        )
        .bind(kind.as_tag())
        .bind(&payload)
        .bind(queued_at.unix_timestamp())
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        debug!(kind = %kind, id = result.last_insert_rowid(), "operation queued for replay");
        Ok(PendingOperation {
            id: result.last_insert_rowid(),
            tag: kind.as_tag().to_string(),
            payload,
            retries: 0,
            queued_at,
        })
    }

    /// Operations still eligible for replay, oldest first.
    pub async fn pending(&self) -> Result<Vec<PendingOperation>> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, kind, payload, retries, queued_at
            FROM pending_operations
            WHERE retries < ?
            ORDER BY id ASC
            "#,
        )
        .bind(i64::from(self.max_retries))
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(PendingOperation::try_from).collect()
    }

    /// Remove an operation. Idempotent: removing an absent id is fine.
    pub async fn remove(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_operations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Bump an operation's retry counter by one.
    pub async fn increment_retry(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE pending_operations SET retries = retries + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Entries that exhausted their retries (or were promoted on a
    /// permanent failure). Excluded from [`pending`](Self::pending)
    /// forever, kept for inspection.
    pub async fn dead_letters(&self) -> Result<Vec<PendingOperation>> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, kind, payload, retries, queued_at
            FROM pending_operations
            WHERE retries >= ?
            ORDER BY id ASC
            "#,
        )
        .bind(i64::from(self.max_retries))
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(PendingOperation::try_from).collect()
    }

    /// Purge all dead letters, returning how many were removed.
    pub async fn clear_dead_letters(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE retries >= ?")
            .bind(i64::from(self.max_retries))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    async fn mark_dead(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE pending_operations SET retries = MAX(retries, ?) WHERE id = ?")
            .bind(i64::from(self.max_retries))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Run one sequential pass over the currently pending operations.
    ///
    /// Sequential on purpose: replaying in parallel would reorder writes
    /// to the same entity. Within a pass, handler outcomes map to:
    ///
    /// | outcome                  | effect                                |
    /// |--------------------------|---------------------------------------|
    /// | unrecognized tag         | removed, logged (`dropped`)           |
    /// | `Ok`                     | removed (`completed`)                 |
    /// | `Transient`, below cap   | retry counter +1 (`retried`)          |
    /// | `Transient`, cap reached | retry counter +1, dead (`exhausted`)  |
    /// | `Permanent`              | promoted to dead (`dead_lettered`)    |
    #[instrument(skip_all)]
    pub async fn process<H: ReplayHandler + ?Sized>(&self, handler: &H) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        for operation in self.pending().await? {
            report.processed += 1;
            let Some(kind) = operation.kind() else {
                warn!(id = operation.id, tag = %operation.tag, "dropping operation with unrecognized tag");
                self.remove(operation.id).await?;
                report.dropped += 1;
                continue;
            };
            match handler.replay(&operation).await {
                Ok(()) => {
                    self.remove(operation.id).await?;
                    report.completed += 1;
                },
                Err(ReplayError::Transient(reason)) => {
                    self.increment_retry(operation.id).await?;
                    if operation.retries + 1 >= self.max_retries {
                        warn!(id = operation.id, kind = %kind, %reason, "operation exhausted its retries");
                        report.exhausted += 1;
                    } else {
                        debug!(id = operation.id, kind = %kind, %reason, "replay failed, will retry");
                        report.retried += 1;
                    }
                },
                Err(ReplayError::Permanent(reason)) => {
                    warn!(id = operation.id, kind = %kind, %reason, "operation dead-lettered");
                    self.mark_dead(operation.id).await?;
                    report.dead_lettered += 1;
                },
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        id: String,
    }

    /// Handler scripted with one outcome per call, recording what it saw.
    struct Script {
        outcomes: Mutex<Vec<std::result::Result<(), ReplayError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(outcomes: Vec<std::result::Result<(), ReplayError>>) -> Self {
            let mut outcomes = outcomes;
            outcomes.reverse();
            Self { outcomes: Mutex::new(outcomes), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ReplayHandler for Script {
        async fn replay(&self, operation: &PendingOperation) -> std::result::Result<(), ReplayError> {
            self.seen.lock().unwrap().push(operation.tag.clone());
            self.outcomes.lock().unwrap().pop().unwrap_or(Ok(()))
        }
    }

    async fn queue() -> (Database, OperationQueue) {
        let db = Database::connect_in_memory().await.unwrap();
        let queue = OperationQueue::open(&db, crate::DEFAULT_MAX_RETRIES).await.unwrap();
        (db, queue)
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (db, _) = queue().await;
        // Re-opening over the same database must not clobber the table.
        OperationQueue::open(&db, 5).await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_enqueue_pending_oldest_first() {
        let (db, queue) = queue().await;
        queue.enqueue(OperationKind::SaveTranslation, &Payload { id: "first".into() }).await.unwrap();
        queue.enqueue(OperationKind::MergeTranslation, &Payload { id: "second".into() }).await.unwrap();
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].id < pending[1].id);
        assert_eq!(pending[0].payload_as::<Payload>().unwrap().id, "first");
        assert_eq!(pending[0].retries, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (db, queue) = queue().await;
        let op = queue.enqueue(OperationKind::SendToProjector, &Payload { id: "x".into() }).await.unwrap();
        queue.remove(op.id).await.unwrap();
        queue.remove(op.id).await.unwrap();
        assert!(queue.pending().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_successful_replay_removes_entry() {
        let (db, queue) = queue().await;
        queue.enqueue(OperationKind::SaveTranslation, &Payload { id: "x".into() }).await.unwrap();
        let report = queue.process(&Script::new(vec![Ok(())])).await.unwrap();
        assert_eq!(report.completed, 1);
        assert!(queue.pending().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_failed_replay_increments_retry_by_exactly_one() {
        let (db, queue) = queue().await;
        queue.enqueue(OperationKind::SaveTranslation, &Payload { id: "x".into() }).await.unwrap();
        let script = Script::new(vec![Err(ReplayError::Transient("offline again".into()))]);
        let report = queue.process(&script).await.unwrap();
        assert_eq!(report.retried, 1);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retries, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_exhausted_entries_become_dead_letters() {
        let (db, queue) = queue().await;
        queue.enqueue(OperationKind::MergeTranslation, &Payload { id: "x".into() }).await.unwrap();
        for pass in 0..crate::DEFAULT_MAX_RETRIES {
            let script = Script::new(vec![Err(ReplayError::Transient(format!("pass {pass}")))]);
            queue.process(&script).await.unwrap();
        }
        assert!(queue.pending().await.unwrap().is_empty());
        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].retries, crate::DEFAULT_MAX_RETRIES);

        // A further pass never touches dead letters.
        let script = Script::new(vec![]);
        let report = queue.process(&script).await.unwrap();
        assert_eq!(report.processed, 0);
        assert!(script.seen.lock().unwrap().is_empty());

        assert_eq!(queue.clear_dead_letters().await.unwrap(), 1);
        assert!(queue.dead_letters().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters_immediately() {
        let (db, queue) = queue().await;
        queue.enqueue(OperationKind::SendToProjector, &Payload { id: "x".into() }).await.unwrap();
        let script = Script::new(vec![Err(ReplayError::Permanent("permission denied".into()))]);
        let report = queue.process(&script).await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(queue.pending().await.unwrap().is_empty());
        assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_unknown_tag_dropped_without_blocking() {
        let (db, queue) = queue().await;
        // Simulate an entry written by a newer build.
        sqlx::query("INSERT INTO pending_operations (kind, payload, retries, queued_at) VALUES (?, ?, 0, ?)")
            .bind("compact-database")
            .bind("{}")
            .bind(1_700_000_000_i64)
            .execute(db.pool())
            .await
            .unwrap();
        queue.enqueue(OperationKind::SaveTranslation, &Payload { id: "after".into() }).await.unwrap();

        let script = Script::new(vec![Ok(())]);
        let report = queue.process(&script).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.completed, 1);
        // The handler only ever saw the recognized operation.
        assert_eq!(*script.seen.lock().unwrap(), vec!["save-translation".to_string()]);
        assert!(queue.pending().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_entries_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let db = Database::connect(&path).await.unwrap();
            let queue = OperationQueue::open(&db, crate::DEFAULT_MAX_RETRIES).await.unwrap();
            queue.enqueue(OperationKind::SaveTranslation, &Payload { id: "survivor".into() }).await.unwrap();
            db.close().await;
        }
        // A fresh process: same file, new pool.
        let db = Database::connect(&path).await.unwrap();
        let queue = OperationQueue::open(&db, crate::DEFAULT_MAX_RETRIES).await.unwrap();
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload_as::<Payload>().unwrap().id, "survivor");
        db.close().await;
    }

    #[tokio::test]
    async fn test_pass_preserves_fifo_order() {
        let (db, queue) = queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(OperationKind::SaveTranslation, &Payload { id: id.into() }).await.unwrap();
        }
        let script = Script::new(vec![Ok(()), Ok(()), Ok(())]);
        queue.process(&script).await.unwrap();
        assert_eq!(script.seen.lock().unwrap().len(), 3);
        db.close().await;
    }
}
