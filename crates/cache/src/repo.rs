//! Combined repository for cached translations and projection channels.
//!
//! Both entity types live in the same database file and share a pool, so
//! one repository covers them. Every write is an upsert keyed by id —
//! replaying a save is always safe — and `clear` wipes both tables in a
//! single transaction so a half-cleared cache can't survive a crash.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ChannelRow, TranslationRow};
use exn::ResultExt;
use lectern_model::{ProjectorRef, Translation};
use sqlx::SqlitePool;
use tracing::debug;

/// Repository over the local cache database.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    /// Create a repository from an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Translations
    // =========================================================================

    /// Fetch a cached translation by id.
    pub async fn get_translation(&self, id: &str) -> Result<Option<Translation>> {
        let row: Option<TranslationRow> = sqlx::query_as(include_str!("../queries/get_translation.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Translation::try_from).transpose()
    }

    /// Upsert a translation snapshot, books and all.
    ///
    /// An existing `created_at` is preserved; everything else is replaced
    /// by the incoming snapshot.
    pub async fn save_translation(&self, translation: &Translation) -> Result<()> {
        let row = TranslationRow::try_from(translation)?;
        debug!(id = %row.id, "caching translation locally");
        sqlx::query(include_str!("../queries/upsert_translation.sql"))
            .bind(row.id)
            .bind(row.name)
            .bind(row.books)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Fetch every cached translation, ordered by display name.
    ///
    /// A single undecodable row fails the whole read; the orchestrator
    /// treats that the same as an empty cache.
    pub async fn get_all_translations(&self) -> Result<Vec<Translation>> {
        let rows: Vec<TranslationRow> = sqlx::query_as(include_str!("../queries/get_all_translations.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Translation::try_from).collect()
    }

    // =========================================================================
    // Projection channels
    // =========================================================================

    /// Fetch the last known reference for a projection channel.
    pub async fn get_projection_channel(&self, channel: &str) -> Result<Option<ProjectorRef>> {
        let row: Option<ChannelRow> = sqlx::query_as(include_str!("../queries/get_channel.sql"))
            .bind(channel)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ProjectorRef::try_from).transpose()
    }

    /// Upsert a projection channel reference (last-write-wins).
    pub async fn save_projection_channel(&self, channel: &str, reference: &ProjectorRef) -> Result<()> {
        let row = ChannelRow::from_ref(channel, reference);
        sqlx::query(include_str!("../queries/upsert_channel.sql"))
            .bind(row.channel)
            .bind(row.translation)
            .bind(row.book)
            .bind(row.chapter)
            .bind(row.verse)
            .bind(row.text)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop every cached translation and channel reference.
    ///
    /// Runs in one transaction; the cache is either fully cleared or
    /// untouched.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM translations").execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM projection_channels").execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }
}
