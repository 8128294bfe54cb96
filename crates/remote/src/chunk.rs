//! Splitting hierarchical writes into size-bounded units.
//!
//! Peer document stores cap the size of a single write (commonly 1 MiB
//! per document). A whole translation easily exceeds that, so a book-set
//! write is decomposed into a header unit (id and display name) followed
//! by per-book chapter batches. Two rules hold unconditionally: a unit
//! never spans two books, and a full translation is never written as one
//! unit.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lectern_model::{Book, Chapter};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ceiling on a single unit's serialized size: comfortable headroom under
/// a 1 MiB per-document peer store.
pub const WRITE_UNIT_CEILING: usize = 900 * 1024;

/// One bounded write against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteUnit {
    /// Translation identity and display name; always shipped first so
    /// the remote entry exists before chapter batches arrive.
    Header { translation: String, name: String },
    /// A batch of chapters belonging to a single book.
    Chapters {
        translation: String,
        book: String,
        chapters: Vec<Chapter>,
    },
}

impl WriteUnit {
    /// The translation this unit belongs to.
    pub fn translation(&self) -> &str {
        match self {
            Self::Header { translation, .. } => translation,
            Self::Chapters { translation, .. } => translation,
        }
    }

    /// Serialized size in bytes, as the backend would ship it.
    pub fn size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self).or_raise(|| ErrorKind::InvalidData("write unit"))?.len())
    }
}

/// Split a book set into write units, none exceeding `limit` bytes.
///
/// Chapters are packed greedily per book. A book with no chapters still
/// produces one (empty) unit so its existence reaches the remote store.
/// Chapter is the floor granularity: a single chapter larger than the
/// limit ships alone, with a warning, rather than being split mid-chapter.
pub fn split_books(id: &str, name: &str, books: &[Book], limit: usize) -> Result<Vec<WriteUnit>> {
    let mut units = vec![WriteUnit::Header {
        translation: id.to_string(),
        name: name.to_string(),
    }];
    for book in books {
        // Size of a batch with no chapters yet; every chapter added pays
        // its own serialized size plus a separator on top of this.
        let empty = WriteUnit::Chapters {
            translation: id.to_string(),
            book: book.name.clone(),
            chapters: Vec::new(),
        };
        let overhead = empty.size()?;
        let mut batch: Vec<Chapter> = Vec::new();
        let mut batch_size = overhead;
        for chapter in &book.chapters {
            let chapter_size = serde_json::to_vec(chapter).or_raise(|| ErrorKind::InvalidData("chapter"))?.len() + 1;
            if overhead + chapter_size > limit {
                // Chapter is the floor granularity; this one can't fit in
                // any batch, so it ships alone no matter what's buffered.
                if !batch.is_empty() {
                    units.push(WriteUnit::Chapters {
                        translation: id.to_string(),
                        book: book.name.clone(),
                        chapters: std::mem::take(&mut batch),
                    });
                    batch_size = overhead;
                }
                warn!(
                    book = %book.name,
                    chapter = chapter.number,
                    size = chapter_size,
                    limit,
                    "single chapter exceeds the write unit ceiling, shipping alone"
                );
                units.push(WriteUnit::Chapters {
                    translation: id.to_string(),
                    book: book.name.clone(),
                    chapters: vec![chapter.clone()],
                });
                continue;
            }
            if batch_size + chapter_size > limit {
                units.push(WriteUnit::Chapters {
                    translation: id.to_string(),
                    book: book.name.clone(),
                    chapters: std::mem::take(&mut batch),
                });
                batch_size = overhead;
            }
            batch_size += chapter_size;
            batch.push(chapter.clone());
        }
        // Flush the final batch; an empty one still announces the book.
        if !batch.is_empty() || book.chapters.is_empty() {
            units.push(WriteUnit::Chapters {
                translation: id.to_string(),
                book: book.name.clone(),
                chapters: batch,
            });
        }
    }
    Ok(units)
}
