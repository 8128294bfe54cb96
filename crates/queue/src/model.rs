//! Queued operation records and their row mapping.

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use serde::de::DeserializeOwned;
use std::fmt;
use time::UtcDateTime;

/// The operations the sync engine knows how to replay.
///
/// Tags are stored as plain text so an entry written by a newer build
/// survives in the table; a tag this build doesn't recognize parses to
/// `None` and gets dropped during processing instead of blocking the
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Re-attempt a raw translation save.
    SaveTranslation,
    /// Re-run the full merge against whatever the remote now holds.
    MergeTranslation,
    /// Replay a projection channel update.
    SendToProjector,
}

impl OperationKind {
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::SaveTranslation => "save-translation",
            Self::MergeTranslation => "merge-translation",
            Self::SendToProjector => "send-to-projector",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "save-translation" => Some(Self::SaveTranslation),
            "merge-translation" => Some(Self::MergeTranslation),
            "send-to-projector" => Some(Self::SendToProjector),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A durable record of a write that hasn't reached the remote store.
///
/// The payload is opaque JSON; only the replay handler knows its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: i64,
    /// Raw operation tag as stored (possibly unrecognized).
    pub tag: String,
    /// Opaque JSON payload.
    pub payload: String,
    pub retries: u32,
    pub queued_at: UtcDateTime,
}

impl PendingOperation {
    /// Parse the stored tag, if this build recognizes it.
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::from_tag(&self.tag)
    }

    /// Decode the payload into the handler's type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.payload).or_raise(|| ErrorKind::InvalidData("payload"))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct QueueRow {
    pub(crate) id: i64,
    pub(crate) kind: String,
    pub(crate) payload: String,
    pub(crate) retries: i64,
    pub(crate) queued_at: i64,
}

impl TryFrom<QueueRow> for PendingOperation {
    type Error = Error;
    fn try_from(row: QueueRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            tag: row.kind,
            payload: row.payload,
            retries: u32::try_from(row.retries).or_raise(|| ErrorKind::InvalidData("retries"))?,
            queued_at: UtcDateTime::from_unix_timestamp(row.queued_at)
                .or_raise(|| ErrorKind::InvalidData("queued_at"))?,
        })
    }
}
