//! Row models mapping the hierarchical types onto SQLite columns.
//!
//! The book hierarchy rides in a single JSON column; timestamps are unix
//! seconds. Conversions are fallible in both directions because a cache
//! file written by a different schema revision must fail loudly as
//! [`ErrorKind::InvalidData`] rather than deserialize into nonsense.

use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use lectern_model::{Book, ProjectorRef, Translation};
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct TranslationRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) books: String,
    #[sqlx(default)]
    pub(crate) created_at: Option<i64>,
    #[sqlx(default)]
    pub(crate) updated_at: Option<i64>,
}

impl TryFrom<&Translation> for TranslationRow {
    type Error = Error;
    fn try_from(translation: &Translation) -> Result<Self, Self::Error> {
        Ok(Self {
            id: translation.id.clone(),
            name: translation.name.clone(),
            books: serde_json::to_string(&translation.books).or_raise(|| ErrorKind::InvalidData("books"))?,
            created_at: translation.created_at.map(|ts| ts.unix_timestamp()),
            updated_at: translation.updated_at.map(|ts| ts.unix_timestamp()),
        })
    }
}

impl TryFrom<TranslationRow> for Translation {
    type Error = Error;
    fn try_from(row: TranslationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            books: serde_json::from_str::<Vec<Book>>(&row.books).or_raise(|| ErrorKind::InvalidData("books"))?,
            created_at: row
                .created_at
                .map(|ts| UtcDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData("created_at")))
                .transpose()?,
            updated_at: row
                .updated_at
                .map(|ts| UtcDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData("updated_at")))
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ChannelRow {
    pub(crate) channel: String,
    pub(crate) translation: String,
    pub(crate) book: String,
    pub(crate) chapter: i64,
    pub(crate) verse: i64,
    pub(crate) text: String,
    pub(crate) updated_at: i64,
}

impl ChannelRow {
    pub(crate) fn from_ref(channel: &str, reference: &ProjectorRef) -> Self {
        Self {
            channel: channel.to_string(),
            translation: reference.translation.clone(),
            book: reference.book.clone(),
            chapter: i64::from(reference.chapter),
            verse: i64::from(reference.verse),
            text: reference.text.clone(),
            updated_at: reference.updated_at.unix_timestamp(),
        }
    }
}

impl TryFrom<ChannelRow> for ProjectorRef {
    type Error = Error;
    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        Ok(Self {
            translation: row.translation,
            book: row.book,
            chapter: u32::try_from(row.chapter).or_raise(|| ErrorKind::InvalidData("chapter"))?,
            verse: u32::try_from(row.verse).or_raise(|| ErrorKind::InvalidData("verse"))?,
            text: row.text,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("updated_at"))?,
        })
    }
}
