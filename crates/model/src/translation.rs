use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// A complete scripture edition.
///
/// Book order carries no meaning; lookups go through [`Translation::book`]
/// by name. The timestamps are optional because ingested documents don't
/// always know when they were produced — the merge algorithm stamps
/// `updated_at` on every reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub created_at: Option<UtcDateTime>,
    #[serde(default)]
    pub updated_at: Option<UtcDateTime>,
}

impl Translation {
    /// Create a translation with no books and no timestamps.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            books: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Look up a book by name.
    pub fn book(&self, name: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.name == name)
    }

    /// `true` when the translation carries no book content at all.
    ///
    /// Empty translations are valid reads but are never pushed to the
    /// remote store — there is nothing to chunk.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Total number of verses across all books.
    pub fn verse_count(&self) -> usize {
        self.books
            .iter()
            .flat_map(|b| b.chapters.iter())
            .map(|c| c.verses.len())
            .sum()
    }
}

/// A named book within a translation. Names are unique per translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub name: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Book {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), chapters: Vec::new() }
    }

    /// Look up a chapter by number.
    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }
}

/// A numbered chapter. Numbers are unique per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    #[serde(default)]
    pub verses: Vec<Verse>,
}

impl Chapter {
    pub fn new(number: u32) -> Self {
        Self { number, verses: Vec::new() }
    }

    /// Look up a verse by number.
    pub fn verse(&self, number: u32) -> Option<&Verse> {
        self.verses.iter().find(|v| v.number == number)
    }
}

/// A numbered verse and its text. Numbers are unique per chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub number: u32,
    pub text: String,
}

impl Verse {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self { number, text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Translation {
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

    #[test]
    fn test_structural_lookups() {
        let translation = sample();
        let verse = translation.book("John").and_then(|b| b.chapter(3)).and_then(|c| c.verse(16));
        assert!(verse.is_some());
        assert!(translation.book("Jonh").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let translation = sample();
        let json = serde_json::to_string(&translation).unwrap();
        let back: Translation = serde_json::from_str(&json).unwrap();
        assert_eq!(translation, back);
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        // Ingested documents may omit empty arrays entirely.
        let translation: Translation = serde_json::from_str(r#"{"id":"kjv","name":"King James"}"#).unwrap();
        assert!(translation.is_empty());
        assert_eq!(translation.verse_count(), 0);
    }
}
