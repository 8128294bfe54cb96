use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// A projection channel's live reference: the verse currently shown to an
/// audience, with its text resolved so display surfaces don't need the
/// full translation loaded.
///
/// Channel writes are last-write-wins; the timestamp exists for display
/// and debugging, not for conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectorRef {
    /// Display name of the translation the verse was taken from.
    pub translation: String,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    /// Resolved verse text at the time of sending.
    pub text: String,
    pub updated_at: UtcDateTime,
}

impl ProjectorRef {
    pub fn new(
        translation: impl Into<String>,
        book: impl Into<String>,
        chapter: u32,
        verse: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            translation: translation.into(),
            book: book.into(),
            chapter,
            verse,
            text: text.into(),
            updated_at: UtcDateTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let reference = ProjectorRef::new("ASV", "John", 3, 16, "For God so loved the world...");
        let json = serde_json::to_string(&reference).unwrap();
        let back: ProjectorRef = serde_json::from_str(&json).unwrap();
        assert_eq!(reference, back);
    }
}
