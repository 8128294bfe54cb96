//! Deterministic reconciliation of two snapshots of the same translation.
//!
//! The merge is a right-biased union at book/chapter/verse granularity:
//! every key present in either snapshot survives, and where both sides
//! hold the same key the incoming side wins. Nothing is ever dropped —
//! a partial update (say, one chapter extracted from a PDF) folds into
//! whatever is already cached instead of replacing it.
//!
//! Books are keyed by name, chapters and verses by number. The result
//! always comes out with chapters and verses sorted ascending, regardless
//! of the order the ingestion layer produced them in.

use crate::{Book, Chapter, Translation};
use time::UtcDateTime;

/// Merge an incoming snapshot into an existing one.
///
/// With no existing translation the incoming one is the result (normalized
/// and stamped). Otherwise:
///
/// - incoming books absent from the existing set are appended wholesale;
/// - for books present on both sides, incoming chapters absent from the
///   existing book are appended, and chapters present on both sides union
///   their verses with incoming text overwriting same-numbered verses;
/// - the incoming display name wins only when non-empty;
/// - `created_at` keeps the existing value, `updated_at` is stamped.
///
/// The operation is idempotent: merging the same incoming snapshot twice
/// yields the same result as merging it once.
pub fn merge(existing: Option<Translation>, incoming: Translation) -> Translation {
    let Some(mut merged) = existing else {
        let mut adopted = incoming;
        for book in &mut adopted.books {
            normalize(book);
        }
        adopted.updated_at = Some(UtcDateTime::now());
        return adopted;
    };

    if !incoming.name.is_empty() {
        merged.name = incoming.name;
    }
    if merged.created_at.is_none() {
        merged.created_at = incoming.created_at;
    }
    for book in incoming.books {
        match merged.books.iter().position(|b| b.name == book.name) {
            None => {
                let mut book = book;
                normalize(&mut book);
                merged.books.push(book);
            },
            Some(index) => merge_book(&mut merged.books[index], book),
        }
    }
    merged.updated_at = Some(UtcDateTime::now());
    merged
}

fn merge_book(existing: &mut Book, incoming: Book) {
    for chapter in incoming.chapters {
        match existing.chapters.iter().position(|c| c.number == chapter.number) {
            None => {
                let mut chapter = chapter;
                chapter.verses.sort_by_key(|v| v.number);
                existing.chapters.push(chapter);
            },
            Some(index) => merge_chapter(&mut existing.chapters[index], chapter),
        }
    }
    existing.chapters.sort_by_key(|c| c.number);
}

fn merge_chapter(existing: &mut Chapter, incoming: Chapter) {
    for verse in incoming.verses {
        match existing.verses.iter().position(|v| v.number == verse.number) {
            None => existing.verses.push(verse),
            Some(index) => existing.verses[index] = verse,
        }
    }
    existing.verses.sort_by_key(|v| v.number);
}

fn normalize(book: &mut Book) {
    for chapter in &mut book.chapters {
        chapter.verses.sort_by_key(|v| v.number);
    }
    book.chapters.sort_by_key(|c| c.number);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verse;
    use rstest::rstest;

    fn translation(id: &str, books: Vec<Book>) -> Translation {
        Translation {
            id: id.to_string(),
            name: "American Standard Version".to_string(),
            books,
            created_at: None,
            updated_at: None,
        }
    }

    fn book(name: &str, chapters: Vec<Chapter>) -> Book {
        Book { name: name.to_string(), chapters }
    }

    fn chapter(number: u32, verses: Vec<(u32, &str)>) -> Chapter {
        Chapter {
            number,
            verses: verses.into_iter().map(|(n, t)| Verse::new(n, t)).collect(),
        }
    }

    /// Strip the merge timestamp so structural equality can be asserted.
    fn unstamped(mut t: Translation) -> Translation {
        t.updated_at = None;
        t
    }

    #[test]
    fn test_no_existing_adopts_incoming() {
        let incoming = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "For God so loved...")])])]);
        let merged = merge(None, incoming.clone());
        assert!(merged.updated_at.is_some());
        assert_eq!(unstamped(merged), incoming);
    }

    #[test]
    fn test_new_book_appended_wholesale() {
        let existing = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "a")])])]);
        let incoming = translation("asv", vec![book("Mark", vec![chapter(1, vec![(1, "b")])])]);
        let merged = merge(Some(existing.clone()), incoming);
        assert_eq!(merged.books.len(), existing.books.len() + 1);
        assert!(merged.book("John").is_some());
        assert!(merged.book("Mark").is_some());
    }

    #[test]
    fn test_union_keeps_both_verses_sorted() {
        let existing = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "sixteen")])])]);
        let incoming = translation("asv", vec![book("John", vec![chapter(3, vec![(17, "seventeen")])])]);
        let merged = merge(Some(existing), incoming);
        let verses = &merged.book("John").unwrap().chapter(3).unwrap().verses;
        let numbers: Vec<u32> = verses.iter().map(|v| v.number).collect();
        assert_eq!(numbers, vec![16, 17]);
    }

    #[test]
    fn test_incoming_verse_text_wins() {
        let existing = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "old text")])])]);
        let incoming = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "corrected text")])])]);
        let merged = merge(Some(existing), incoming);
        let verse = merged.book("John").unwrap().chapter(3).unwrap().verse(16).unwrap();
        assert_eq!(verse.text, "corrected text");
    }

    #[test]
    fn test_right_biased_union_across_all_keys() {
        // For every (book, chapter, verse) key present in either side, the
        // result holds the incoming value when it has the key, else the
        // existing value.
        let existing = translation(
            "asv",
            vec![
                book("John", vec![chapter(3, vec![(16, "A16"), (17, "A17")]), chapter(4, vec![(1, "A1")])]),
                book("Mark", vec![chapter(1, vec![(1, "Am1")])]),
            ],
        );
        let incoming = translation(
            "asv",
            vec![book("John", vec![chapter(3, vec![(17, "B17"), (18, "B18")])]), book("Luke", vec![chapter(2, vec![(7, "B7")])])],
        );
        let merged = merge(Some(existing), incoming);
        let john3 = merged.book("John").unwrap().chapter(3).unwrap();
        assert_eq!(john3.verse(16).unwrap().text, "A16");
        assert_eq!(john3.verse(17).unwrap().text, "B17");
        assert_eq!(john3.verse(18).unwrap().text, "B18");
        assert_eq!(merged.book("John").unwrap().chapter(4).unwrap().verse(1).unwrap().text, "A1");
        assert_eq!(merged.book("Mark").unwrap().chapter(1).unwrap().verse(1).unwrap().text, "Am1");
        assert_eq!(merged.book("Luke").unwrap().chapter(2).unwrap().verse(7).unwrap().text, "B7");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = translation("asv", vec![book("John", vec![chapter(3, vec![(16, "a"), (17, "b")])])]);
        let incoming = translation("asv", vec![book("John", vec![chapter(3, vec![(17, "c")]), chapter(4, vec![(1, "d")])])]);
        let once = merge(Some(existing), incoming.clone());
        let twice = merge(Some(once.clone()), incoming);
        assert_eq!(unstamped(once), unstamped(twice));
    }

    #[rstest]
    #[case::unsorted_incoming_chapters(vec![chapter(5, vec![(2, "x"), (1, "y")]), chapter(1, vec![(3, "z")])])]
    #[case::already_sorted(vec![chapter(1, vec![(1, "a")]), chapter(2, vec![(1, "b")])])]
    fn test_result_is_strictly_ascending(#[case] chapters: Vec<Chapter>) {
        let existing = translation("asv", vec![book("John", vec![chapter(2, vec![(9, "m"), (4, "n")])])]);
        let incoming = translation("asv", vec![book("John", chapters)]);
        let merged = merge(Some(existing), incoming);
        for b in &merged.books {
            assert!(b.chapters.windows(2).all(|w| w[0].number < w[1].number), "chapters out of order");
            for c in &b.chapters {
                assert!(c.verses.windows(2).all(|w| w[0].number < w[1].number), "verses out of order");
            }
        }
    }

    #[test]
    fn test_empty_incoming_name_preserved() {
        let existing = translation("asv", vec![]);
        let mut incoming = translation("asv", vec![]);
        incoming.name = String::new();
        let merged = merge(Some(existing), incoming);
        assert_eq!(merged.name, "American Standard Version");
    }

    #[test]
    fn test_non_empty_incoming_name_wins() {
        let existing = translation("asv", vec![]);
        let mut incoming = translation("asv", vec![]);
        incoming.name = "ASV (1901)".to_string();
        let merged = merge(Some(existing), incoming);
        assert_eq!(merged.name, "ASV (1901)");
    }

    #[test]
    fn test_existing_created_at_kept() {
        let mut existing = translation("asv", vec![]);
        let origin = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        existing.created_at = Some(origin);
        let mut incoming = translation("asv", vec![]);
        incoming.created_at = Some(UtcDateTime::from_unix_timestamp(1_800_000_000).unwrap());
        let merged = merge(Some(existing), incoming);
        assert_eq!(merged.created_at, Some(origin));
    }
}
