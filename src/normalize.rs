//! Normalization for cross-provider matching.
//!
//! Normalized strings are only used to build provider queries and to compare
//! entries. The original artist/title text is what gets persisted.
//!
//! `normalize` is idempotent: its output contains only `[a-z0-9]` words
//! separated by single spaces, and every step leaves such text unchanged.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::{NormalizedKey, RankedEntry};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Innermost bracketed group: "(feat. X)", "[Live]", "{Remix}".
/// Applied repeatedly so nested groups are removed from the inside out.
pub static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[\{][^\(\)\[\]\{\}]*[\)\]\}]").unwrap());

/// Quote characters left after ASCII folding.
pub static QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"`]"#).unwrap());

/// Anything that is not a lowercase letter, digit, or whitespace.
pub static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Featured-artist clause, from the marker to the end of the string.
/// Runs after punctuation removal, so "feat." has already become "feat".
pub static FEATURING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:feat|ft|featuring)\b.*$").unwrap());

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition and
/// removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "naïve" → "naive"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    // Transliterate any remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped).to_lowercase()
}

/// Spell out the ampersand so "Rock & Roll" and "Rock and Roll" agree.
pub fn normalize_punctuation(s: &str) -> String {
    s.replace(" & ", " and ")
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Canonicalize an artist or title for matching.
///
/// Removes quotes, bracketed groups, featured-artist clauses and remaining
/// punctuation, then lower-cases and trims.
pub fn normalize(s: &str) -> String {
    let mut result = fold_to_ascii(&normalize_punctuation(s));

    result = QUOTES.replace_all(&result, "").into_owned();

    while PARENTHETICAL.is_match(&result) {
        result = PARENTHETICAL.replace_all(&result, " ").into_owned();
    }

    result = PUNCTUATION.replace_all(&result, " ").into_owned();
    result = FEATURING.replace(&result, "").into_owned();

    MULTI_SPACE.replace_all(result.trim(), " ").into_owned()
}

/// Normalized key for one ranked entry.
pub fn normalize_key(entry: &RankedEntry) -> NormalizedKey {
    NormalizedKey {
        artist_norm: normalize(&entry.artist),
        title_norm: normalize(&entry.title),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Rolling In The Deep"), "rolling in the deep");
        assert_eq!(normalize("  Uptown Funk!  "), "uptown funk");
        assert_eq!(normalize("'Hotline Bling'"), "hotline bling");
        assert_eq!(normalize("Don't Stop Me Now"), "dont stop me now");
    }

    #[test]
    fn test_featuring_equivalence() {
        assert_eq!(
            normalize("Rolling In The Deep (feat. X)"),
            normalize("rolling in the deep")
        );
        assert_eq!(normalize("Drake feat. Rihanna"), "drake");
        assert_eq!(normalize("Drake Featuring Rihanna"), "drake");
        assert_eq!(normalize("Work FT. Drake"), "work");
        // Marker must be a whole word
        assert_eq!(normalize("Defeat the Night"), "defeat the night");
    }

    #[test]
    fn test_parentheticals() {
        assert_eq!(normalize("Song [Live]"), "song");
        assert_eq!(normalize("Song (Remix (Extended Version))"), "song");
        assert_eq!(normalize("Get Lucky (Radio Edit) Part 2"), "get lucky part 2");
    }

    #[test]
    fn test_fold_and_punctuation() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("Motörhead"), "motorhead");
        assert_eq!(normalize("Rock & Roll"), "rock and roll");
        assert_eq!(normalize("‘Royals’"), "royals");
        assert_eq!(normalize("Run the Jewels, Vol. 2"), "run the jewels vol 2");
        assert_eq!(normalize("P!nk"), "p nk");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "Rolling In The Deep (feat. X)",
            "DJ Snake & Lil Jon",
            "Turn Down for What",
            "“Blank Space”",
            "Kendrick Lamar feat. Bilal, Anna Wise & Thundercat",
            "Unbalanced (paren",
            "x_feat y",
            "Sigur Rós",
            "Кино",
            "",
            "   ",
            "((()))",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_key() {
        let entry = RankedEntry::new(1, "Adele", "Rolling in the Deep");
        let key = normalize_key(&entry);
        assert_eq!(key.artist_norm, "adele");
        assert_eq!(key.title_norm, "rolling in the deep");
        // Original text is untouched
        assert_eq!(entry.title, "Rolling in the Deep");
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }
}
