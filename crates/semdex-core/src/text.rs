//! Text utilities shared by the document policies.
//!
//! - [`canonicalize`]: case/whitespace-insensitive key for exact dedup
//! - [`estimate_tokens`]: cheap token estimate used by chunking
//! - [`split_sentences`]: sentence boundaries for chunk packing

use regex::Regex;
use std::sync::LazyLock;

/// Average characters per token used by [`estimate_tokens`].
pub const CHARS_PER_TOKEN: usize = 4;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("static sentence pattern"));

/// Canonical form of a text: lowercased, trimmed, whitespace runs collapsed.
///
/// Two texts are exact duplicates when their canonical forms are equal.
pub fn canonicalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    WHITESPACE_RUN.replace_all(&lowered, " ").into_owned()
}

/// Estimate the token count of a text as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split text into sentences.
///
/// A boundary is a `.`, `!` or `?` followed by whitespace. The terminator
/// stays with its sentence; the whitespace is dropped. Empty pieces are
/// discarded.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_BREAK.find_iter(text) {
        // Terminators are ASCII, so +1 stays on a char boundary.
        let end = m.start() + 1;
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            sentences.push(piece);
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("Hello World"), "hello world");
        assert_eq!(canonicalize("  hello   world \n"), "hello world");
        assert_eq!(canonicalize("Tab\tSeparated\r\nLines"), "tab separated lines");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn test_canonicalize_matches_variants() {
        assert_eq!(canonicalize("Hello World"), canonicalize("hello   world"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(40)), 10);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        // Four two-byte characters.
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("First one. Second one! Third one? Fourth");
        assert_eq!(s, vec!["First one.", "Second one!", "Third one?", "Fourth"]);
    }

    #[test]
    fn test_split_sentences_requires_whitespace() {
        let s = split_sentences("Version 1.5 is out.Really");
        assert_eq!(s, vec!["Version 1.5 is out.Really"]);
    }

    #[test]
    fn test_split_sentences_collapses_gaps() {
        let s = split_sentences("  One.\n\nTwo.   ");
        assert_eq!(s, vec!["One.", "Two."]);
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
