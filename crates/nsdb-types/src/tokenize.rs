//! Full-text search phrase tokenizer.
//!
//! Normalizes a phrase into a deduplicated, order-preserving sequence of
//! lowercased, diacritic-stripped terms, split on anything that is not a
//! letter, digit, or underscore. This mirrors the word-splitting behavior of
//! SQLite's `unicode61`/`simple` FTS tokenizers, which the native-FTS branch
//! of the search layer must stay compatible with.

use unicode_normalization::UnicodeNormalization;

/// Tokenizes `phrase` into lowercased, diacritic-stripped, deduplicated
/// terms, in first-occurrence order. Empty input yields an empty sequence.
pub fn tokenize(phrase: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();

    for word in split_words(phrase) {
        let term = strip_diacritics(&word.to_lowercase());
        if term.is_empty() {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }

    terms
}

fn split_words(phrase: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in phrase.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Decomposes to NFD and drops combining marks, leaving the base letters.
fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F
    )
}

/// Computes the prefix-expansion upper bound for a range-scan FTS fallback:
/// `term` with its last Unicode scalar value incremented by one code point.
/// A term ending in the maximum code point has no successor and yields
/// `None` (callers should treat that as an open-ended range).
pub fn prefix_successor(term: &str) -> Option<String> {
    let mut chars: Vec<char> = term.chars().collect();
    let last = chars.pop()?;
    let next = char::from_u32(last as u32 + 1)?;
    chars.push(next);
    Some(chars.into_iter().collect())
}
