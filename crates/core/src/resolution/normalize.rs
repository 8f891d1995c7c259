use std::collections::BTreeSet;

use strsim::jaro_winkler;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const LEGAL_SUFFIXES: &[&str] = &[
    "sa", "sas", "sasu", "sarl", "eurl", "sci", "snc", "scop", "inc", "corp", "corporation",
    "llc", "ltd", "limited", "plc", "gmbh", "ag", "bv", "nv", "co", "company", "cie", "et",
    "group", "groupe",
];

/// Folds a name for comparison: compatibility decomposition, accents and
/// punctuation removed, lowercase, legal-form tokens dropped. Dots are
/// removed rather than split on so `S.A.S.` folds to `sas`.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c) && *c != '.')
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();

    let tokens: Vec<&str> = folded.split_whitespace().collect();
    let kept: Vec<&str> =
        tokens.iter().copied().filter(|token| !LEGAL_SUFFIXES.contains(token)).collect();

    // A name made only of legal-form tokens keeps them.
    if kept.is_empty() {
        tokens.join(" ")
    } else {
        kept.join(" ")
    }
}

/// Similarity of two normalized names in `0.0..=1.0`.
pub fn name_similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    jaro_winkler(left, right).max(token_overlap(left, right))
}

/// Share of the smaller token set found in the larger one.
fn token_overlap(left: &str, right: &str) -> f64 {
    let left: BTreeSet<&str> = left.split_whitespace().collect();
    let right: BTreeSet<&str> = right.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / left.len().max(right.len()) as f64
}

/// Upper-cased reference with separators removed, for code containment checks.
pub fn compact_code(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_uppercase).collect()
}
