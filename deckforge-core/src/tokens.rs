//! Traceability Tokens
//!
//! A token is a number as it appears in text: digits with optional thousands
//! separators and decimals, optionally suffixed by `%`, `K` or `M`.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:%|[KM]\b)?")
            .expect("token pattern is a valid regex")
    })
}

/// Extract numeric tokens in order of appearance.
pub fn extract_tokens(text: &str) -> Vec<&str> {
    token_pattern().find_iter(text).map(|m| m.as_str()).collect()
}

pub fn contains_token(text: &str) -> bool {
    token_pattern().is_match(text)
}

/// Tokens in `text` that are not in `declared`, deduplicated, first-seen order.
pub fn untracked_tokens<'a, S: AsRef<str>>(text: &'a str, declared: &[S]) -> Vec<&'a str> {
    let declared: BTreeSet<&str> = declared.iter().map(|s| s.as_ref().trim()).collect();
    let mut seen = BTreeSet::new();
    extract_tokens(text)
        .into_iter()
        .filter(|t| !declared.contains(t) && seen.insert(*t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_and_suffixes() {
        assert_eq!(
            extract_tokens("134 users from 1,275 total (11%)"),
            vec!["134", "1,275", "11%"]
        );
        assert_eq!(extract_tokens("87.5K sessions, $2M spend"), vec!["87.5K", "2M"]);
    }

    #[test]
    fn test_digits_glued_to_letters() {
        assert!(extract_tokens("Q1 targets for FY").is_empty());
        assert_eq!(extract_tokens("5Mbps"), vec!["5"]);
    }

    #[test]
    fn test_untracked_dedup() {
        let declared = ["134"];
        assert_eq!(
            untracked_tokens("134 of 1,275 (11%) - 11% again", &declared),
            vec!["1,275", "11%"]
        );
    }

    #[test]
    fn test_no_tokens() {
        assert!(!contains_token("Data not available for this page"));
        assert!(contains_token("Only 4% adopted"));
    }
}
