//! Address text normalization and fuzzy comparison.
//!
//! Cache keys are built from normalized text so that "R. Augusta, 1500" and
//! "rua augusta, 1500" land on the same entry.

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn abbreviation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(r|av|al|tr|nº|no)\b").expect("abbreviation pattern is valid")
    })
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\d+\b").expect("number pattern is valid"))
}

fn expand_abbreviation(word: &str) -> &'static str {
    match word {
        "r" => "rua",
        "av" => "avenida",
        "al" => "alameda",
        "tr" => "travessa",
        // number markers ("nº 12", "no 12") carry no information
        _ => "",
    }
}

/// Normalize a raw address into a cache key.
///
/// Lowercases, keeps only letters, digits, spaces and commas, expands
/// street-type abbreviations and collapses whitespace.
pub fn normalize_address(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == ',')
        .collect();

    let expanded = abbreviation_pattern()
        .replace_all(&stripped, |caps: &Captures| expand_abbreviation(&caps[1]));

    expanded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncated address for log lines.
pub(crate) fn log_preview(address: &str) -> String {
    address.chars().take(50).collect()
}

/// First standalone run of digits, usually the street number.
pub fn first_number_token(key: &str) -> Option<&str> {
    number_pattern().find(key).map(|m| m.as_str())
}

/// Character-based similarity in `[0, 1]`.
///
/// Ratcliff/Obershelp: `2·M / (|a| + |b|)` where `M` counts the characters
/// in the longest common block plus, recursively, the blocks to its left and
/// right.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut pending = vec![(0, a.len(), 0, b.len())];
    let mut total = 0;

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_common_block(a, b, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

/// Longest block common to `a[alo..ahi]` and `b[blo..bhi]`.
/// Ties resolve to the earliest block in `a`, then in `b`.
fn longest_common_block(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    let mut curr = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[col - 1] + 1;
                curr[col] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                curr[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_expands_abbreviations() {
        assert_eq!(normalize_address("R. Augusta, 1500"), "rua augusta, 1500");
        assert_eq!(normalize_address("Av. Paulista 1000"), "avenida paulista 1000");
        assert_eq!(normalize_address("Al. Santos, 45"), "alameda santos, 45");
        assert_eq!(normalize_address("Tr. das Flores 3"), "travessa das flores 3");
    }

    #[test]
    fn test_normalize_strips_punctuation_and_spaces() {
        assert_eq!(
            normalize_address("  Rua   Augusta,  nº 1.500 - Consolação!! "),
            "rua augusta, 1500 consolação"
        );
    }

    #[test]
    fn test_normalize_keeps_words_containing_abbreviations() {
        // "r" and "av" only expand as whole words
        assert_eq!(normalize_address("Rua Ravena 10"), "rua ravena 10");
        assert_eq!(normalize_address("Travessa Nova 8"), "travessa nova 8");
    }

    #[test]
    fn test_first_number_token() {
        assert_eq!(first_number_token("rua augusta, 1500 apto 12"), Some("1500"));
        assert_eq!(first_number_token("rua b2 100"), Some("100"));
        assert_eq!(first_number_token("avenida paulista"), None);
    }

    #[test]
    fn test_similarity_ratio_known_values() {
        assert_eq!(similarity_ratio("abcd", "bcde"), 0.75);
        assert_eq!(similarity_ratio("same", "same"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_similarity_ratio_near_duplicates() {
        let score = similarity_ratio("rua augusta, 1500 apto 12", "rua augusta 1500 apto 12");
        assert!(score > 0.95, "score was {score}");
        let score = similarity_ratio("rua augusta, 1500", "avenida paulista, 1500");
        assert!(score < 0.8, "score was {score}");
    }
}
