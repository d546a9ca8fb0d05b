//! String and feature similarity metrics for market pairing.
//!
//! The composite score is a weighted sum over four signals: Levenshtein
//! and Jaro-Winkler over normalized titles, Jaccard over token sets, and
//! a temporal window over extracted dates.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::normalize::NormalizedMarket;

/// Weight of the Levenshtein signal.
pub const WEIGHT_LEVENSHTEIN: f64 = 0.20;
/// Weight of the Jaro-Winkler signal.
pub const WEIGHT_JARO_WINKLER: f64 = 0.30;
/// Weight of the token-overlap signal.
pub const WEIGHT_JACCARD: f64 = 0.30;
/// Weight of the date signal.
pub const WEIGHT_DATE: f64 = 0.20;

/// Jaro-Winkler prefix boost factor.
const WINKLER_PREFIX_SCALE: f64 = 0.1;
/// Jaro-Winkler maximum boosted prefix length.
const WINKLER_PREFIX_LIMIT: usize = 4;

/// Classic edit distance over characters.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `1 - distance / max(len)`, with two empty strings scoring 1.0.
#[must_use]
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Jaro similarity over characters.
#[must_use]
pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, &ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && ca == b[j] {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for (i, &ca) in a.iter().enumerate() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[k] {
            k += 1;
        }
        if ca != b[k] {
            transpositions += 1;
        }
        k += 1;
    }
    let transpositions = transpositions as f64 / 2.0;

    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions) / m) / 3.0
}

/// Jaro-Winkler: Jaro boosted by up to four characters of common prefix.
#[must_use]
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let base = jaro(a, b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(WINKLER_PREFIX_LIMIT)
        .take_while(|(ca, cb)| ca == cb)
        .count();
    base + prefix as f64 * WINKLER_PREFIX_SCALE * (1.0 - base)
}

/// Token-set overlap; two empty sets score 1.0.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

/// Date-window similarity.
///
/// 1.0 when both sides are empty, 0.5 when exactly one side has no dates,
/// 1.0 when any cross-pair is within 24 hours, otherwise 0.0.
#[must_use]
pub fn date_similarity(a: &[DateTime<Utc>], b: &[DateTime<Utc>]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.5,
        (false, false) => {
            let within_day = a.iter().any(|da| {
                b.iter()
                    .any(|db| (*da - *db).num_seconds().abs() <= 24 * 60 * 60)
            });
            if within_day {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Weighted composite similarity in `[0, 1]`.
#[must_use]
pub fn composite(a: &NormalizedMarket, b: &NormalizedMarket) -> f64 {
    let score = WEIGHT_LEVENSHTEIN * levenshtein_similarity(&a.title, &b.title)
        + WEIGHT_JARO_WINKLER * jaro_winkler(&a.title, &b.title)
        + WEIGHT_JACCARD * jaccard(&a.tokens, &b.tokens)
        + WEIGHT_DATE * date_similarity(&a.dates, &b.dates);
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_market, DateExtractor};
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // ==================== Levenshtein Tests ====================

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_levenshtein_similarity_bounds() {
        assert_eq!(levenshtein_similarity("", ""), 1.0);
        assert_eq!(levenshtein_similarity("same", "same"), 1.0);
        assert_eq!(levenshtein_similarity("abc", "xyz"), 0.0);
        let partial = levenshtein_similarity("kitten", "sitting");
        assert!((partial - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    // ==================== Jaro / Jaro-Winkler Tests ====================

    #[test]
    fn test_jaro_identical_and_disjoint() {
        assert_eq!(jaro("martha", "martha"), 1.0);
        assert_eq!(jaro("abc", "xyz"), 0.0);
        assert_eq!(jaro("", ""), 1.0);
        assert_eq!(jaro("abc", ""), 0.0);
    }

    #[test]
    fn test_jaro_known_value() {
        // Classic reference pair: jaro("martha", "marhta") = 0.9444...
        let score = jaro("martha", "marhta");
        assert!((score - 17.0 / 18.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_jaro_winkler_prefix_boost() {
        let plain = jaro("martha", "marhta");
        let boosted = jaro_winkler("martha", "marhta");
        // Three common prefix chars: jw = jaro + 3 * 0.1 * (1 - jaro).
        assert!((boosted - (plain + 3.0 * 0.1 * (1.0 - plain))).abs() < 1e-9);
        assert!(boosted > plain);
    }

    #[test]
    fn test_jaro_winkler_prefix_capped_at_four() {
        let plain = jaro("abcdefgh", "abcdefxy");
        let boosted = jaro_winkler("abcdefgh", "abcdefxy");
        assert!((boosted - (plain + 4.0 * 0.1 * (1.0 - plain))).abs() < 1e-9);
    }

    // ==================== Jaccard Tests ====================

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_jaccard_overlap() {
        let a = set(&["will", "btc", "hit", "100k"]);
        let b = set(&["will", "bitcoin", "reach", "100k"]);
        // Intersection {will, 100k} = 2, union = 6.
        assert!((jaccard(&a, &b) - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_empty_sets() {
        assert_eq!(jaccard(&set(&[]), &set(&[])), 1.0);
        assert_eq!(jaccard(&set(&["x"]), &set(&[])), 0.0);
    }

    // ==================== Date Similarity Tests ====================

    #[test]
    fn test_date_similarity_both_empty() {
        assert_eq!(date_similarity(&[], &[]), 1.0);
    }

    #[test]
    fn test_date_similarity_one_empty() {
        let d = [utc(2024, 12, 31, 0, 0)];
        assert_eq!(date_similarity(&d, &[]), 0.5);
        assert_eq!(date_similarity(&[], &d), 0.5);
    }

    #[test]
    fn test_date_similarity_within_window() {
        // 23h59m apart: inside the 24h window.
        let a = [utc(2024, 12, 30, 0, 1)];
        let b = [utc(2024, 12, 31, 0, 0)];
        assert_eq!(date_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_date_similarity_outside_window() {
        // 24h01m apart: outside the window.
        let a = [utc(2024, 12, 29, 23, 59)];
        let b = [utc(2024, 12, 31, 0, 0)];
        assert_eq!(date_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_date_similarity_any_pair_suffices() {
        let a = [utc(2024, 1, 1, 0, 0), utc(2024, 12, 31, 0, 0)];
        let b = [utc(2024, 12, 31, 12, 0)];
        assert_eq!(date_similarity(&a, &b), 1.0);
    }

    // ==================== Composite Tests ====================

    fn normalized(title: &str, description: Option<&str>) -> NormalizedMarket {
        normalize_market(title, description, &DateExtractor::new())
    }

    #[test]
    fn test_composite_reflexive() {
        let market = normalized("Will BTC hit $100k by 12/31/2024?", None);
        assert!((composite(&market, &market) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_symmetric() {
        let a = normalized("Will BTC hit $100k by 12/31/2024?", None);
        let b = normalized("Will Bitcoin reach $100k in 2024?", None);
        assert!((composite(&a, &b) - composite(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn test_composite_in_unit_interval() {
        let a = normalized("Completely unrelated thing", None);
        let b = normalized("Will ETH flip BTC by June 30, 2025?", None);
        let score = composite(&a, &b);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_composite_near_identical_titles_score_high() {
        let a = normalized("Will BTC hit $100k by 12/31/2024?", None);
        let b = normalized("Will BTC hit $100k by December 31, 2024?", None);
        let score = composite(&a, &b);
        assert!(score >= 0.85, "expected >= 0.85, got {score}");
    }

    #[test]
    fn test_composite_unrelated_titles_score_low() {
        let a = normalized("Will BTC hit $100k by 12/31/2024?", None);
        let b = normalized("Super Bowl winner announced February 9, 2025", None);
        let score = composite(&a, &b);
        assert!(score < 0.5, "expected < 0.5, got {score}");
    }
}
