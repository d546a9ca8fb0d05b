//! Text normalization for market listings.
//!
//! Titles and descriptions are folded into a canonical lowercase form,
//! tokenized, and scanned for dates before any punctuation is stripped
//! (the date patterns depend on `/`, `-`, and `,`).

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::collections::BTreeSet;

/// A market listing reduced to comparable features.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMarket {
    /// Normalized title.
    pub title: String,
    /// Filtered tokens from title plus description.
    pub tokens: BTreeSet<String>,
    /// Dates found in title plus description, at UTC midnight.
    pub dates: Vec<DateTime<Utc>>,
}

/// Lowercases, replaces every non-alphanumeric character with a space,
/// collapses whitespace, and trims.
#[must_use]
pub fn normalize_text(s: &str) -> String {
    let lowered = s.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits normalized text into tokens, dropping tokens of length two or
/// less and purely numeric tokens.
#[must_use]
pub fn tokenize(normalized: &str) -> BTreeSet<String> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(ToString::to_string)
        .collect()
}

/// Date scanner over raw listing text.
#[derive(Debug)]
pub struct DateExtractor {
    slash: Regex,
    iso: Regex,
    month: Regex,
}

impl DateExtractor {
    /// Compiles the three recognized patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // MM/DD/YYYY
            slash: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("static pattern"),
            // YYYY-MM-DD
            iso: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static pattern"),
            // MonthAbbrev[a-z]* DD, YYYY
            month: Regex::new(
                r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(\d{1,2}),?\s+(\d{4})\b",
            )
            .expect("static pattern"),
        }
    }

    /// Scans `text` for dates; unparseable hits are discarded.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<DateTime<Utc>> {
        let mut dates = Vec::new();

        for caps in self.slash.captures_iter(text) {
            let parsed = (
                caps[1].parse::<u32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<i32>(),
            );
            if let (Ok(month), Ok(day), Ok(year)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    dates.push(midnight(date));
                }
            }
        }

        for caps in self.iso.captures_iter(text) {
            let parsed = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(year), Ok(month), Ok(day)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    dates.push(midnight(date));
                }
            }
        }

        for caps in self.month.captures_iter(text) {
            let month = month_number(&caps[1]);
            let parsed = (caps[2].parse::<u32>(), caps[3].parse::<i32>());
            if let (Some(month), (Ok(day), Ok(year))) = (month, parsed) {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    dates.push(midnight(date));
                }
            }
        }

        dates
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists"))
}

fn month_number(abbrev: &str) -> Option<u32> {
    match abbrev.to_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// Normalizes one listing: title for string metrics, title plus
/// description for tokens and dates.
#[must_use]
pub fn normalize_market(
    title: &str,
    description: Option<&str>,
    dates: &DateExtractor,
) -> NormalizedMarket {
    let full_text = match description {
        Some(desc) => format!("{title} {desc}"),
        None => title.to_string(),
    };
    NormalizedMarket {
        title: normalize_text(title),
        tokens: tokenize(&normalize_text(&full_text)),
        dates: dates.extract(&full_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    // ==================== Normalization Tests ====================

    #[test]
    fn test_normalize_lowercases_and_strips() {
        assert_eq!(
            normalize_text("Will BTC hit $100k by 12/31/2024?"),
            "will btc hit 100k by 12 31 2024"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  a   lot\t of---space  "), "a lot of space");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Will BTC hit $100k by 12/31/2024?",
            "  Mixed CASE & punctuation!!!  ",
            "",
            "já unicode ÅÄÖ",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_tokenize_drops_short_and_numeric() {
        let tokens = tokenize("will btc hit 100k by 12 31 2024");
        assert!(tokens.contains("will"));
        assert!(tokens.contains("btc"));
        assert!(tokens.contains("hit"));
        assert!(tokens.contains("100k"));
        // "by" is too short, "12"/"31"/"2024" are purely numeric.
        assert!(!tokens.contains("by"));
        assert!(!tokens.contains("2024"));
        assert_eq!(tokens.len(), 4);
    }

    // ==================== Date Extraction Tests ====================

    #[test]
    fn test_extract_slash_date() {
        let dates = DateExtractor::new().extract("settles 12/31/2024 at noon");
        assert_eq!(dates.len(), 1);
        assert_eq!((dates[0].year(), dates[0].month(), dates[0].day()), (2024, 12, 31));
    }

    #[test]
    fn test_extract_iso_date() {
        let dates = DateExtractor::new().extract("by 2024-12-31 end of day");
        assert_eq!(dates.len(), 1);
        assert_eq!((dates[0].year(), dates[0].month(), dates[0].day()), (2024, 12, 31));
    }

    #[test]
    fn test_extract_month_name_date() {
        let extractor = DateExtractor::new();

        let abbreviated = extractor.extract("resolves Dec 31, 2024");
        assert_eq!(abbreviated.len(), 1);
        assert_eq!(abbreviated[0].month(), 12);

        let full = extractor.extract("resolves December 31, 2024");
        assert_eq!(full.len(), 1);

        let lowercase = extractor.extract("resolves december 31 2024");
        assert_eq!(lowercase.len(), 1);
    }

    #[test]
    fn test_extract_discards_unparseable() {
        let extractor = DateExtractor::new();
        // Month 13 and day 45 do not exist.
        assert!(extractor.extract("13/45/2024").is_empty());
        assert!(extractor.extract("2024-02-30").is_empty());
        assert!(extractor.extract("Feb 30, 2024").is_empty());
    }

    #[test]
    fn test_extract_multiple_dates() {
        let dates = DateExtractor::new().extract("between 01/15/2025 and 2025-02-28");
        assert_eq!(dates.len(), 2);
    }

    #[test]
    fn test_extract_none() {
        assert!(DateExtractor::new().extract("no dates here in 2024").is_empty());
    }

    // ==================== normalize_market Tests ====================

    #[test]
    fn test_normalize_market_combines_description() {
        let extractor = DateExtractor::new();
        let market = normalize_market(
            "Will BTC hit $100k?",
            Some("Resolves YES on 12/31/2024 per index close."),
            &extractor,
        );

        assert_eq!(market.title, "will btc hit 100k");
        assert!(market.tokens.contains("resolves"));
        assert!(market.tokens.contains("index"));
        assert_eq!(market.dates.len(), 1);
    }

    #[test]
    fn test_normalize_market_title_only() {
        let extractor = DateExtractor::new();
        let market = normalize_market("ETH above $5,000 on 2025-06-30", None, &extractor);

        assert_eq!(market.title, "eth above 5 000 on 2025 06 30");
        assert_eq!(market.dates.len(), 1);
    }
}
