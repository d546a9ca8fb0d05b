//! Market identity resolution across venues.
//!
//! Two venues describe the same underlying event with different titles and
//! identifiers. This crate clusters their listings under canonical ids
//! using fuzzy text features (Levenshtein, Jaro-Winkler, token overlap)
//! and extracted dates, then persists the pairings for the detector's
//! canonical index. Runs on the periodic market-sync trigger, off the hot
//! path.

pub mod normalize;
pub mod resolver;
pub mod similarity;

pub use normalize::{normalize_market, normalize_text, tokenize, DateExtractor, NormalizedMarket};
pub use resolver::{MarketResolver, MatchCandidate, MatchError, ResolverConfig, SyncReport};
pub use similarity::{
    composite, date_similarity, jaccard, jaro, jaro_winkler, levenshtein, levenshtein_similarity,
};
