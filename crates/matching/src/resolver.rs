//! Cross-venue market identity resolution.
//!
//! On each market-sync the resolver pulls current listings from both
//! venues, pairs them greedily by composite similarity, and upserts the
//! resulting canonical mappings. Pairing is one-to-one: a venue B market
//! claimed by one venue A market leaves the candidate pool.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use dutchbook_core::{
    CanonicalMarket, MappingStore, MatchConfidence, OrderApi, StoreError, Venue, VenueMarket,
};

use crate::normalize::{normalize_market, normalize_text, DateExtractor, NormalizedMarket};
use crate::similarity::composite;

/// Errors raised by a market-sync run.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A venue's market listing could not be fetched; prior mappings
    /// remain in effect.
    #[error("{venue} market listing unavailable: {message}")]
    VenueUnavailable {
        /// Venue that failed.
        venue: Venue,
        /// Underlying failure.
        message: String,
    },

    /// Mapping persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolver configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Minimum composite similarity to admit a pair.
    pub similarity_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
        }
    }
}

/// A matched cross-venue pair with its composite score.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    /// Venue A listing.
    pub venue_a: VenueMarket,
    /// Venue B listing.
    pub venue_b: VenueMarket,
    /// Composite similarity in `[0, 1]`.
    pub score: f64,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Listings fetched from venue A.
    pub venue_a_markets: usize,
    /// Listings fetched from venue B.
    pub venue_b_markets: usize,
    /// Pairs admitted at the similarity threshold.
    pub matched: usize,
    /// Mappings created under a freshly minted canonical id.
    pub created: usize,
    /// Mappings refreshed under an existing canonical id.
    pub updated: usize,
}

/// Pairs venue listings into canonical markets.
#[derive(Debug)]
pub struct MarketResolver {
    config: ResolverConfig,
    dates: DateExtractor,
}

impl MarketResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            dates: DateExtractor::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn normalize(&self, market: &VenueMarket) -> NormalizedMarket {
        normalize_market(&market.title, market.description.as_deref(), &self.dates)
    }

    /// Greedy one-to-one pairing: for each venue A market, the single
    /// highest-scoring unmatched venue B market at or above the threshold
    /// wins (first maximum on ties).
    #[must_use]
    pub fn pair_markets(
        &self,
        venue_a: &[VenueMarket],
        venue_b: &[VenueMarket],
    ) -> Vec<MatchCandidate> {
        let normalized_b: Vec<NormalizedMarket> =
            venue_b.iter().map(|m| self.normalize(m)).collect();
        let mut unclaimed: Vec<bool> = vec![true; venue_b.len()];
        let mut pairs = Vec::new();

        for market_a in venue_a {
            let normalized_a = self.normalize(market_a);
            let mut best: Option<(usize, f64)> = None;

            for (j, normalized) in normalized_b.iter().enumerate() {
                if !unclaimed[j] {
                    continue;
                }
                let score = composite(&normalized_a, normalized);
                if score < self.config.similarity_threshold {
                    continue;
                }
                // Strict > keeps the first maximum encountered on ties.
                if best.map_or(true, |(_, current)| score > current) {
                    best = Some((j, score));
                }
            }

            if let Some((j, score)) = best {
                unclaimed[j] = false;
                debug!(
                    venue_a_market = %market_a.venue_market_id,
                    venue_b_market = %venue_b[j].venue_market_id,
                    score,
                    "paired cross-venue markets"
                );
                pairs.push(MatchCandidate {
                    venue_a: market_a.clone(),
                    venue_b: venue_b[j].clone(),
                    score,
                });
            }
        }

        pairs
    }

    /// Derives a canonical id from the shorter normalized title: slugified,
    /// capped at 50 characters, suffixed with the mint time for collision
    /// breaking.
    #[must_use]
    pub fn canonical_id_for(
        &self,
        venue_a: &VenueMarket,
        venue_b: &VenueMarket,
        minted_at: DateTime<Utc>,
    ) -> String {
        let title_a = normalize_text(&venue_a.title);
        let title_b = normalize_text(&venue_b.title);
        let shorter = if title_a.len() <= title_b.len() {
            &title_a
        } else {
            &title_b
        };
        let slug: String = shorter.replace(' ', "-").chars().take(50).collect();
        format!("{slug}-{}", minted_at.timestamp_millis())
    }

    /// Runs one market sync: fetch listings, pair, persist.
    ///
    /// A pair whose venue market id is already mapped keeps its existing
    /// canonical id; otherwise a fresh id is minted.
    ///
    /// # Errors
    /// Returns [`MatchError::VenueUnavailable`] when either listing fetch
    /// fails (prior mappings stay in effect) and [`MatchError::Store`] when
    /// persistence fails.
    pub async fn sync(
        &self,
        api_a: &dyn OrderApi,
        api_b: &dyn OrderApi,
        store: &dyn MappingStore,
    ) -> Result<SyncReport, MatchError> {
        let listings_a =
            api_a
                .list_markets()
                .await
                .map_err(|e| MatchError::VenueUnavailable {
                    venue: Venue::A,
                    message: e.to_string(),
                })?;
        let listings_b =
            api_b
                .list_markets()
                .await
                .map_err(|e| MatchError::VenueUnavailable {
                    venue: Venue::B,
                    message: e.to_string(),
                })?;

        let pairs = self.pair_markets(&listings_a, &listings_b);
        let mut report = SyncReport {
            venue_a_markets: listings_a.len(),
            venue_b_markets: listings_b.len(),
            matched: pairs.len(),
            ..SyncReport::default()
        };

        for pair in &pairs {
            let existing = match store
                .find_by_venue_market(Venue::A, &pair.venue_a.venue_market_id)
                .await?
            {
                Some(mapping) => Some(mapping),
                None => {
                    store
                        .find_by_venue_market(Venue::B, &pair.venue_b.venue_market_id)
                        .await?
                }
            };

            let now = Utc::now();
            let (canonical_id, created_at, is_new) = match existing {
                Some(mapping) => (mapping.canonical_id, mapping.created_at, false),
                None => (
                    self.canonical_id_for(&pair.venue_a, &pair.venue_b, now),
                    now,
                    true,
                ),
            };

            let title_a = normalize_text(&pair.venue_a.title);
            let title_b = normalize_text(&pair.venue_b.title);
            let title = if title_a.len() <= title_b.len() {
                pair.venue_a.title.clone()
            } else {
                pair.venue_b.title.clone()
            };

            let mapping = CanonicalMarket {
                canonical_id,
                title,
                venue_a_market_id: Some(pair.venue_a.venue_market_id.clone()),
                venue_b_market_id: Some(pair.venue_b.venue_market_id.clone()),
                similarity: pair.score,
                confidence: MatchConfidence::from_score(pair.score),
                created_at,
                updated_at: now,
            };

            if let Err(e) = store.upsert(&mapping).await {
                warn!(canonical_id = %mapping.canonical_id, error = %e, "mapping upsert failed");
                return Err(e.into());
            }
            if is_new {
                report.created += 1;
            } else {
                report.updated += 1;
            }
        }

        info!(
            venue_a = report.venue_a_markets,
            venue_b = report.venue_b_markets,
            matched = report.matched,
            created = report.created,
            updated = report.updated,
            "market sync complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use dutchbook_core::{OrderAck, OrderState, OrderTicket, StoreResult, TradingError};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn market(venue: Venue, id: &str, title: &str) -> VenueMarket {
        VenueMarket::new(venue, id, title)
    }

    fn resolver() -> MarketResolver {
        MarketResolver::new(ResolverConfig::default())
    }

    // ==================== Pairing Tests ====================

    #[test]
    fn test_pairs_equivalent_markets() {
        let a = vec![market(
            Venue::A,
            "a1",
            "Will BTC hit $100k by 12/31/2024?",
        )];
        let b = vec![
            market(Venue::B, "b0", "Super Bowl winner announced February 9, 2025"),
            market(Venue::B, "b1", "Will BTC hit $100k by December 31, 2024?"),
        ];

        let pairs = resolver().pair_markets(&a, &b);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].venue_a.venue_market_id, "a1");
        assert_eq!(pairs[0].venue_b.venue_market_id, "b1");
        assert!(pairs[0].score >= 0.85);
    }

    #[test]
    fn test_below_threshold_markets_stay_unpaired() {
        let a = vec![market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?")];
        let b = vec![market(
            Venue::B,
            "b1",
            "Super Bowl winner announced February 9, 2025",
        )];

        assert!(resolver().pair_markets(&a, &b).is_empty());
    }

    #[test]
    fn test_greedy_matching_is_one_to_one() {
        // Two identical venue A listings compete for one venue B market;
        // only the first can claim it.
        let a = vec![
            market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?"),
            market(Venue::A, "a2", "Will BTC hit $100k by 12/31/2024?"),
        ];
        let b = vec![market(
            Venue::B,
            "b1",
            "Will BTC hit $100k by December 31, 2024?",
        )];

        let pairs = resolver().pair_markets(&a, &b);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].venue_a.venue_market_id, "a1");
    }

    #[test]
    fn test_tie_break_keeps_first_maximum() {
        // Identical venue B candidates produce identical scores; the first
        // encountered must win.
        let a = vec![market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?")];
        let b = vec![
            market(Venue::B, "b1", "Will BTC hit $100k by December 31, 2024?"),
            market(Venue::B, "b2", "Will BTC hit $100k by December 31, 2024?"),
        ];

        let pairs = resolver().pair_markets(&a, &b);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].venue_b.venue_market_id, "b1");
    }

    // ==================== Canonical Id Tests ====================

    #[test]
    fn test_canonical_id_uses_shorter_side_slug() {
        let a = market(Venue::A, "a1", "BTC $100k?");
        let b = market(Venue::B, "b1", "Will Bitcoin reach one hundred thousand dollars?");
        let minted = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();

        let id = resolver().canonical_id_for(&a, &b, minted);
        assert!(id.starts_with("btc-100k-"));
        assert!(id.ends_with(&minted.timestamp_millis().to_string()));
    }

    #[test]
    fn test_canonical_id_slug_capped_at_fifty() {
        let long = "a very long market title that keeps going and going and going well past fifty characters";
        let a = market(Venue::A, "a1", long);
        let b = market(Venue::B, "b1", long);
        let minted = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();

        let id = resolver().canonical_id_for(&a, &b, minted);
        let slug = id.rsplit_once('-').unwrap().0;
        assert!(slug.chars().count() <= 50, "slug too long: {slug}");
    }

    // ==================== Sync Tests ====================

    struct StubOrderApi {
        venue: Venue,
        markets: Result<Vec<VenueMarket>, String>,
    }

    #[async_trait]
    impl dutchbook_core::OrderApi for StubOrderApi {
        fn venue(&self) -> Venue {
            self.venue
        }

        async fn place_order(&self, _ticket: &OrderTicket) -> Result<OrderAck, TradingError> {
            unimplemented!("not used by resolver tests")
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<(), TradingError> {
            unimplemented!("not used by resolver tests")
        }

        async fn order_status(&self, _order_id: &str) -> Result<OrderState, TradingError> {
            unimplemented!("not used by resolver tests")
        }

        async fn list_markets(&self) -> Result<Vec<VenueMarket>, TradingError> {
            self.markets
                .clone()
                .map_err(|m| TradingError::Network(m))
        }
    }

    #[derive(Default)]
    struct StubMappingStore {
        mappings: Arc<Mutex<HashMap<String, CanonicalMarket>>>,
    }

    #[async_trait]
    impl MappingStore for StubMappingStore {
        async fn upsert(&self, mapping: &CanonicalMarket) -> StoreResult<()> {
            let mut guard = self.mappings.lock();
            match guard.get_mut(&mapping.canonical_id) {
                Some(existing) => {
                    existing.venue_a_market_id = mapping.venue_a_market_id.clone();
                    existing.venue_b_market_id = mapping.venue_b_market_id.clone();
                    existing.similarity = mapping.similarity;
                    existing.confidence = mapping.confidence;
                    existing.updated_at = mapping.updated_at;
                    if existing.title.is_empty() {
                        existing.title = mapping.title.clone();
                    }
                }
                None => {
                    guard.insert(mapping.canonical_id.clone(), mapping.clone());
                }
            }
            Ok(())
        }

        async fn all(&self) -> StoreResult<Vec<CanonicalMarket>> {
            Ok(self.mappings.lock().values().cloned().collect())
        }

        async fn find_by_canonical(
            &self,
            canonical_id: &str,
        ) -> StoreResult<Option<CanonicalMarket>> {
            Ok(self.mappings.lock().get(canonical_id).cloned())
        }

        async fn find_by_venue_market(
            &self,
            venue: Venue,
            venue_market_id: &str,
        ) -> StoreResult<Option<CanonicalMarket>> {
            Ok(self
                .mappings
                .lock()
                .values()
                .find(|m| m.market_id_on(venue) == Some(venue_market_id))
                .cloned())
        }
    }

    fn api(venue: Venue, markets: Vec<VenueMarket>) -> StubOrderApi {
        StubOrderApi {
            venue,
            markets: Ok(markets),
        }
    }

    #[tokio::test]
    async fn test_sync_creates_mapping() {
        let api_a = api(
            Venue::A,
            vec![market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?")],
        );
        let api_b = api(
            Venue::B,
            vec![market(
                Venue::B,
                "b1",
                "Will BTC hit $100k by December 31, 2024?",
            )],
        );
        let store = StubMappingStore::default();

        let report = resolver().sync(&api_a, &api_b, &store).await.unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);

        let stored = store.all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].venue_a_market_id.as_deref(), Some("a1"));
        assert_eq!(stored[0].venue_b_market_id.as_deref(), Some("b1"));
        assert!(stored[0].is_paired());
    }

    #[tokio::test]
    async fn test_sync_reuses_existing_canonical_id() {
        let listing_a = market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?");
        let listing_b = market(Venue::B, "b1", "Will BTC hit $100k by December 31, 2024?");
        let api_a = api(Venue::A, vec![listing_a.clone()]);
        let api_b = api(Venue::B, vec![listing_b.clone()]);
        let store = StubMappingStore::default();

        let first = resolver().sync(&api_a, &api_b, &store).await.unwrap();
        assert_eq!(first.created, 1);
        let original = store.all().await.unwrap().remove(0);
        let original_id = original.canonical_id.clone();
        let original_created_at = original.created_at;

        let second = resolver().sync(&api_a, &api_b, &store).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);

        let stored = store.all().await.unwrap();
        assert_eq!(stored.len(), 1, "re-sync must not mint a second mapping");
        assert_eq!(stored[0].canonical_id, original_id);
        assert_eq!(
            stored[0].created_at, original_created_at,
            "re-sync must keep the original creation time"
        );
    }

    #[tokio::test]
    async fn test_sync_fails_when_listing_unavailable() {
        let api_a = StubOrderApi {
            venue: Venue::A,
            markets: Err("connect refused".to_string()),
        };
        let api_b = api(Venue::B, Vec::new());
        let store = StubMappingStore::default();

        let err = resolver().sync(&api_a, &api_b, &store).await.unwrap_err();
        assert!(matches!(
            err,
            MatchError::VenueUnavailable { venue: Venue::A, .. }
        ));
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_confidence_banding() {
        let api_a = api(
            Venue::A,
            vec![market(Venue::A, "a1", "Will BTC hit $100k by 12/31/2024?")],
        );
        let api_b = api(
            Venue::B,
            vec![market(
                Venue::B,
                "b1",
                "Will BTC hit $100k by 12/31/2024?",
            )],
        );
        let store = StubMappingStore::default();

        resolver().sync(&api_a, &api_b, &store).await.unwrap();
        let stored = store.all().await.unwrap();
        // Identical listings must land in the high band.
        assert_eq!(stored[0].confidence, MatchConfidence::High);
    }
}
