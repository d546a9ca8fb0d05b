//! Cross-venue arbitrage detection.
//!
//! The detector consumes order-book events from both venue clients, fuses
//! the latest book per venue under the canonical market id, and evaluates
//! the two complementary legs on every update. Fusion is last-write-wins:
//! only the newest book per venue is retained, so a slow consumer coalesces
//! updates instead of queueing them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use dutchbook_core::{
    ArbitrageOpportunity, CanonicalMarket, Config, EngineEvent, EventBus, OpportunityStatus,
    OpportunityStore, OrderBook, Outcome, Venue,
};
use dutchbook_venues::{VenueClient, VenueEvent};

// =============================================================================
// Configuration
// =============================================================================

/// Detector thresholds and fee rates.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// An opportunity requires `combined_cost < arb_threshold`.
    pub arb_threshold: Decimal,
    /// Minimum depth on each leg.
    pub min_liquidity: Decimal,
    /// Hard cap on recommended size.
    pub max_position_size: Decimal,
    /// Venue A fee rate.
    pub venue_a_fee_rate: Decimal,
    /// Venue B fee rate.
    pub venue_b_fee_rate: Decimal,
    /// Minimum combined-cost change to re-emit within the interval.
    pub min_cost_delta: Decimal,
    /// Re-emission interval for unchanged costs.
    pub min_emit_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            arb_threshold: dec!(0.98),
            min_liquidity: dec!(1000),
            max_position_size: dec!(10000),
            venue_a_fee_rate: dec!(0.02),
            venue_b_fee_rate: dec!(0.02),
            min_cost_delta: dec!(0.0005),
            min_emit_interval: Duration::from_secs(1),
        }
    }
}

impl DetectorConfig {
    /// Derives detector thresholds from the process configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            arb_threshold: config.arb_threshold,
            min_liquidity: config.min_liquidity,
            max_position_size: config.max_position_size,
            venue_a_fee_rate: config.venue_a_fee_rate,
            venue_b_fee_rate: config.venue_b_fee_rate,
            ..Self::default()
        }
    }
}

// =============================================================================
// Canonical Index
// =============================================================================

/// Read-optimized index from venue market ids to canonical ids.
///
/// Rebuilt wholesale by the resolver after each sync and swapped in
/// atomically; it is never mutated in place.
#[derive(Debug, Default)]
pub struct MappingIndex {
    by_venue_a: HashMap<String, String>,
    by_venue_b: HashMap<String, String>,
}

impl MappingIndex {
    /// Builds the index from stored mappings.
    #[must_use]
    pub fn build(mappings: &[CanonicalMarket]) -> Self {
        let mut index = Self::default();
        for mapping in mappings {
            if let Some(id) = &mapping.venue_a_market_id {
                index
                    .by_venue_a
                    .insert(id.clone(), mapping.canonical_id.clone());
            }
            if let Some(id) = &mapping.venue_b_market_id {
                index
                    .by_venue_b
                    .insert(id.clone(), mapping.canonical_id.clone());
            }
        }
        index
    }

    /// Resolves a venue market id to its canonical id.
    #[must_use]
    pub fn canonical_for(&self, venue: Venue, venue_market_id: &str) -> Option<&String> {
        match venue {
            Venue::A => self.by_venue_a.get(venue_market_id),
            Venue::B => self.by_venue_b.get(venue_market_id),
        }
    }

    /// Number of indexed venue market ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_venue_a.len() + self.by_venue_b.len()
    }

    /// True when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_venue_a.is_empty() && self.by_venue_b.is_empty()
    }
}

/// Shared handle to the current index; writers replace the inner `Arc`.
pub type SharedMappingIndex = Arc<RwLock<Arc<MappingIndex>>>;

/// Creates an empty shared index.
#[must_use]
pub fn shared_index() -> SharedMappingIndex {
    Arc::new(RwLock::new(Arc::new(MappingIndex::default())))
}

/// Replaces the shared index with one built from `mappings`.
pub fn install_mappings(index: &SharedMappingIndex, mappings: &[CanonicalMarket]) {
    let rebuilt = Arc::new(MappingIndex::build(mappings));
    *index.write() = rebuilt;
}

// =============================================================================
// Detector
// =============================================================================

#[derive(Debug, Default)]
struct FusedBooks {
    venue_a: Option<OrderBook>,
    venue_b: Option<OrderBook>,
}

/// Hot-path detector fusing both venues' books per canonical market.
pub struct ArbitrageDetector {
    config: DetectorConfig,
    index: SharedMappingIndex,
    fused: HashMap<String, FusedBooks>,
    last_emission: HashMap<String, (Decimal, Instant)>,
    opportunities: Arc<dyn OpportunityStore>,
    bus: EventBus,
}

impl ArbitrageDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(
        config: DetectorConfig,
        index: SharedMappingIndex,
        opportunities: Arc<dyn OpportunityStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            index,
            fused: HashMap::new(),
            last_emission: HashMap::new(),
            opportunities,
            bus,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// On start, subscribe both venue clients to every mapped market.
    pub async fn bootstrap_subscriptions(
        mappings: &[CanonicalMarket],
        client_a: &VenueClient,
        client_b: &VenueClient,
    ) {
        for mapping in mappings {
            if let Some(id) = &mapping.venue_a_market_id {
                client_a.subscribe(id).await;
            }
            if let Some(id) = &mapping.venue_b_market_id {
                client_b.subscribe(id).await;
            }
        }
        info!(
            mappings = mappings.len(),
            "bootstrapped venue subscriptions from stored mappings"
        );
    }

    /// Handles one book update: resolve, fuse, evaluate, emit.
    ///
    /// Returns the emitted opportunity, if any survived the thresholds and
    /// duplicate suppression.
    pub async fn on_book(
        &mut self,
        venue: Venue,
        venue_market_id: &str,
        book: OrderBook,
    ) -> Option<ArbitrageOpportunity> {
        let canonical_id = {
            let index = self.index.read();
            index.canonical_for(venue, venue_market_id).cloned()
        };
        let Some(canonical_id) = canonical_id else {
            trace!(venue = %venue, market_id = venue_market_id, "book for unmapped market ignored");
            return None;
        };

        let fused = self.fused.entry(canonical_id.clone()).or_default();
        match venue {
            Venue::A => fused.venue_a = Some(book),
            Venue::B => fused.venue_b = Some(book),
        }
        let (book_a, book_b) = match (&fused.venue_a, &fused.venue_b) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => return None,
        };

        let opportunity = self.evaluate(&canonical_id, &book_a, &book_b)?;

        let now = Instant::now();
        if !self.should_emit(&canonical_id, opportunity.combined_cost, now) {
            trace!(canonical_id = %canonical_id, "duplicate opportunity suppressed");
            return None;
        }

        // A persistence failure loses this emission but corrupts nothing;
        // the detector keeps consuming.
        if let Err(e) = self.opportunities.insert(&opportunity).await {
            warn!(
                canonical_id = %canonical_id,
                error = %e,
                "failed to persist opportunity, dropping emission"
            );
            return None;
        }

        self.last_emission
            .insert(canonical_id.clone(), (opportunity.combined_cost, now));
        info!(
            canonical_id = %canonical_id,
            combined_cost = %opportunity.combined_cost,
            recommended_size = %opportunity.recommended_size,
            net_profit = %opportunity.net_profit,
            buy_side_a = %opportunity.buy_side_a,
            buy_side_b = %opportunity.buy_side_b,
            "arbitrage opportunity detected"
        );
        self.bus
            .publish(EngineEvent::OpportunityDetected(opportunity.clone()));
        Some(opportunity)
    }

    /// Evaluates the two complementary legs over the fused books.
    ///
    /// YES is priced at the mid of best bid and ask; NO is derived by
    /// complementarity (`1 - YES`). Depth is the summed size across both
    /// sides of each venue's book.
    #[must_use]
    pub fn evaluate(
        &self,
        canonical_id: &str,
        book_a: &OrderBook,
        book_b: &OrderBook,
    ) -> Option<ArbitrageOpportunity> {
        let yes_a = book_a.mid_price()?;
        let yes_b = book_b.mid_price()?;
        let no_a = Decimal::ONE - yes_a;
        let no_b = Decimal::ONE - yes_b;
        let depth_a = book_a.total_depth();
        let depth_b = book_b.total_depth();

        // Leg 1: YES on A + NO on B. Leg 2: NO on A + YES on B.
        let leg1 = yes_a + no_b;
        let leg2 = no_a + yes_b;
        let (combined_cost, buy_side_a, buy_side_b) = if leg1 <= leg2 {
            (leg1, Outcome::Yes, Outcome::No)
        } else {
            (leg2, Outcome::No, Outcome::Yes)
        };

        if combined_cost >= self.config.arb_threshold {
            trace!(
                canonical_id,
                combined_cost = %combined_cost,
                threshold = %self.config.arb_threshold,
                "no arbitrage at current prices"
            );
            return None;
        }

        let recommended_size = depth_a.min(depth_b).min(self.config.max_position_size);
        if recommended_size < self.config.min_liquidity {
            debug!(
                canonical_id,
                recommended_size = %recommended_size,
                min_liquidity = %self.config.min_liquidity,
                "insufficient liquidity, suppressing opportunity"
            );
            return None;
        }

        let estimated_fees =
            recommended_size * (self.config.venue_a_fee_rate + self.config.venue_b_fee_rate);
        let gross_profit = recommended_size * (Decimal::ONE - combined_cost);
        let net_profit = gross_profit - estimated_fees;
        if net_profit <= Decimal::ZERO {
            debug!(
                canonical_id,
                gross_profit = %gross_profit,
                estimated_fees = %estimated_fees,
                "fees consume the edge, suppressing opportunity"
            );
            return None;
        }

        Some(ArbitrageOpportunity {
            id: Uuid::new_v4(),
            canonical_id: canonical_id.to_string(),
            combined_cost,
            profit_potential: Decimal::ONE - combined_cost,
            venue_a_yes: yes_a,
            venue_a_no: no_a,
            venue_b_yes: yes_b,
            venue_b_no: no_b,
            buy_side_a,
            buy_side_b,
            depth_a,
            depth_b,
            recommended_size,
            estimated_fees,
            net_profit,
            status: OpportunityStatus::Detected,
            detected_at: Utc::now(),
            expires_at: None,
        })
    }

    fn should_emit(&self, canonical_id: &str, combined_cost: Decimal, now: Instant) -> bool {
        match self.last_emission.get(canonical_id) {
            None => true,
            Some(&(previous_cost, emitted_at)) => {
                (combined_cost - previous_cost).abs() > self.config.min_cost_delta
                    || now.duration_since(emitted_at) > self.config.min_emit_interval
            }
        }
    }

    /// Consumes venue events until shutdown.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<VenueEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("detector stopping");
                        return;
                    }
                }
                event = events.recv() => match event {
                    Some(VenueEvent::OrderBook { venue, market_id, book }) => {
                        self.on_book(venue, &market_id, book).await;
                    }
                    Some(VenueEvent::Connected { venue }) => {
                        debug!(venue = %venue, "venue stream connected");
                    }
                    Some(VenueEvent::Disconnected { venue, reason }) => {
                        warn!(venue = %venue, reason = %reason, "venue stream disconnected");
                    }
                    Some(VenueEvent::Error { venue, kind, detail }) => {
                        warn!(venue = %venue, kind = ?kind, detail = %detail, "venue stream error");
                    }
                    None => {
                        info!("venue event channel closed, detector stopping");
                        return;
                    }
                },
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
