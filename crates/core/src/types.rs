//! Shared domain types for the cross-venue arbitrage engine.
//!
//! This module defines the core data structures used across the system:
//! venue identities, order books, canonical market mappings, detected
//! opportunities, and trade legs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Venue Identifiers
// =============================================================================

/// Identifies which venue a market, book, or order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// Venue A (bearer-token REST, no stream auth handshake).
    A,
    /// Venue B (keyed REST, post-open stream auth handshake).
    B,
}

impl Venue {
    /// Returns the other venue.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Returns the storage identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "venue_a",
            Self::B => "venue_b",
        }
    }

    /// Parses a storage identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "venue_a" => Some(Self::A),
            "venue_b" => Some(Self::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "Venue A"),
            Self::B => write!(f, "Venue B"),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Binary market outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The event resolves true.
    Yes,
    /// The event resolves false.
    No,
}

impl Outcome {
    /// Returns the complementary outcome.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    /// Parses a storage identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Order Book
// =============================================================================

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price in `[0, 1]` dollars per contract.
    pub price: Decimal,
    /// Available size at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Creates a new price level.
    #[must_use]
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Current order book snapshot for one venue market.
///
/// Bids are sorted by price descending, asks ascending. The snapshot is
/// replaced atomically on every update; no delta merging happens here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Buy orders, best (highest) price first.
    pub bids: Vec<PriceLevel>,
    /// Sell orders, best (lowest) price first.
    pub asks: Vec<PriceLevel>,
    /// Timestamp of the producing update.
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Creates an order book, sorting each side and dropping empty levels.
    #[must_use]
    pub fn new(
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        bids.retain(|l| l.size > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            bids,
            asks,
            timestamp,
        }
    }

    /// Creates an empty book.
    #[must_use]
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp,
        }
    }

    /// Returns the best bid price, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Returns the best ask price, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Returns the mid of best bid and best ask.
    ///
    /// `None` when either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid + ask) / Decimal::TWO)
    }

    /// Returns the summed size across both sides of the book.
    #[must_use]
    pub fn total_depth(&self) -> Decimal {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .map(|l| l.size)
            .sum()
    }

    /// Returns true when both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// =============================================================================
// Venue Markets
// =============================================================================

/// One binary outcome market listed on one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueMarket {
    /// Venue that lists the market.
    pub venue: Venue,
    /// The venue's opaque market identifier.
    pub venue_market_id: String,
    /// Market title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
}

impl VenueMarket {
    /// Creates a new venue market.
    #[must_use]
    pub fn new(venue: Venue, venue_market_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            venue,
            venue_market_id: venue_market_id.into(),
            title: title.into(),
            description: None,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// =============================================================================
// Canonical Markets
// =============================================================================

/// Confidence band for a canonical pairing, derived from similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchConfidence {
    /// Similarity at or above 0.95.
    High,
    /// Similarity at or above 0.85.
    Medium,
    /// Anything below 0.85.
    Low,
}

impl MatchConfidence {
    /// Bands a similarity score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            Self::High
        } else if score >= 0.85 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the storage identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parses a storage identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Identity cluster linking up to one market per venue under a stable id.
///
/// At least one venue market must be present, at most one per venue, and a
/// venue market id belongs to at most one canonical id at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMarket {
    /// Stable canonical identifier.
    pub canonical_id: String,
    /// Human-readable title.
    pub title: String,
    /// Venue A market id, if paired on that side.
    pub venue_a_market_id: Option<String>,
    /// Venue B market id, if paired on that side.
    pub venue_b_market_id: Option<String>,
    /// Composite similarity score in `[0, 1]`.
    pub similarity: f64,
    /// Confidence band for the pairing.
    pub confidence: MatchConfidence,
    /// When the pairing was first created.
    pub created_at: DateTime<Utc>,
    /// When the pairing was last refreshed.
    pub updated_at: DateTime<Utc>,
}

impl CanonicalMarket {
    /// Returns the market id on the given venue, if any.
    #[must_use]
    pub fn market_id_on(&self, venue: Venue) -> Option<&str> {
        match venue {
            Venue::A => self.venue_a_market_id.as_deref(),
            Venue::B => self.venue_b_market_id.as_deref(),
        }
    }

    /// Returns true when both venue sides are present.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.venue_a_market_id.is_some() && self.venue_b_market_id.is_some()
    }
}

// =============================================================================
// Arbitrage Opportunities
// =============================================================================

/// Lifecycle status of a detected opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    /// Emitted by the detector, not yet acted on.
    Detected,
    /// The coordinator has claimed it and legs are in flight.
    Executing,
    /// Both legs placed successfully.
    Executed,
    /// Failed, timed out, or explicitly cancelled.
    Expired,
}

impl OpportunityStatus {
    /// Returns the storage identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Expired => "expired",
        }
    }

    /// Parses a storage identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(Self::Detected),
            "executing" => Some(Self::Executing),
            "executed" => Some(Self::Executed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected pricing inefficiency for one canonical market at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    /// Unique opportunity id.
    pub id: Uuid,
    /// Canonical market the opportunity is on.
    pub canonical_id: String,

    /// Combined per-contract cost of the two chosen legs.
    pub combined_cost: Decimal,
    /// `1 - combined_cost`.
    pub profit_potential: Decimal,

    /// Venue A YES price at detection.
    pub venue_a_yes: Decimal,
    /// Venue A NO price at detection.
    pub venue_a_no: Decimal,
    /// Venue B YES price at detection.
    pub venue_b_yes: Decimal,
    /// Venue B NO price at detection.
    pub venue_b_no: Decimal,

    /// Outcome to buy on venue A.
    pub buy_side_a: Outcome,
    /// Outcome to buy on venue B.
    pub buy_side_b: Outcome,

    /// Depth-bounded liquidity on the venue A book.
    pub depth_a: Decimal,
    /// Depth-bounded liquidity on the venue B book.
    pub depth_b: Decimal,

    /// Recommended contracts per leg.
    pub recommended_size: Decimal,
    /// Estimated fees across both legs at the recommended size.
    pub estimated_fees: Decimal,
    /// Expected profit after fees at the recommended size.
    pub net_profit: Decimal,

    /// Lifecycle status.
    pub status: OpportunityStatus,
    /// When the detector emitted it.
    pub detected_at: DateTime<Utc>,
    /// Optional expiry deadline.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ArbitrageOpportunity {
    /// Returns the detection-time price for a leg.
    #[must_use]
    pub fn leg_price(&self, venue: Venue) -> Decimal {
        match venue {
            Venue::A => match self.buy_side_a {
                Outcome::Yes => self.venue_a_yes,
                Outcome::No => self.venue_a_no,
            },
            Venue::B => match self.buy_side_b {
                Outcome::Yes => self.venue_b_yes,
                Outcome::No => self.venue_b_no,
            },
        }
    }

    /// Returns the outcome to buy on a venue.
    #[must_use]
    pub fn leg_side(&self, venue: Venue) -> Outcome {
        match venue {
            Venue::A => self.buy_side_a,
            Venue::B => self.buy_side_b,
        }
    }

    /// Returns true while the opportunity can still be acted on.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let live = matches!(
            self.status,
            OpportunityStatus::Detected | OpportunityStatus::Executing
        );
        live && self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

// =============================================================================
// Trades
// =============================================================================

/// Lifecycle status of one execution leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// Order placed, fill not yet confirmed.
    Pending,
    /// Venue confirmed the fill.
    Filled,
    /// Cancelled, explicitly or by compensation.
    Cancelled,
    /// Rejected or irrecoverably failed.
    Failed,
}

impl TradeStatus {
    /// Returns the storage identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "filled" => Some(Self::Filled),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One leg of a two-leg execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade id.
    pub id: Uuid,
    /// Opportunity the leg belongs to, if any.
    pub opportunity_id: Option<Uuid>,
    /// Venue the order was placed on.
    pub venue: Venue,
    /// Venue market the order targets.
    pub venue_market_id: String,
    /// Outcome bought.
    pub side: Outcome,
    /// Contracts ordered.
    pub amount: Decimal,
    /// Limit price carried from detection.
    pub price: Decimal,
    /// Venue-assigned order id, once accepted.
    pub order_id: Option<String>,
    /// Lifecycle status.
    pub status: TradeStatus,
    /// When the venue confirmed the fill.
    pub executed_at: Option<DateTime<Utc>>,
    /// Error detail on failure or compensation.
    pub error_message: Option<String>,
}

impl Trade {
    /// Creates a pending leg for an opportunity.
    #[must_use]
    pub fn pending(
        opportunity_id: Uuid,
        venue: Venue,
        venue_market_id: impl Into<String>,
        side: Outcome,
        amount: Decimal,
        price: Decimal,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity_id: Some(opportunity_id),
            venue,
            venue_market_id: venue_market_id.into(),
            side,
            amount,
            price,
            order_id: Some(order_id.into()),
            status: TradeStatus::Pending,
            executed_at: None,
            error_message: None,
        }
    }

    /// Creates a failed leg that never reached the venue book.
    #[must_use]
    pub fn failed(
        opportunity_id: Uuid,
        venue: Venue,
        venue_market_id: impl Into<String>,
        side: Outcome,
        amount: Decimal,
        price: Decimal,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity_id: Some(opportunity_id),
            venue,
            venue_market_id: venue_market_id.into(),
            side,
            amount,
            price,
            order_id: None,
            status: TradeStatus::Failed,
            executed_at: None,
            error_message: Some(error.into()),
        }
    }
}

// =============================================================================
// Execution Reports
// =============================================================================

/// Outcome of a coordinator run for one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Opportunity that was executed.
    pub opportunity_id: Uuid,
    /// True when both legs were placed successfully.
    pub success: bool,
    /// Trade legs recorded for the attempt.
    pub trades: Vec<Trade>,
    /// Human-readable summary.
    pub message: String,
    /// When the attempt finished.
    pub completed_at: DateTime<Utc>,
}
