//! Async seams between the pipeline and its collaborators.
//!
//! Storage ports are implemented by the Postgres repositories (and an
//! in-memory twin used in tests); the order port is implemented by the
//! per-venue REST adapters and by mocks in coordinator tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{
    ArbitrageOpportunity, CanonicalMarket, OpportunityStatus, Outcome, Trade, TradeStatus, Venue,
    VenueMarket,
};

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or state constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Storage Ports
// =============================================================================

/// Persistence for canonical market mappings.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Inserts the mapping, or updates venue ids and similarity when the
    /// canonical id already exists. A stored title is only replaced when
    /// it is empty.
    async fn upsert(&self, mapping: &CanonicalMarket) -> StoreResult<()>;

    /// Returns every stored mapping.
    async fn all(&self) -> StoreResult<Vec<CanonicalMarket>>;

    /// Looks up a mapping by canonical id.
    async fn find_by_canonical(&self, canonical_id: &str) -> StoreResult<Option<CanonicalMarket>>;

    /// Looks up the mapping that owns a venue market id, if any.
    async fn find_by_venue_market(
        &self,
        venue: Venue,
        venue_market_id: &str,
    ) -> StoreResult<Option<CanonicalMarket>>;
}

/// Persistence for detected opportunities.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Inserts a freshly detected opportunity.
    async fn insert(&self, opportunity: &ArbitrageOpportunity) -> StoreResult<()>;

    /// Fetches one opportunity.
    async fn get(&self, id: Uuid) -> StoreResult<Option<ArbitrageOpportunity>>;

    /// Returns recent opportunities, newest first.
    async fn recent(&self, limit: i64) -> StoreResult<Vec<ArbitrageOpportunity>>;

    /// Returns opportunities in `detected` or `executing`, not expired.
    async fn active(&self) -> StoreResult<Vec<ArbitrageOpportunity>>;

    /// Atomically moves `detected → executing`.
    ///
    /// Returns false when the opportunity was not in `detected`, which is
    /// the coordinator's write guard against concurrent executions.
    async fn begin_execution(&self, id: Uuid) -> StoreResult<bool>;

    /// Sets a terminal or recovered status.
    async fn set_status(&self, id: Uuid, status: OpportunityStatus) -> StoreResult<()>;
}

/// Persistence for trade legs.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Inserts a trade leg.
    async fn insert(&self, trade: &Trade) -> StoreResult<()>;

    /// Returns recent trades, newest first.
    async fn recent(&self, limit: i64) -> StoreResult<Vec<Trade>>;

    /// Returns every leg recorded for an opportunity.
    async fn for_opportunity(&self, opportunity_id: Uuid) -> StoreResult<Vec<Trade>>;

    /// Updates a leg's status, optionally recording an error and fill time.
    async fn update_status(
        &self,
        id: Uuid,
        status: TradeStatus,
        executed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> StoreResult<()>;
}

// =============================================================================
// Venue Order Port
// =============================================================================

/// Errors surfaced by venue trading APIs.
#[derive(Debug, Error)]
pub enum TradingError {
    /// The venue rejected the request.
    #[error("venue API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Venue-provided message.
        message: String,
    },

    /// The request timed out; treated as leg failure by the coordinator.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The order was rejected outright.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Response could not be decoded.
    #[error("malformed venue response: {0}")]
    Malformed(String),
}

impl TradingError {
    /// Returns true when retrying later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Malformed(_) => false,
        }
    }
}

/// Parameters for one order placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Venue the order targets.
    pub venue: Venue,
    /// Venue market identifier.
    pub venue_market_id: String,
    /// Outcome to buy.
    pub side: Outcome,
    /// Contracts to buy.
    pub size: Decimal,
    /// Limit price carried from detection.
    pub limit_price: Decimal,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id.
    pub order_id: String,
    /// When the venue accepted the order.
    pub accepted_at: DateTime<Utc>,
}

/// Venue-reported order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Resting or partially filled.
    Open,
    /// Fully filled.
    Filled,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

/// Outbound trading surface of one venue.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Returns the venue this adapter targets.
    fn venue(&self) -> Venue;

    /// Places a limit buy order.
    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderAck, TradingError>;

    /// Best-effort cancel of a resting order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError>;

    /// Queries the current state of an order.
    async fn order_status(&self, order_id: &str) -> Result<OrderState, TradingError>;

    /// Fetches the venue's current binary-market listings.
    async fn list_markets(&self) -> Result<Vec<VenueMarket>, TradingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_error_transience() {
        assert!(TradingError::Timeout("10s elapsed".into()).is_transient());
        assert!(TradingError::Network("connection reset".into()).is_transient());
        assert!(TradingError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!TradingError::Api {
            status: 400,
            message: "bad order".into()
        }
        .is_transient());
        assert!(!TradingError::Rejected("insufficient funds".into()).is_transient());
    }

    #[test]
    fn test_trading_error_display() {
        let err = TradingError::Api {
            status: 422,
            message: "price out of range".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("price out of range"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("opportunity 42".into());
        assert!(err.to_string().contains("opportunity 42"));
    }
}
