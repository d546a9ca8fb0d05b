//! Shared foundation for the dutchbook arbitrage engine.
//!
//! Two venues list binary markets on the same underlying events. When the
//! combined cost of buying complementary outcomes across the venues drops
//! below par, the bundle pays out 1.00 per contract regardless of the
//! resolution. This crate carries the domain types for that pipeline plus
//! the configuration, event bus, and the async ports implemented elsewhere
//! in the workspace.
//!
//! - [`types`]: venues, books, canonical mappings, opportunities, trades
//! - [`config`]: environment-driven configuration snapshot
//! - [`events`]: broadcast event bus
//! - [`ports`]: storage and venue-order seams

pub mod config;
pub mod events;
pub mod ports;
pub mod types;

pub use config::{Config, ConfigError, VenueEndpoints};
pub use events::{EngineEvent, EventBus};
pub use ports::{
    MappingStore, OpportunityStore, OrderAck, OrderApi, OrderState, OrderTicket, StoreError,
    StoreResult, TradeStore, TradingError,
};
pub use types::{
    ArbitrageOpportunity, CanonicalMarket, ExecutionReport, MatchConfidence, OpportunityStatus,
    OrderBook, Outcome, PriceLevel, Trade, TradeStatus, Venue, VenueMarket,
};
