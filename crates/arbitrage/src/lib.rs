//! Arbitrage detection and execution for cross-venue binary markets.
//!
//! When the same event trades on both venues, buying complementary
//! outcomes for a combined cost below par locks in the payout spread:
//!
//! ```text
//! Venue A:  YES mid $0.45
//! Venue B:  YES mid $0.50, so NO at $0.50
//!
//! Buy A YES @ $0.45 + B NO @ $0.50 = $0.95 per bundle
//! Guaranteed payout at resolution:   $1.00
//! Gross edge:                        $0.05 (before fees)
//! ```
//!
//! [`detector`] watches fused order books and emits opportunities;
//! [`coordinator`] places both legs concurrently and compensates when one
//! side fails.

pub mod coordinator;
pub mod detector;
pub mod error;

pub use coordinator::{CoordinatorConfig, ExecutionCoordinator};
pub use detector::{
    install_mappings, shared_index, ArbitrageDetector, DetectorConfig, MappingIndex,
    SharedMappingIndex,
};
pub use error::ExecutionError;
