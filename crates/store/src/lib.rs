//! Durable state for the arbitrage engine.
//!
//! Three tables back the pipeline: canonical mappings, detected
//! opportunities, and trade legs. [`postgres`] implements the core storage
//! ports over sqlx; [`memory`] is a behaviorally equivalent in-memory twin
//! used by scenario tests and offline runs. [`db`] owns connection setup
//! and the idempotent schema bootstrap.

pub mod db;
pub mod memory;
pub mod postgres;

pub use db::{connect, init_schema};
pub use memory::{MemoryMappingStore, MemoryOpportunityStore, MemoryTradeStore};
pub use postgres::{PgMappingStore, PgOpportunityStore, PgTradeStore};
