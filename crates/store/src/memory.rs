//! In-memory implementations of the storage ports.
//!
//! Behaviorally equivalent to the Postgres repositories, used by scenario
//! tests and offline runs where no database is available.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use dutchbook_core::{
    ArbitrageOpportunity, CanonicalMarket, MappingStore, OpportunityStatus, OpportunityStore,
    StoreError, StoreResult, Trade, TradeStatus, TradeStore, Venue,
};

// =============================================================================
// Mappings
// =============================================================================

/// In-memory canonical mapping store.
#[derive(Debug, Clone, Default)]
pub struct MemoryMappingStore {
    mappings: Arc<RwLock<HashMap<String, CanonicalMarket>>>,
}

impl MemoryMappingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn upsert(&self, mapping: &CanonicalMarket) -> StoreResult<()> {
        let mut guard = self.mappings.write();

        // A venue market id may belong to at most one canonical id; this
        // mirrors the partial unique indexes on the relational store.
        for (id, existing) in guard.iter() {
            if id == &mapping.canonical_id {
                continue;
            }
            let a_clash = mapping.venue_a_market_id.is_some()
                && existing.venue_a_market_id == mapping.venue_a_market_id;
            let b_clash = mapping.venue_b_market_id.is_some()
                && existing.venue_b_market_id == mapping.venue_b_market_id;
            if a_clash || b_clash {
                return Err(StoreError::Conflict(format!(
                    "venue market already mapped to {id}"
                )));
            }
        }

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
        let mut mappings: Vec<CanonicalMarket> = self.mappings.read().values().cloned().collect();
        mappings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(mappings)
    }

    async fn find_by_canonical(&self, canonical_id: &str) -> StoreResult<Option<CanonicalMarket>> {
        Ok(self.mappings.read().get(canonical_id).cloned())
    }

    async fn find_by_venue_market(
        &self,
        venue: Venue,
        venue_market_id: &str,
    ) -> StoreResult<Option<CanonicalMarket>> {
        Ok(self
            .mappings
            .read()
            .values()
            .find(|m| m.market_id_on(venue) == Some(venue_market_id))
            .cloned())
    }
}

// =============================================================================
// Opportunities
// =============================================================================

/// In-memory opportunity store.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpportunityStore {
    opportunities: Arc<RwLock<HashMap<Uuid, ArbitrageOpportunity>>>,
}

impl MemoryOpportunityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored opportunities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.opportunities.read().len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opportunities.read().is_empty()
    }
}

#[async_trait]
impl OpportunityStore for MemoryOpportunityStore {
    async fn insert(&self, opportunity: &ArbitrageOpportunity) -> StoreResult<()> {
        let mut guard = self.opportunities.write();
        if guard.contains_key(&opportunity.id) {
            return Err(StoreError::Conflict(format!(
                "opportunity {} already exists",
                opportunity.id
            )));
        }
        guard.insert(opportunity.id, opportunity.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ArbitrageOpportunity>> {
        Ok(self.opportunities.read().get(&id).cloned())
    }

    async fn recent(&self, limit: i64) -> StoreResult<Vec<ArbitrageOpportunity>> {
        let mut opportunities: Vec<ArbitrageOpportunity> =
            self.opportunities.read().values().cloned().collect();
        opportunities.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        opportunities.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(opportunities)
    }

    async fn active(&self) -> StoreResult<Vec<ArbitrageOpportunity>> {
        let now = Utc::now();
        let mut opportunities: Vec<ArbitrageOpportunity> = self
            .opportunities
            .read()
            .values()
            .filter(|o| o.is_active(now))
            .cloned()
            .collect();
        opportunities.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(opportunities)
    }

    async fn begin_execution(&self, id: Uuid) -> StoreResult<bool> {
        let mut guard = self.opportunities.write();
        match guard.get_mut(&id) {
            Some(opportunity) if opportunity.status == OpportunityStatus::Detected => {
                opportunity.status = OpportunityStatus::Executing;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn set_status(&self, id: Uuid, status: OpportunityStatus) -> StoreResult<()> {
        let mut guard = self.opportunities.write();
        let opportunity = guard
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("opportunity {id}")))?;
        opportunity.status = status;
        Ok(())
    }
}

// =============================================================================
// Trades
// =============================================================================

/// In-memory trade store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTradeStore {
    trades: Arc<RwLock<Vec<Trade>>>,
}

impl MemoryTradeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored trades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.read().len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.read().is_empty()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn insert(&self, trade: &Trade) -> StoreResult<()> {
        let mut guard = self.trades.write();
        if guard.iter().any(|t| t.id == trade.id) {
            return Err(StoreError::Conflict(format!(
                "trade {} already exists",
                trade.id
            )));
        }
        guard.push(trade.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64) -> StoreResult<Vec<Trade>> {
        let guard = self.trades.read();
        // Insertion order stands in for creation time; newest first.
        let mut trades: Vec<Trade> = guard.iter().rev().cloned().collect();
        trades.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(trades)
    }

    async fn for_opportunity(&self, opportunity_id: Uuid) -> StoreResult<Vec<Trade>> {
        Ok(self
            .trades
            .read()
            .iter()
            .filter(|t| t.opportunity_id == Some(opportunity_id))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TradeStatus,
        executed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> StoreResult<()> {
        let mut guard = self.trades.write();
        let trade = guard
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("trade {id}")))?;
        trade.status = status;
        if executed_at.is_some() {
            trade.executed_at = executed_at;
        }
        if error.is_some() {
            trade.error_message = error;
        }
        Ok(())
    }
}
