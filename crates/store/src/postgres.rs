//! Postgres implementations of the storage ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use dutchbook_core::{
    ArbitrageOpportunity, CanonicalMarket, MappingStore, MatchConfidence, OpportunityStatus,
    OpportunityStore, Outcome, StoreError, StoreResult, Trade, TradeStatus, TradeStore, Venue,
};

use crate::db::db_err;

fn bad_row(what: &str, value: &str) -> StoreError {
    StoreError::Database(format!("unrecognized {what} in row: {value:?}"))
}

// =============================================================================
// Mappings
// =============================================================================

/// Canonical mapping repository.
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    /// Creates the repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    canonical_id: String,
    title: String,
    venue_a_market_id: Option<String>,
    venue_b_market_id: Option<String>,
    similarity: f64,
    confidence: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MappingRow> for CanonicalMarket {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self, StoreError> {
        let confidence = MatchConfidence::parse(&row.confidence)
            .ok_or_else(|| bad_row("confidence", &row.confidence))?;
        Ok(Self {
            canonical_id: row.canonical_id,
            title: row.title,
            venue_a_market_id: row.venue_a_market_id,
            venue_b_market_id: row.venue_b_market_id,
            similarity: row.similarity,
            confidence,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const MAPPING_COLUMNS: &str = "canonical_id, title, venue_a_market_id, venue_b_market_id, \
                               similarity, confidence, created_at, updated_at";

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn upsert(&self, mapping: &CanonicalMarket) -> StoreResult<()> {
        // created_at is absent from the conflict SET list, so an update
        // keeps the original creation time.
        sqlx::query(
            r"
            INSERT INTO canonical_markets
                (canonical_id, title, venue_a_market_id, venue_b_market_id,
                 similarity, confidence, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (canonical_id) DO UPDATE SET
                venue_a_market_id = EXCLUDED.venue_a_market_id,
                venue_b_market_id = EXCLUDED.venue_b_market_id,
                similarity = EXCLUDED.similarity,
                confidence = EXCLUDED.confidence,
                updated_at = EXCLUDED.updated_at,
                title = CASE
                    WHEN canonical_markets.title = '' THEN EXCLUDED.title
                    ELSE canonical_markets.title
                END
            ",
        )
        .bind(&mapping.canonical_id)
        .bind(&mapping.title)
        .bind(&mapping.venue_a_market_id)
        .bind(&mapping.venue_b_market_id)
        .bind(mapping.similarity)
        .bind(mapping.confidence.as_str())
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn all(&self) -> StoreResult<Vec<CanonicalMarket>> {
        let rows = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM canonical_markets ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(CanonicalMarket::try_from).collect()
    }

    async fn find_by_canonical(&self, canonical_id: &str) -> StoreResult<Option<CanonicalMarket>> {
        let row = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM canonical_markets WHERE canonical_id = $1"
        ))
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(CanonicalMarket::try_from).transpose()
    }

    async fn find_by_venue_market(
        &self,
        venue: Venue,
        venue_market_id: &str,
    ) -> StoreResult<Option<CanonicalMarket>> {
        let column = match venue {
            Venue::A => "venue_a_market_id",
            Venue::B => "venue_b_market_id",
        };
        let row = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM canonical_markets WHERE {column} = $1"
        ))
        .bind(venue_market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(CanonicalMarket::try_from).transpose()
    }
}

// =============================================================================
// Opportunities
// =============================================================================

/// Opportunity repository.
#[derive(Debug, Clone)]
pub struct PgOpportunityStore {
    pool: PgPool,
}

impl PgOpportunityStore {
    /// Creates the repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OpportunityRow {
    id: Uuid,
    canonical_id: String,
    combined_cost: Decimal,
    profit_potential: Decimal,
    venue_a_yes: Decimal,
    venue_a_no: Decimal,
    venue_b_yes: Decimal,
    venue_b_no: Decimal,
    buy_side_a: String,
    buy_side_b: String,
    depth_a: Decimal,
    depth_b: Decimal,
    recommended_size: Decimal,
    estimated_fees: Decimal,
    net_profit: Decimal,
    status: String,
    detected_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<OpportunityRow> for ArbitrageOpportunity {
    type Error = StoreError;

    fn try_from(row: OpportunityRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.id,
            canonical_id: row.canonical_id,
            combined_cost: row.combined_cost,
            profit_potential: row.profit_potential,
            venue_a_yes: row.venue_a_yes,
            venue_a_no: row.venue_a_no,
            venue_b_yes: row.venue_b_yes,
            venue_b_no: row.venue_b_no,
            buy_side_a: Outcome::parse(&row.buy_side_a)
                .ok_or_else(|| bad_row("side", &row.buy_side_a))?,
            buy_side_b: Outcome::parse(&row.buy_side_b)
                .ok_or_else(|| bad_row("side", &row.buy_side_b))?,
            depth_a: row.depth_a,
            depth_b: row.depth_b,
            recommended_size: row.recommended_size,
            estimated_fees: row.estimated_fees,
            net_profit: row.net_profit,
            status: OpportunityStatus::parse(&row.status)
                .ok_or_else(|| bad_row("status", &row.status))?,
            detected_at: row.detected_at,
            expires_at: row.expires_at,
        })
    }
}

const OPPORTUNITY_COLUMNS: &str = "id, canonical_id, combined_cost, profit_potential, \
     venue_a_yes, venue_a_no, venue_b_yes, venue_b_no, buy_side_a, buy_side_b, \
     depth_a, depth_b, recommended_size, estimated_fees, net_profit, status, \
     detected_at, expires_at";

#[async_trait]
impl OpportunityStore for PgOpportunityStore {
    async fn insert(&self, opportunity: &ArbitrageOpportunity) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO opportunities
                (id, canonical_id, combined_cost, profit_potential,
                 venue_a_yes, venue_a_no, venue_b_yes, venue_b_no,
                 buy_side_a, buy_side_b, depth_a, depth_b,
                 recommended_size, estimated_fees, net_profit,
                 status, detected_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18)
            ",
        )
        .bind(opportunity.id)
        .bind(&opportunity.canonical_id)
        .bind(opportunity.combined_cost)
        .bind(opportunity.profit_potential)
        .bind(opportunity.venue_a_yes)
        .bind(opportunity.venue_a_no)
        .bind(opportunity.venue_b_yes)
        .bind(opportunity.venue_b_no)
        .bind(opportunity.buy_side_a.as_str())
        .bind(opportunity.buy_side_b.as_str())
        .bind(opportunity.depth_a)
        .bind(opportunity.depth_b)
        .bind(opportunity.recommended_size)
        .bind(opportunity.estimated_fees)
        .bind(opportunity.net_profit)
        .bind(opportunity.status.as_str())
        .bind(opportunity.detected_at)
        .bind(opportunity.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ArbitrageOpportunity>> {
        let row = sqlx::query_as::<_, OpportunityRow>(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(ArbitrageOpportunity::try_from).transpose()
    }

    async fn recent(&self, limit: i64) -> StoreResult<Vec<ArbitrageOpportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities \
             ORDER BY detected_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ArbitrageOpportunity::try_from).collect()
    }

    async fn active(&self) -> StoreResult<Vec<ArbitrageOpportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities \
             WHERE status IN ('detected', 'executing') \
               AND (expires_at IS NULL OR expires_at > NOW()) \
             ORDER BY detected_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ArbitrageOpportunity::try_from).collect()
    }

    async fn begin_execution(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE opportunities SET status = 'executing' \
             WHERE id = $1 AND status = 'detected'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_status(&self, id: Uuid, status: OpportunityStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE opportunities SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("opportunity {id}")));
        }
        Ok(())
    }
}

// =============================================================================
// Trades
// =============================================================================

/// Trade repository.
#[derive(Debug, Clone)]
pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    /// Creates the repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    opportunity_id: Option<Uuid>,
    venue: String,
    venue_market_id: String,
    side: String,
    amount: Decimal,
    price: Decimal,
    order_id: Option<String>,
    status: String,
    executed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl TryFrom<TradeRow> for Trade {
    type Error = StoreError;

    fn try_from(row: TradeRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.id,
            opportunity_id: row.opportunity_id,
            venue: Venue::parse(&row.venue).ok_or_else(|| bad_row("venue", &row.venue))?,
            venue_market_id: row.venue_market_id,
            side: Outcome::parse(&row.side).ok_or_else(|| bad_row("side", &row.side))?,
            amount: row.amount,
            price: row.price,
            order_id: row.order_id,
            status: TradeStatus::parse(&row.status)
                .ok_or_else(|| bad_row("status", &row.status))?,
            executed_at: row.executed_at,
            error_message: row.error_message,
        })
    }
}

const TRADE_COLUMNS: &str = "id, opportunity_id, venue, venue_market_id, side, amount, \
                             price, order_id, status, executed_at, error_message";

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert(&self, trade: &Trade) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO trades
                (id, opportunity_id, venue, venue_market_id, side,
                 amount, price, order_id, status, executed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(trade.id)
        .bind(trade.opportunity_id)
        .bind(trade.venue.as_str())
        .bind(&trade.venue_market_id)
        .bind(trade.side.as_str())
        .bind(trade.amount)
        .bind(trade.price)
        .bind(&trade.order_id)
        .bind(trade.status.as_str())
        .bind(trade.executed_at)
        .bind(&trade.error_message)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades \
             ORDER BY COALESCE(executed_at, 'epoch'::timestamptz) DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    async fn for_opportunity(&self, opportunity_id: Uuid) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE opportunity_id = $1"
        ))
        .bind(opportunity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TradeStatus,
        executed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE trades SET
                status = $2,
                executed_at = COALESCE($3, executed_at),
                error_message = COALESCE($4, error_message)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(executed_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("trade {id}")));
        }
        Ok(())
    }
}
