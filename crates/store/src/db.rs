//! Postgres connection and schema bootstrap.

use dutchbook_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

/// Connects a pool to the configured database.
///
/// # Errors
/// Returns [`StoreError::Database`] when the connection cannot be
/// established; the process treats this as fatal at startup.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(db_err)?;
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS canonical_markets (
        canonical_id        TEXT PRIMARY KEY,
        title               TEXT NOT NULL,
        venue_a_market_id   TEXT,
        venue_b_market_id   TEXT,
        similarity          DOUBLE PRECISION NOT NULL,
        confidence          TEXT NOT NULL,
        created_at          TIMESTAMPTZ NOT NULL,
        updated_at          TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_canonical_venue_a
        ON canonical_markets (venue_a_market_id)
        WHERE venue_a_market_id IS NOT NULL
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_canonical_venue_b
        ON canonical_markets (venue_b_market_id)
        WHERE venue_b_market_id IS NOT NULL
    ",
    r"
    CREATE TABLE IF NOT EXISTS opportunities (
        id                  UUID PRIMARY KEY,
        canonical_id        TEXT NOT NULL REFERENCES canonical_markets (canonical_id),
        combined_cost       NUMERIC NOT NULL CHECK (combined_cost >= 0 AND combined_cost <= 1),
        profit_potential    NUMERIC NOT NULL,
        venue_a_yes         NUMERIC NOT NULL CHECK (venue_a_yes >= 0 AND venue_a_yes <= 1),
        venue_a_no          NUMERIC NOT NULL CHECK (venue_a_no >= 0 AND venue_a_no <= 1),
        venue_b_yes         NUMERIC NOT NULL CHECK (venue_b_yes >= 0 AND venue_b_yes <= 1),
        venue_b_no          NUMERIC NOT NULL CHECK (venue_b_no >= 0 AND venue_b_no <= 1),
        buy_side_a          TEXT NOT NULL,
        buy_side_b          TEXT NOT NULL,
        depth_a             NUMERIC NOT NULL,
        depth_b             NUMERIC NOT NULL,
        recommended_size    NUMERIC NOT NULL,
        estimated_fees      NUMERIC NOT NULL,
        net_profit          NUMERIC NOT NULL,
        status              TEXT NOT NULL,
        detected_at         TIMESTAMPTZ NOT NULL,
        expires_at          TIMESTAMPTZ
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_opportunities_status ON opportunities (status)",
    r"CREATE INDEX IF NOT EXISTS idx_opportunities_detected_at ON opportunities (detected_at DESC)",
    r"
    CREATE TABLE IF NOT EXISTS trades (
        id                  UUID PRIMARY KEY,
        opportunity_id      UUID REFERENCES opportunities (id),
        venue               TEXT NOT NULL,
        venue_market_id     TEXT NOT NULL,
        side                TEXT NOT NULL,
        amount              NUMERIC NOT NULL CHECK (amount > 0),
        price               NUMERIC NOT NULL CHECK (price >= 0 AND price <= 1),
        order_id            TEXT,
        status              TEXT NOT NULL,
        executed_at         TIMESTAMPTZ,
        error_message       TEXT
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_trades_opportunity ON trades (opportunity_id)",
];

/// Creates tables and indexes when absent. Idempotent.
///
/// # Errors
/// Returns [`StoreError::Database`] when any DDL statement fails.
pub async fn init_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(db_err)?;
    }
    info!("database schema ready");
    Ok(())
}
