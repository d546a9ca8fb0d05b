//! HTTP handlers for the engine's API surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use dutchbook_arbitrage::ExecutionError;
use dutchbook_core::{ArbitrageOpportunity, CanonicalMarket, ExecutionReport, Trade};

use crate::state::AppState;

/// Service name reported by the health endpoint.
const SERVICE_NAME: &str = "dutchbook-engine";

/// JSON error body with a stable code.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status,
        }
    }

    fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<dutchbook_core::StoreError> for ApiError {
    fn from(err: dutchbook_core::StoreError) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            .with_code("DATA_STORE_ERROR")
    }
}

fn execution_error_response(err: ExecutionError) -> ApiError {
    let status = match &err {
        ExecutionError::NotFound(_) | ExecutionError::NotExecutable { .. } => {
            StatusCode::NOT_FOUND
        }
        ExecutionError::DuplicateExecution(_) => StatusCode::CONFLICT,
        ExecutionError::SizeLimitExceeded { .. } | ExecutionError::InvalidPrice(_) => {
            StatusCode::BAD_REQUEST
        }
        ExecutionError::MappingMissing(_)
        | ExecutionError::ExecutionFailed(_)
        | ExecutionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = err.code();
    ApiError::new(status, err.to_string()).with_code(code)
}

// =============================================================================
// Health
// =============================================================================

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "service": SERVICE_NAME,
    }))
}

// =============================================================================
// Opportunities
// =============================================================================

/// Query parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Maximum rows to return.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/opportunities?limit=N`
pub async fn list_opportunities(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ArbitrageOpportunity>>, ApiError> {
    let opportunities = state.opportunities.recent(params.limit.max(0)).await?;
    Ok(Json(opportunities))
}

/// `GET /api/opportunities/active`
pub async fn active_opportunities(
    State(state): State<AppState>,
) -> Result<Json<Vec<ArbitrageOpportunity>>, ApiError> {
    let opportunities = state.opportunities.active().await?;
    Ok(Json(opportunities))
}

// =============================================================================
// Markets
// =============================================================================

/// `GET /api/markets`
pub async fn list_markets(
    State(state): State<AppState>,
) -> Result<Json<Vec<CanonicalMarket>>, ApiError> {
    let mappings = state.mappings.all().await?;
    Ok(Json(mappings))
}

/// `POST /api/markets/sync`
pub async fn trigger_market_sync(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.sync_tx.try_send(()).map_err(|_| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "market sync already in progress",
        )
    })?;
    Ok(Json(json!({ "message": "market sync triggered" })))
}

// =============================================================================
// Trades
// =============================================================================

/// `GET /api/trades?limit=N`
pub async fn list_trades(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let trades = state.trades.recent(params.limit.max(0)).await?;
    Ok(Json(trades))
}

// =============================================================================
// Execution
// =============================================================================

/// `POST /api/execute/:opportunity_id`
///
/// Refused while auto-execute is disabled; 404 when the opportunity is not
/// active.
pub async fn execute_opportunity(
    State(state): State<AppState>,
    Path(opportunity_id): Path<Uuid>,
) -> Result<Json<ExecutionReport>, ApiError> {
    if !state.config.auto_execute() {
        return Err(
            ApiError::new(StatusCode::FORBIDDEN, "auto-execute is disabled")
                .with_code("AUTO_EXECUTE_DISABLED"),
        );
    }

    let opportunity = state
        .opportunities
        .get(opportunity_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "opportunity not found"))?;
    if !opportunity.is_active(Utc::now()) {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "opportunity is no longer active",
        ));
    }

    state
        .coordinator
        .execute(opportunity_id)
        .await
        .map(Json)
        .map_err(execution_error_response)
}

/// `POST /api/execute/:opportunity_id/cancel`
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(opportunity_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state
        .coordinator
        .cancel_execution(opportunity_id)
        .await
        .map_err(execution_error_response)?;
    Ok(Json(json!({ "message": "execution cancelled" })))
}

// =============================================================================
// Config
// =============================================================================

/// `GET /api/config`
pub async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "arb_threshold": state.config.arb_threshold,
        "min_liquidity": state.config.min_liquidity,
        "max_position_size": state.config.max_position_size,
        "venue_a_fee_rate": state.config.venue_a_fee_rate,
        "venue_b_fee_rate": state.config.venue_b_fee_rate,
        "similarity_threshold": state.config.similarity_threshold,
        "auto_execute": state.config.auto_execute(),
    }))
}

/// `POST /api/config`
///
/// Accepts exactly `{"auto_execute": bool}`; every other field is
/// rejected because only the auto-execute flag is mutable after start.
pub async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let enabled = parse_config_update(&body)
        .map_err(|reason| ApiError::new(StatusCode::BAD_REQUEST, reason))?;

    state.config.set_auto_execute(enabled);
    tracing::info!(auto_execute = enabled, "auto-execute flag updated");
    Ok(Json(json!({ "auto_execute": enabled })))
}

pub(crate) fn parse_config_update(body: &Value) -> Result<bool, String> {
    let object = body
        .as_object()
        .ok_or_else(|| "body must be a JSON object".to_string())?;

    for key in object.keys() {
        if key != "auto_execute" {
            return Err(format!("field {key:?} is not mutable at runtime"));
        }
    }

    object
        .get("auto_execute")
        .ok_or_else(|| "missing field auto_execute".to_string())?
        .as_bool()
        .ok_or_else(|| "auto_execute must be a boolean".to_string())
}
