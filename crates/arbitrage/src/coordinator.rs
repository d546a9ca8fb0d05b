//! Two-leg execution coordination.
//!
//! Venues offer no cross-venue transaction, so the coordinator places both
//! legs concurrently and compensates on partial failure: the successful leg
//! gets a best-effort cancel and the opportunity expires. The
//! `detected → executing` status transition in the store is the write
//! guard against a second executor claiming the same opportunity; the
//! in-process in-flight set catches concurrent calls before they touch the
//! store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dutchbook_core::{
    ArbitrageOpportunity, EngineEvent, EventBus, ExecutionReport, MappingStore, OpportunityStatus,
    OpportunityStore, OrderApi, OrderState, OrderTicket, Trade, TradeStatus, TradeStore, Venue,
};

use crate::error::ExecutionError;

/// Coordinator limits.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Hard cap on a single leg's size.
    pub max_position_size: Decimal,
}

/// Places and compensates two-leg executions.
pub struct ExecutionCoordinator {
    config: CoordinatorConfig,
    venue_a: Arc<dyn OrderApi>,
    venue_b: Arc<dyn OrderApi>,
    opportunities: Arc<dyn OpportunityStore>,
    trades: Arc<dyn TradeStore>,
    mappings: Arc<dyn MappingStore>,
    bus: EventBus,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Removes the opportunity from the in-flight set on every exit path.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

impl ExecutionCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        venue_a: Arc<dyn OrderApi>,
        venue_b: Arc<dyn OrderApi>,
        opportunities: Arc<dyn OpportunityStore>,
        trades: Arc<dyn TradeStore>,
        mappings: Arc<dyn MappingStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            venue_a,
            venue_b,
            opportunities,
            trades,
            mappings,
            bus,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn api_for(&self, venue: Venue) -> &dyn OrderApi {
        match venue {
            Venue::A => self.venue_a.as_ref(),
            Venue::B => self.venue_b.as_ref(),
        }
    }

    /// Executes both legs of an opportunity.
    ///
    /// # Errors
    /// Fails with [`ExecutionError::DuplicateExecution`] when the
    /// opportunity is already in flight, [`ExecutionError::NotExecutable`]
    /// when it is not in `detected`, and
    /// [`ExecutionError::ExecutionFailed`] when any leg fails (after
    /// best-effort compensation).
    pub async fn execute(&self, opportunity_id: Uuid) -> Result<ExecutionReport, ExecutionError> {
        // An in-flight duplicate must fail as such even though its status
        // has already moved to executing, so the slot is claimed before
        // the status is inspected.
        if !self.in_flight.lock().insert(opportunity_id) {
            return Err(ExecutionError::DuplicateExecution(opportunity_id));
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            id: opportunity_id,
        };

        let opportunity = self
            .opportunities
            .get(opportunity_id)
            .await?
            .ok_or(ExecutionError::NotFound(opportunity_id))?;

        if opportunity.status != OpportunityStatus::Detected {
            return Err(ExecutionError::NotExecutable {
                status: opportunity.status,
            });
        }
        if opportunity.recommended_size > self.config.max_position_size {
            return Err(ExecutionError::SizeLimitExceeded {
                size: opportunity.recommended_size,
                max: self.config.max_position_size,
            });
        }
        for venue in [Venue::A, Venue::B] {
            let price = opportunity.leg_price(venue);
            if price < Decimal::ZERO || price > Decimal::ONE {
                return Err(ExecutionError::InvalidPrice(price));
            }
        }

        let mapping = self
            .mappings
            .find_by_canonical(&opportunity.canonical_id)
            .await?
            .filter(|m| m.is_paired())
            .ok_or_else(|| ExecutionError::MappingMissing(opportunity.canonical_id.clone()))?;
        let missing = || ExecutionError::MappingMissing(opportunity.canonical_id.clone());
        let market_a = mapping
            .market_id_on(Venue::A)
            .ok_or_else(missing)?
            .to_string();
        let market_b = mapping
            .market_id_on(Venue::B)
            .ok_or_else(missing)?
            .to_string();

        // Claim the opportunity; a false return means another writer beat
        // us between the status read and here.
        if !self.opportunities.begin_execution(opportunity_id).await? {
            return Err(ExecutionError::NotExecutable {
                status: OpportunityStatus::Executing,
            });
        }

        let ticket_a = OrderTicket {
            venue: Venue::A,
            venue_market_id: market_a,
            side: opportunity.leg_side(Venue::A),
            size: opportunity.recommended_size,
            limit_price: opportunity.leg_price(Venue::A),
        };
        let ticket_b = OrderTicket {
            venue: Venue::B,
            venue_market_id: market_b,
            side: opportunity.leg_side(Venue::B),
            size: opportunity.recommended_size,
            limit_price: opportunity.leg_price(Venue::B),
        };

        info!(
            opportunity_id = %opportunity_id,
            size = %opportunity.recommended_size,
            side_a = %ticket_a.side,
            side_b = %ticket_b.side,
            "placing both legs"
        );

        let (result_a, result_b) = tokio::join!(
            self.venue_a.place_order(&ticket_a),
            self.venue_b.place_order(&ticket_b)
        );

        match (result_a, result_b) {
            (Ok(ack_a), Ok(ack_b)) => {
                let trade_a = Trade::pending(
                    opportunity_id,
                    Venue::A,
                    &ticket_a.venue_market_id,
                    ticket_a.side,
                    ticket_a.size,
                    ticket_a.limit_price,
                    &ack_a.order_id,
                );
                let trade_b = Trade::pending(
                    opportunity_id,
                    Venue::B,
                    &ticket_b.venue_market_id,
                    ticket_b.side,
                    ticket_b.size,
                    ticket_b.limit_price,
                    &ack_b.order_id,
                );
                self.trades.insert(&trade_a).await?;
                self.trades.insert(&trade_b).await?;
                self.opportunities
                    .set_status(opportunity_id, OpportunityStatus::Executed)
                    .await?;

                let report = ExecutionReport {
                    opportunity_id,
                    success: true,
                    trades: vec![trade_a, trade_b],
                    message: "both legs placed".to_string(),
                    completed_at: Utc::now(),
                };
                info!(opportunity_id = %opportunity_id, "execution succeeded");
                self.bus
                    .publish(EngineEvent::ExecutionSucceeded(report.clone()));
                Ok(report)
            }

            (Ok(ack_a), Err(error_b)) => {
                warn!(
                    opportunity_id = %opportunity_id,
                    order_id = %ack_a.order_id,
                    error = %error_b,
                    "venue B leg failed, compensating venue A"
                );
                let trade_a = self
                    .compensate(opportunity_id, &ticket_a, &ack_a.order_id, &error_b.to_string())
                    .await?;
                let trade_b = Trade::failed(
                    opportunity_id,
                    Venue::B,
                    &ticket_b.venue_market_id,
                    ticket_b.side,
                    ticket_b.size,
                    ticket_b.limit_price,
                    error_b.to_string(),
                );
                self.trades.insert(&trade_b).await?;
                self.fail_opportunity(
                    opportunity_id,
                    vec![trade_a, trade_b],
                    format!("Venue B leg failed: {error_b}"),
                )
                .await
            }

            (Err(error_a), Ok(ack_b)) => {
                warn!(
                    opportunity_id = %opportunity_id,
                    order_id = %ack_b.order_id,
                    error = %error_a,
                    "venue A leg failed, compensating venue B"
                );
                let trade_a = Trade::failed(
                    opportunity_id,
                    Venue::A,
                    &ticket_a.venue_market_id,
                    ticket_a.side,
                    ticket_a.size,
                    ticket_a.limit_price,
                    error_a.to_string(),
                );
                self.trades.insert(&trade_a).await?;
                let trade_b = self
                    .compensate(opportunity_id, &ticket_b, &ack_b.order_id, &error_a.to_string())
                    .await?;
                self.fail_opportunity(
                    opportunity_id,
                    vec![trade_a, trade_b],
                    format!("Venue A leg failed: {error_a}"),
                )
                .await
            }

            (Err(error_a), Err(error_b)) => {
                warn!(
                    opportunity_id = %opportunity_id,
                    error_a = %error_a,
                    error_b = %error_b,
                    "both legs failed"
                );
                let trade_a = Trade::failed(
                    opportunity_id,
                    Venue::A,
                    &ticket_a.venue_market_id,
                    ticket_a.side,
                    ticket_a.size,
                    ticket_a.limit_price,
                    error_a.to_string(),
                );
                let trade_b = Trade::failed(
                    opportunity_id,
                    Venue::B,
                    &ticket_b.venue_market_id,
                    ticket_b.side,
                    ticket_b.size,
                    ticket_b.limit_price,
                    error_b.to_string(),
                );
                self.trades.insert(&trade_a).await?;
                self.trades.insert(&trade_b).await?;
                self.fail_opportunity(
                    opportunity_id,
                    vec![trade_a, trade_b],
                    format!("both legs failed: A: {error_a}; B: {error_b}"),
                )
                .await
            }
        }
    }

    /// Cancels the successful leg of a partially failed execution and
    /// records the outcome. Cancel failure is recorded, not retried; the
    /// execution still reaches a terminal state.
    async fn compensate(
        &self,
        opportunity_id: Uuid,
        ticket: &OrderTicket,
        order_id: &str,
        peer_failure: &str,
    ) -> Result<Trade, ExecutionError> {
        let mut trade = Trade::pending(
            opportunity_id,
            ticket.venue,
            &ticket.venue_market_id,
            ticket.side,
            ticket.size,
            ticket.limit_price,
            order_id,
        );

        match self.api_for(ticket.venue).cancel_order(order_id).await {
            Ok(()) => {
                info!(order_id, venue = %ticket.venue, "compensation cancel succeeded");
                trade.status = TradeStatus::Cancelled;
                trade.error_message =
                    Some(format!("cancelled after peer leg failed: {peer_failure}"));
            }
            Err(cancel_error) => {
                error!(
                    order_id,
                    venue = %ticket.venue,
                    error = %cancel_error,
                    "compensation cancel failed"
                );
                trade.status = TradeStatus::Failed;
                trade.error_message = Some(format!(
                    "cancel failed: {cancel_error} (after peer leg failed: {peer_failure})"
                ));
            }
        }

        self.trades.insert(&trade).await?;
        Ok(trade)
    }

    async fn fail_opportunity(
        &self,
        opportunity_id: Uuid,
        trades: Vec<Trade>,
        reason: String,
    ) -> Result<ExecutionReport, ExecutionError> {
        self.opportunities
            .set_status(opportunity_id, OpportunityStatus::Expired)
            .await?;
        let report = ExecutionReport {
            opportunity_id,
            success: false,
            trades,
            message: reason.clone(),
            completed_at: Utc::now(),
        };
        self.bus
            .publish(EngineEvent::ExecutionFailed(report.clone()));
        Err(ExecutionError::ExecutionFailed(reason))
    }

    /// Reconciles pending legs against venue-reported order states.
    /// Idempotent: settled legs are left untouched.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Store`] on persistence failures; venue
    /// query failures leave the leg pending for the next pass.
    pub async fn check_order_statuses(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Vec<Trade>, ExecutionError> {
        let trades = self.trades.for_opportunity(opportunity_id).await?;

        for trade in &trades {
            if trade.status != TradeStatus::Pending {
                continue;
            }
            let Some(order_id) = &trade.order_id else {
                continue;
            };

            match self.api_for(trade.venue).order_status(order_id).await {
                Ok(OrderState::Open) => {}
                Ok(OrderState::Filled) => {
                    self.trades
                        .update_status(trade.id, TradeStatus::Filled, Some(Utc::now()), None)
                        .await?;
                }
                Ok(OrderState::Cancelled) => {
                    self.trades
                        .update_status(trade.id, TradeStatus::Cancelled, None, None)
                        .await?;
                }
                Ok(OrderState::Rejected) => {
                    self.trades
                        .update_status(
                            trade.id,
                            TradeStatus::Failed,
                            None,
                            Some("rejected by venue".to_string()),
                        )
                        .await?;
                }
                Err(e) => {
                    warn!(
                        order_id,
                        venue = %trade.venue,
                        error = %e,
                        "order status query failed, leaving leg pending"
                    );
                }
            }
        }

        Ok(self.trades.for_opportunity(opportunity_id).await?)
    }

    /// Cancels every pending leg and expires the opportunity. Idempotent.
    ///
    /// # Errors
    /// Returns [`ExecutionError::NotFound`] for an unknown opportunity and
    /// [`ExecutionError::Store`] on persistence failures.
    pub async fn cancel_execution(&self, opportunity_id: Uuid) -> Result<(), ExecutionError> {
        let _ = self
            .opportunities
            .get(opportunity_id)
            .await?
            .ok_or(ExecutionError::NotFound(opportunity_id))?;

        let trades = self.trades.for_opportunity(opportunity_id).await?;
        for trade in &trades {
            if trade.status != TradeStatus::Pending {
                continue;
            }
            let Some(order_id) = &trade.order_id else {
                continue;
            };

            match self.api_for(trade.venue).cancel_order(order_id).await {
                Ok(()) => {
                    self.trades
                        .update_status(trade.id, TradeStatus::Cancelled, None, None)
                        .await?;
                }
                Err(e) => {
                    warn!(order_id, venue = %trade.venue, error = %e, "cancel failed");
                    self.trades
                        .update_status(
                            trade.id,
                            TradeStatus::Pending,
                            None,
                            Some(format!("cancel failed: {e}")),
                        )
                        .await?;
                }
            }
        }

        self.opportunities
            .set_status(opportunity_id, OpportunityStatus::Expired)
            .await?;
        info!(opportunity_id = %opportunity_id, "execution cancelled");
        Ok(())
    }

    /// Consumes opportunity events and executes them while the
    /// auto-execute flag is on.
    pub async fn run_auto_execute(
        self: Arc<Self>,
        mut events: broadcast::Receiver<EngineEvent>,
        auto_execute: Arc<AtomicBool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("auto-execute listener stopping");
                        return;
                    }
                }
                event = events.recv() => match event {
                    Ok(EngineEvent::OpportunityDetected(opportunity)) => {
                        // Re-tested here: the flag may have flipped since
                        // the event was published.
                        if !auto_execute.load(Ordering::Relaxed) {
                            debug!(
                                opportunity_id = %opportunity.id,
                                "auto-execute disabled, skipping"
                            );
                            continue;
                        }
                        match self.execute(opportunity.id).await {
                            Ok(report) => info!(
                                opportunity_id = %report.opportunity_id,
                                "auto-executed opportunity"
                            ),
                            Err(e) => warn!(
                                opportunity_id = %opportunity.id,
                                error = %e,
                                "auto-execution failed"
                            ),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auto-execute listener lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("event bus closed, auto-execute listener stopping");
                        return;
                    }
                },
            }
        }
    }

    /// Returns a snapshot of the active opportunity, for surfaces that
    /// gate on liveness.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Store`] on persistence failures.
    pub async fn opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Option<ArbitrageOpportunity>, ExecutionError> {
        Ok(self.opportunities.get(opportunity_id).await?)
    }
}

// =============================================================================
// Tests
// =============================================================================
