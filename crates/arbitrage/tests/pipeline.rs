//! End-to-end pipeline tests: book updates in, executed trades out.
//!
//! These run the detector and coordinator against in-memory stores and
//! scripted venue order APIs, covering the full detect -> persist ->
//! publish -> execute -> record flow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;

use dutchbook_core::{OpportunityStore, TradeStore};
use dutchbook_arbitrage::{
    install_mappings, shared_index, ArbitrageDetector, CoordinatorConfig, DetectorConfig,
    ExecutionCoordinator,
};
use dutchbook_core::{
    CanonicalMarket, EngineEvent, EventBus, MappingStore, MatchConfidence, OpportunityStatus,
    OrderAck, OrderApi, OrderBook, OrderState, OrderTicket, Outcome, PriceLevel, TradeStatus,
    TradingError, Venue, VenueMarket,
};
use dutchbook_store::{MemoryMappingStore, MemoryOpportunityStore, MemoryTradeStore};

struct ScriptedApi {
    venue: Venue,
    fail_placement: bool,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedApi {
    fn filling(venue: Venue) -> Self {
        Self {
            venue,
            fail_placement: false,
            cancelled: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(venue: Venue) -> Self {
        Self {
            venue,
            fail_placement: true,
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderApi for ScriptedApi {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, _ticket: &OrderTicket) -> Result<OrderAck, TradingError> {
        if self.fail_placement {
            Err(TradingError::Rejected("scripted rejection".to_string()))
        } else {
            Ok(OrderAck {
                order_id: format!("{}-1", self.venue.as_str()),
                accepted_at: Utc::now(),
            })
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        self.cancelled.lock().push(order_id.to_string());
        Ok(())
    }

    async fn order_status(&self, _order_id: &str) -> Result<OrderState, TradingError> {
        Ok(OrderState::Open)
    }

    async fn list_markets(&self) -> Result<Vec<VenueMarket>, TradingError> {
        Ok(Vec::new())
    }
}

fn book(bid: (rust_decimal::Decimal, rust_decimal::Decimal), ask: (rust_decimal::Decimal, rust_decimal::Decimal)) -> OrderBook {
    OrderBook::new(
        vec![PriceLevel::new(bid.0, bid.1)],
        vec![PriceLevel::new(ask.0, ask.1)],
        Utc::now(),
    )
}

struct Pipeline {
    detector: ArbitrageDetector,
    coordinator: Arc<ExecutionCoordinator>,
    opportunities: Arc<MemoryOpportunityStore>,
    trades: Arc<MemoryTradeStore>,
    bus: EventBus,
    venue_a: Arc<ScriptedApi>,
    venue_b: Arc<ScriptedApi>,
}

async fn pipeline(venue_a: ScriptedApi, venue_b: ScriptedApi) -> Pipeline {
    let mappings = Arc::new(MemoryMappingStore::new());
    mappings
        .upsert(&CanonicalMarket {
            canonical_id: "btc-100k".to_string(),
            title: "BTC above 100k".to_string(),
            venue_a_market_id: Some("a1".to_string()),
            venue_b_market_id: Some("b1".to_string()),
            similarity: 0.95,
            confidence: MatchConfidence::High,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let index = shared_index();
    install_mappings(&index, &mappings.all().await.unwrap());

    let opportunities = Arc::new(MemoryOpportunityStore::new());
    let trades = Arc::new(MemoryTradeStore::new());
    let bus = EventBus::new(32);

    let detector = ArbitrageDetector::new(
        DetectorConfig {
            max_position_size: dec!(5000),
            ..DetectorConfig::default()
        },
        index,
        opportunities.clone(),
        bus.clone(),
    );

    let venue_a = Arc::new(venue_a);
    let venue_b = Arc::new(venue_b);
    let coordinator = Arc::new(ExecutionCoordinator::new(
        CoordinatorConfig {
            max_position_size: dec!(5000),
        },
        venue_a.clone() as Arc<dyn OrderApi>,
        venue_b.clone() as Arc<dyn OrderApi>,
        opportunities.clone(),
        trades.clone(),
        mappings,
        bus.clone(),
    ));

    Pipeline {
        detector,
        coordinator,
        opportunities,
        trades,
        bus,
        venue_a,
        venue_b,
    }
}

#[tokio::test]
async fn detect_then_execute_both_legs() {
    let mut p = pipeline(
        ScriptedApi::filling(Venue::A),
        ScriptedApi::filling(Venue::B),
    )
    .await;
    let mut events = p.bus.subscribe();

    // Venue A: mid 0.45 with 2000 depth; venue B: mid 0.50 with 3000.
    p.detector
        .on_book(Venue::A, "a1", book((dec!(0.44), dec!(1200)), (dec!(0.46), dec!(800))))
        .await;
    let opportunity = p
        .detector
        .on_book(Venue::B, "b1", book((dec!(0.49), dec!(1800)), (dec!(0.51), dec!(1200))))
        .await
        .expect("S1 prices must produce an opportunity");

    assert_eq!(opportunity.combined_cost, dec!(0.95));
    assert_eq!(opportunity.recommended_size, dec!(2000));
    assert!(matches!(
        events.try_recv().unwrap(),
        EngineEvent::OpportunityDetected(_)
    ));

    let report = p.coordinator.execute(opportunity.id).await.unwrap();
    assert!(report.success);

    let legs = p.trades.for_opportunity(opportunity.id).await.unwrap();
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|t| t.status == TradeStatus::Pending));
    assert!(legs.iter().all(|t| t.order_id.is_some()));
    assert!(legs.iter().any(|t| t.venue == Venue::A && t.side == Outcome::Yes));
    assert!(legs.iter().any(|t| t.venue == Venue::B && t.side == Outcome::No));

    let stored = p.opportunities.get(opportunity.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OpportunityStatus::Executed);

    assert!(matches!(
        events.try_recv().unwrap(),
        EngineEvent::ExecutionSucceeded(_)
    ));
}

#[tokio::test]
async fn detect_then_compensate_partial_failure() {
    let mut p = pipeline(
        ScriptedApi::filling(Venue::A),
        ScriptedApi::rejecting(Venue::B),
    )
    .await;

    p.detector
        .on_book(Venue::A, "a1", book((dec!(0.44), dec!(1200)), (dec!(0.46), dec!(800))))
        .await;
    let opportunity = p
        .detector
        .on_book(Venue::B, "b1", book((dec!(0.49), dec!(1800)), (dec!(0.51), dec!(1200))))
        .await
        .unwrap();

    let err = p.coordinator.execute(opportunity.id).await.unwrap_err();
    assert_eq!(err.code(), "EXECUTION_FAILED");

    // The venue A order was cancelled as compensation.
    assert_eq!(p.venue_a.cancelled.lock().as_slice(), ["venue_a-1"]);
    assert!(p.venue_b.cancelled.lock().is_empty());

    let legs = p.trades.for_opportunity(opportunity.id).await.unwrap();
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|t| t.status != TradeStatus::Pending));

    let stored = p.opportunities.get(opportunity.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OpportunityStatus::Expired);
}

#[tokio::test]
async fn flat_prices_produce_no_work() {
    let mut p = pipeline(
        ScriptedApi::filling(Venue::A),
        ScriptedApi::filling(Venue::B),
    )
    .await;

    p.detector
        .on_book(Venue::A, "a1", book((dec!(0.49), dec!(1000)), (dec!(0.51), dec!(1000))))
        .await;
    let none = p
        .detector
        .on_book(Venue::B, "b1", book((dec!(0.49), dec!(1500)), (dec!(0.51), dec!(1500))))
        .await;

    assert!(none.is_none());
    assert!(p.opportunities.is_empty());
    assert!(p.trades.is_empty());
}
