//! HTTP surface and push channel for the arbitrage engine.
//!
//! Serves the read endpoints (opportunities, markets, trades, config), the
//! execution entry points, the market-sync trigger, and the `/ws` push
//! channel that forwards engine events as framed JSON.

pub mod handlers;
pub mod server;
pub mod state;
pub mod websocket;

pub use server::ApiServer;
pub use state::AppState;

#[cfg(test)]
mod router_tests {
    use crate::server::ApiServer;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use dutchbook_arbitrage::{CoordinatorConfig, ExecutionCoordinator};
    use dutchbook_core::{
        ArbitrageOpportunity, CanonicalMarket, Config, EventBus, MappingStore, MatchConfidence,
        OpportunityStatus, OpportunityStore, OrderAck, OrderApi, OrderState, OrderTicket, Outcome,
        TradingError, Venue, VenueMarket,
    };
    use dutchbook_store::{MemoryMappingStore, MemoryOpportunityStore, MemoryTradeStore};
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    struct AlwaysFillApi {
        venue: Venue,
    }

    #[async_trait]
    impl OrderApi for AlwaysFillApi {
        fn venue(&self) -> Venue {
            self.venue
        }

        async fn place_order(&self, _ticket: &OrderTicket) -> Result<OrderAck, TradingError> {
            Ok(OrderAck {
                order_id: format!("{}-order", self.venue.as_str()),
                accepted_at: Utc::now(),
            })
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<(), TradingError> {
            Ok(())
        }

        async fn order_status(&self, _order_id: &str) -> Result<OrderState, TradingError> {
            Ok(OrderState::Filled)
        }

        async fn list_markets(&self) -> Result<Vec<VenueMarket>, TradingError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        state: AppState,
        opportunities: Arc<MemoryOpportunityStore>,
        _sync_rx: mpsc::Receiver<()>,
    }

    async fn fixture() -> Fixture {
        let opportunities = Arc::new(MemoryOpportunityStore::new());
        let trades = Arc::new(MemoryTradeStore::new());
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

        let bus = EventBus::new(32);
        let coordinator = Arc::new(ExecutionCoordinator::new(
            CoordinatorConfig {
                max_position_size: dec!(10000),
            },
            Arc::new(AlwaysFillApi { venue: Venue::A }),
            Arc::new(AlwaysFillApi { venue: Venue::B }),
            opportunities.clone(),
            trades.clone(),
            mappings.clone(),
            bus.clone(),
        ));

        let (sync_tx, sync_rx) = mpsc::channel(1);
        let state = AppState {
            opportunities: opportunities.clone(),
            trades,
            mappings,
            coordinator,
            bus,
            config: Config::default(),
            sync_tx,
        };

        Fixture {
            state,
            opportunities,
            _sync_rx: sync_rx,
        }
    }

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: Uuid::new_v4(),
            canonical_id: "btc-100k".to_string(),
            combined_cost: dec!(0.95),
            profit_potential: dec!(0.05),
            venue_a_yes: dec!(0.45),
            venue_a_no: dec!(0.55),
            venue_b_yes: dec!(0.50),
            venue_b_no: dec!(0.50),
            buy_side_a: Outcome::Yes,
            buy_side_b: Outcome::No,
            depth_a: dec!(2000),
            depth_b: dec!(3000),
            recommended_size: dec!(2000),
            estimated_fees: dec!(80),
            net_profit: dec!(20),
            status: OpportunityStatus::Detected,
            detected_at: Utc::now(),
            expires_at: None,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let fixture = fixture().await;
        let router = ApiServer::new(fixture.state).router();

        let response = router.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "dutchbook-engine");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_opportunities_listing() {
        let fixture = fixture().await;
        let opp = opportunity();
        fixture.opportunities.insert(&opp).await.unwrap();
        let router = ApiServer::new(fixture.state).router();

        let response = router.oneshot(get("/api/opportunities?limit=10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["canonical_id"], "btc-100k");
    }

    #[tokio::test]
    async fn test_active_opportunities_excludes_terminal() {
        let fixture = fixture().await;
        let live = opportunity();
        let mut done = opportunity();
        done.status = OpportunityStatus::Executed;
        fixture.opportunities.insert(&live).await.unwrap();
        fixture.opportunities.insert(&done).await.unwrap();
        let router = ApiServer::new(fixture.state).router();

        let response = router.oneshot(get("/api/opportunities/active")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], live.id.to_string());
    }

    #[tokio::test]
    async fn test_markets_endpoint() {
        let fixture = fixture().await;
        let router = ApiServer::new(fixture.state).router();

        let response = router.oneshot(get("/api/markets")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["canonical_id"], "btc-100k");
    }

    #[tokio::test]
    async fn test_execute_forbidden_while_auto_execute_off() {
        let fixture = fixture().await;
        let opp = opportunity();
        fixture.opportunities.insert(&opp).await.unwrap();
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .oneshot(post_empty(&format!("/api/execute/{}", opp.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["code"], "AUTO_EXECUTE_DISABLED");
    }

    #[tokio::test]
    async fn test_execute_unknown_opportunity_is_404() {
        let fixture = fixture().await;
        fixture.state.config.set_auto_execute(true);
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .oneshot(post_empty(&format!("/api/execute/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_success_roundtrip() {
        let fixture = fixture().await;
        fixture.state.config.set_auto_execute(true);
        let opp = opportunity();
        fixture.opportunities.insert(&opp).await.unwrap();
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .oneshot(post_empty(&format!("/api/execute/{}", opp.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["trades"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_inactive_opportunity_is_404() {
        let fixture = fixture().await;
        fixture.state.config.set_auto_execute(true);
        let mut opp = opportunity();
        opp.status = OpportunityStatus::Expired;
        fixture.opportunities.insert(&opp).await.unwrap();
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .oneshot(post_empty(&format!("/api/execute/{}", opp.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let fixture = fixture().await;
        let config = fixture.state.config.clone();
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .clone()
            .oneshot(get("/api/config"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["auto_execute"], false);

        let response = router
            .clone()
            .oneshot(post("/api/config", serde_json::json!({"auto_execute": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(config.auto_execute());
    }

    #[tokio::test]
    async fn test_config_rejects_immutable_fields() {
        let fixture = fixture().await;
        let router = ApiServer::new(fixture.state).router();

        let response = router
            .oneshot(post(
                "/api/config",
                serde_json::json!({"auto_execute": true, "arb_threshold": 0.9}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_market_sync_trigger() {
        let fixture = fixture().await;
        let router = ApiServer::new(fixture.state).router();

        let response = router.oneshot(post_empty("/api/markets/sync")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], "market sync triggered");
    }
}
