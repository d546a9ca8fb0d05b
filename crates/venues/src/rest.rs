//! Venue REST adapters for order placement, cancellation, status, and
//! market listings.
//!
//! One adapter per venue, sharing a single implementation parameterized by
//! the venue's auth header and field vocabulary. Requests are rate limited
//! and carry a 2 s connect / 10 s request timeout; a timed-out placement is
//! reported as a failed leg and handled by the coordinator's compensation
//! branch.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dutchbook_core::{OrderAck, OrderApi, OrderState, OrderTicket, TradingError, Venue, VenueMarket};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Configuration for one venue REST adapter.
#[derive(Clone)]
pub struct VenueRestConfig {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Venue API key.
    pub api_key: SecretString,
    /// Request budget per second.
    pub requests_per_second: NonZeroU32,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl VenueRestConfig {
    /// Creates a config with production defaults.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            requests_per_second: nonzero!(10u32),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for VenueRestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

/// REST adapter for one venue.
pub struct VenueRestClient {
    venue: Venue,
    config: VenueRestConfig,
    http: Client,
    limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for VenueRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRestClient")
            .field("venue", &self.venue)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawOrderResponse {
    order_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawMarketsResponse {
    markets: Option<Vec<RawMarket>>,
}

/// Market listing entry; venue A names the fields `id`/`description`,
/// venue B `ticker`/`subtitle`.
#[derive(Debug, Deserialize)]
struct RawMarket {
    #[serde(alias = "ticker")]
    id: String,
    title: Option<String>,
    #[serde(default, alias = "subtitle")]
    description: Option<String>,
}

fn map_order_state(raw: &str) -> Result<OrderState, TradingError> {
    match raw {
        "open" | "resting" | "pending" => Ok(OrderState::Open),
        "filled" | "executed" => Ok(OrderState::Filled),
        "cancelled" | "canceled" => Ok(OrderState::Cancelled),
        "rejected" => Ok(OrderState::Rejected),
        other => Err(TradingError::Malformed(format!(
            "unknown order status {other:?}"
        ))),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TradingError {
    if err.is_timeout() {
        TradingError::Timeout(err.to_string())
    } else if err.is_connect() {
        TradingError::Network(format!("connection failed: {err}"))
    } else {
        TradingError::Network(err.to_string())
    }
}

impl VenueRestClient {
    /// Creates the adapter.
    ///
    /// # Errors
    /// Returns [`TradingError::Network`] when the HTTP client cannot be
    /// built.
    pub fn new(venue: Venue, config: VenueRestConfig) -> Result<Self, TradingError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TradingError::Network(e.to_string()))?;
        let limiter = RateLimiter::direct(Quota::per_second(config.requests_per_second));
        Ok(Self {
            venue,
            config,
            http,
            limiter,
        })
    }

    fn auth_header(&self) -> (&'static str, String) {
        let key = self.config.api_key.expose_secret();
        match self.venue {
            Venue::A => ("Authorization", format!("Bearer {key}")),
            Venue::B => ("X-API-KEY", key.to_string()),
        }
    }

    fn order_body(&self, ticket: &OrderTicket) -> serde_json::Value {
        let market_field = match self.venue {
            Venue::A => "market",
            Venue::B => "market_ticker",
        };
        json!({
            market_field: ticket.venue_market_id,
            "action": "BUY",
            "side": ticket.side.as_str(),
            "size": ticket.size.to_string(),
            "price": ticket.limit_price.to_string(),
        })
    }

    async fn throttle(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl OrderApi for VenueRestClient {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderAck, TradingError> {
        self.throttle().await;
        let (header, value) = self.auth_header();
        let url = format!("{}/orders", self.config.base_url);
        debug!(
            venue = %self.venue,
            market_id = %ticket.venue_market_id,
            side = %ticket.side,
            size = %ticket.size,
            price = %ticket.limit_price,
            "placing order"
        );

        let response = self
            .http
            .post(&url)
            .header(header, value)
            .json(&self.order_body(ticket))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TradingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawOrderResponse = response.json().await.map_err(map_reqwest_error)?;
        match raw.status.as_deref() {
            Some("rejected") => Err(TradingError::Rejected(
                raw.message.unwrap_or_else(|| "order rejected".to_string()),
            )),
            _ => {
                let order_id = raw.order_id.ok_or_else(|| {
                    TradingError::Malformed("order response missing order_id".to_string())
                })?;
                Ok(OrderAck {
                    order_id,
                    accepted_at: Utc::now(),
                })
            }
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        self.throttle().await;
        let (header, value) = self.auth_header();
        let url = format!("{}/orders/{order_id}/cancel", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .header(header, value)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            warn!(venue = %self.venue, order_id, status = %status, "cancel failed");
            Err(TradingError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderState, TradingError> {
        self.throttle().await;
        let (header, value) = self.auth_header();
        let url = format!("{}/orders/{order_id}", self.config.base_url);

        let response = self
            .http
            .get(&url)
            .header(header, value)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TradingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawStatusResponse = response.json().await.map_err(map_reqwest_error)?;
        map_order_state(&raw.status)
    }

    async fn list_markets(&self) -> Result<Vec<VenueMarket>, TradingError> {
        self.throttle().await;
        let (header, value) = self.auth_header();
        let url = format!("{}/markets?limit=500", self.config.base_url);

        let response = self
            .http
            .get(&url)
            .header(header, value)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TradingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawMarketsResponse = response.json().await.map_err(map_reqwest_error)?;
        let markets = raw
            .markets
            .unwrap_or_default()
            .into_iter()
            .map(|m| VenueMarket {
                venue: self.venue,
                venue_market_id: m.id,
                title: m.title.unwrap_or_default(),
                description: m.description,
            })
            .collect();
        Ok(markets)
    }
}
