//! Wire codec for Venue A's streaming feed.
//!
//! Venue A frames an envelope with a `type` discriminator and quotes depth
//! as `[price, size]` string pairs, prices in decimal dollars (sometimes
//! with the leading zero elided). No stream authentication is required.

use chrono::{DateTime, TimeZone, Utc};
use dutchbook_core::{OrderBook, PriceLevel, Venue};
use serde::Deserialize;
use serde_json::json;

use crate::error::VenueError;
use crate::protocol::{parse_decimal, VenueFrame, VenueProtocol};

/// Codec for Venue A.
#[derive(Debug, Clone, Default)]
pub struct VenueAProtocol;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(flatten)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BookPayload {
    market: String,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
    #[serde(default)]
    ts: Option<i64>,
}

fn parse_levels(raw: &[[String; 2]]) -> Result<Vec<PriceLevel>, VenueError> {
    raw.iter()
        .map(|[price, size]| {
            Ok(PriceLevel::new(parse_decimal(price)?, parse_decimal(size)?))
        })
        .collect()
}

fn timestamp_from_millis(ts: Option<i64>) -> DateTime<Utc> {
    ts.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

impl VenueProtocol for VenueAProtocol {
    fn venue(&self) -> Venue {
        Venue::A
    }

    fn subscribe_frame(&self, venue_market_id: &str) -> String {
        json!({
            "type": "subscribe",
            "channel": "book",
            "market": venue_market_id,
        })
        .to_string()
    }

    fn unsubscribe_frame(&self, venue_market_id: &str) -> String {
        json!({
            "type": "unsubscribe",
            "channel": "book",
            "market": venue_market_id,
        })
        .to_string()
    }

    fn decode(&self, raw: &str) -> Result<VenueFrame, VenueError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        match envelope.msg_type.as_str() {
            "book" => {
                let payload: BookPayload = serde_json::from_value(envelope.payload)?;
                let book = OrderBook::new(
                    parse_levels(&payload.bids)?,
                    parse_levels(&payload.asks)?,
                    timestamp_from_millis(payload.ts),
                );
                Ok(VenueFrame::Book {
                    market_id: payload.market,
                    book,
                })
            }
            "subscribed" | "unsubscribed" | "trade" | "heartbeat" => Ok(VenueFrame::Ignored),
            other => Err(VenueError::Protocol(format!("unknown frame type {other:?}"))),
        }
    }
}
