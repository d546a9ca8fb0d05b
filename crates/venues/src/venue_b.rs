//! Wire codec for Venue B's streaming feed.
//!
//! Venue B frames an envelope with an `op` discriminator, quotes depth in
//! integer cents as `[price_cents, size]` pairs on the YES side, and
//! requires an auth frame immediately after the stream opens. The auth
//! reply must arrive within the client's handshake deadline.

use chrono::{DateTime, Utc};
use dutchbook_core::{OrderBook, PriceLevel, Venue};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::error::VenueError;
use crate::protocol::{VenueFrame, VenueProtocol};

/// Codec for Venue B.
pub struct VenueBProtocol {
    api_key: SecretString,
}

impl VenueBProtocol {
    /// Creates the codec with the key sent in the auth handshake.
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }
}

impl std::fmt::Debug for VenueBProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueBProtocol")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: String,
    #[serde(flatten)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AuthResultPayload {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookPayload {
    market_ticker: String,
    yes_bids: Vec<[i64; 2]>,
    yes_asks: Vec<[i64; 2]>,
    #[serde(default)]
    ts: Option<String>,
}

fn cents_levels(raw: &[[i64; 2]]) -> Result<Vec<PriceLevel>, VenueError> {
    raw.iter()
        .map(|&[cents, size]| {
            if !(0..=100).contains(&cents) {
                return Err(VenueError::Protocol(format!(
                    "price out of range: {cents} cents"
                )));
            }
            if size < 0 {
                return Err(VenueError::Protocol(format!("negative size: {size}")));
            }
            Ok(PriceLevel::new(
                Decimal::new(cents, 2),
                Decimal::from(size),
            ))
        })
        .collect()
}

fn timestamp_from_rfc3339(ts: Option<&str>) -> DateTime<Utc> {
    ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

impl VenueProtocol for VenueBProtocol {
    fn venue(&self) -> Venue {
        Venue::B
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn auth_frame(&self) -> Option<String> {
        Some(
            json!({
                "op": "auth",
                "api_key": self.api_key.expose_secret(),
            })
            .to_string(),
        )
    }

    fn subscribe_frame(&self, venue_market_id: &str) -> String {
        json!({
            "op": "subscribe",
            "market_ticker": venue_market_id,
        })
        .to_string()
    }

    fn unsubscribe_frame(&self, venue_market_id: &str) -> String {
        json!({
            "op": "unsubscribe",
            "market_ticker": venue_market_id,
        })
        .to_string()
    }

    fn decode(&self, raw: &str) -> Result<VenueFrame, VenueError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        match envelope.op.as_str() {
            "auth_result" => {
                let payload: AuthResultPayload = serde_json::from_value(envelope.payload)?;
                Ok(VenueFrame::AuthResult {
                    success: payload.success,
                    message: payload.message,
                })
            }
            "book_snapshot" => {
                let payload: BookPayload = serde_json::from_value(envelope.payload)?;
                let book = OrderBook::new(
                    cents_levels(&payload.yes_bids)?,
                    cents_levels(&payload.yes_asks)?,
                    timestamp_from_rfc3339(payload.ts.as_deref()),
                );
                Ok(VenueFrame::Book {
                    market_id: payload.market_ticker,
                    book,
                })
            }
            "subscribed" | "unsubscribed" | "fill" | "heartbeat" => Ok(VenueFrame::Ignored),
            other => Err(VenueError::Protocol(format!("unknown op {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn codec() -> VenueBProtocol {
        VenueBProtocol::new(SecretString::new("test-key".to_string()))
    }

    #[test]
    fn test_auth_frame_carries_key() {
        let frame = codec().auth_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], "auth");
        assert_eq!(value["api_key"], "test-key");
    }

    #[test]
    fn test_requires_auth() {
        assert!(codec().requires_auth());
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains("test-key"));
    }

    #[test]
    fn test_decode_auth_result() {
        let ok = codec().decode(r#"{"op":"auth_result","success":true}"#).unwrap();
        assert_eq!(
            ok,
            VenueFrame::AuthResult {
                success: true,
                message: None
            }
        );

        let denied = codec()
            .decode(r#"{"op":"auth_result","success":false,"message":"bad key"}"#)
            .unwrap();
        assert_eq!(
            denied,
            VenueFrame::AuthResult {
                success: false,
                message: Some("bad key".to_string())
            }
        );
    }

    #[test]
    fn test_decode_book_snapshot_converts_cents() {
        let raw = r#"{
            "op": "book_snapshot",
            "market_ticker": "EVT-YES",
            "yes_bids": [[49, 1800], [48, 1200]],
            "yes_asks": [[51, 1000]],
            "ts": "2024-12-01T15:30:00Z"
        }"#;

        match codec().decode(raw).unwrap() {
            VenueFrame::Book { market_id, book } => {
                assert_eq!(market_id, "EVT-YES");
                assert_eq!(book.best_bid(), Some(dec!(0.49)));
                assert_eq!(book.best_ask(), Some(dec!(0.51)));
                assert_eq!(book.total_depth(), dec!(4000));
            }
            other => panic!("expected book frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range_cents() {
        let raw = r#"{"op":"book_snapshot","market_ticker":"m","yes_bids":[[140,10]],"yes_asks":[]}"#;
        assert!(matches!(
            codec().decode(raw),
            Err(VenueError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_rejects_negative_size() {
        let raw = r#"{"op":"book_snapshot","market_ticker":"m","yes_bids":[[40,-5]],"yes_asks":[]}"#;
        assert!(matches!(
            codec().decode(raw),
            Err(VenueError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_unknown_op_is_protocol_error() {
        assert!(matches!(
            codec().decode(r#"{"op":"mystery"}"#),
            Err(VenueError::Protocol(_))
        ));
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = codec().subscribe_frame("EVT-YES");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["market_ticker"], "EVT-YES");
    }
}
