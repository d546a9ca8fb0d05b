//! Venue wire protocol abstraction.
//!
//! Each venue speaks its own envelope and depth encoding; the codec maps
//! raw frames onto [`VenueFrame`] so the client loop stays venue-agnostic.

use dutchbook_core::{OrderBook, Venue};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::VenueError;

/// A decoded inbound frame, normalized across venues.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueFrame {
    /// Full order book snapshot for one market.
    Book {
        /// Venue market identifier.
        market_id: String,
        /// Normalized book: prices in `[0, 1]`, non-negative sizes.
        book: OrderBook,
    },
    /// Reply to the auth handshake (venue B only).
    AuthResult {
        /// Whether the venue accepted the credentials.
        success: bool,
        /// Optional venue-provided detail.
        message: Option<String>,
    },
    /// A frame we recognize but do not act on (acks, trades, notices).
    Ignored,
}

/// Wire codec for one venue's streaming protocol.
pub trait VenueProtocol: Send + Sync + 'static {
    /// The venue this codec speaks for.
    fn venue(&self) -> Venue;

    /// True when the venue requires a post-open auth handshake.
    fn requires_auth(&self) -> bool {
        false
    }

    /// The auth frame to send immediately after open, if any.
    fn auth_frame(&self) -> Option<String> {
        None
    }

    /// Encodes a subscription request for one market.
    fn subscribe_frame(&self, venue_market_id: &str) -> String;

    /// Encodes an unsubscription request for one market.
    fn unsubscribe_frame(&self, venue_market_id: &str) -> String;

    /// Decodes one raw text frame.
    ///
    /// # Errors
    /// Returns [`VenueError::Protocol`] for frames that cannot be decoded;
    /// the client logs and drops these without disturbing the stream.
    fn decode(&self, raw: &str) -> Result<VenueFrame, VenueError>;
}

/// Parses a decimal string, accepting the bare-dot shorthand (".48")
/// some venues emit.
pub(crate) fn parse_decimal(s: &str) -> Result<Decimal, VenueError> {
    let normalized = if s.starts_with('.') {
        format!("0{s}")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized)
        .map_err(|e| VenueError::Protocol(format!("bad decimal {s:?}: {e}")))
}
