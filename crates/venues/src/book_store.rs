//! Shared order book snapshots keyed by `(venue, venue_market_id)`.
//!
//! Each venue client is the single writer for its own keys; the detector
//! holds read-only clones. Readers may observe a snapshot slightly older
//! than the latest write.

use dutchbook_core::{OrderBook, Venue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory map of current order books.
#[derive(Debug, Clone, Default)]
pub struct OrderBookStore {
    inner: Arc<RwLock<HashMap<(Venue, String), OrderBook>>>,
}

impl OrderBookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot for a key.
    pub fn insert(&self, venue: Venue, venue_market_id: &str, book: OrderBook) {
        self.inner
            .write()
            .insert((venue, venue_market_id.to_string()), book);
    }

    /// Returns the current snapshot for a key. Unknown keys are absent,
    /// not an error.
    #[must_use]
    pub fn get(&self, venue: Venue, venue_market_id: &str) -> Option<OrderBook> {
        self.inner
            .read()
            .get(&(venue, venue_market_id.to_string()))
            .cloned()
    }

    /// Returns the market ids currently tracked for a venue.
    #[must_use]
    pub fn market_ids(&self, venue: Venue) -> Vec<String> {
        self.inner
            .read()
            .keys()
            .filter(|(v, _)| *v == venue)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dutchbook_core::PriceLevel;
    use rust_decimal_macros::dec;

    fn book(bid: rust_decimal::Decimal) -> OrderBook {
        OrderBook::new(
            vec![PriceLevel::new(bid, dec!(100))],
            vec![PriceLevel::new(bid + dec!(0.02), dec!(100))],
            Utc::now(),
        )
    }

    #[test]
    fn test_absent_key_returns_none() {
        let store = OrderBookStore::new();
        assert!(store.get(Venue::A, "missing").is_none());
    }

    #[test]
    fn test_insert_then_get() {
        let store = OrderBookStore::new();
        store.insert(Venue::A, "m1", book(dec!(0.44)));

        let fetched = store.get(Venue::A, "m1").unwrap();
        assert_eq!(fetched.best_bid(), Some(dec!(0.44)));
    }

    #[test]
    fn test_same_market_id_is_distinct_per_venue() {
        let store = OrderBookStore::new();
        store.insert(Venue::A, "m1", book(dec!(0.44)));
        store.insert(Venue::B, "m1", book(dec!(0.48)));

        assert_eq!(store.get(Venue::A, "m1").unwrap().best_bid(), Some(dec!(0.44)));
        assert_eq!(store.get(Venue::B, "m1").unwrap().best_bid(), Some(dec!(0.48)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_insert_replaces_snapshot() {
        let store = OrderBookStore::new();
        store.insert(Venue::A, "m1", book(dec!(0.44)));
        store.insert(Venue::A, "m1", book(dec!(0.46)));

        assert_eq!(store.get(Venue::A, "m1").unwrap().best_bid(), Some(dec!(0.46)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_market_ids_filters_by_venue() {
        let store = OrderBookStore::new();
        store.insert(Venue::A, "m1", book(dec!(0.44)));
        store.insert(Venue::A, "m2", book(dec!(0.45)));
        store.insert(Venue::B, "m3", book(dec!(0.46)));

        let mut ids = store.market_ids(Venue::A);
        ids.sort();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn test_clones_share_state() {
        let store = OrderBookStore::new();
        let reader = store.clone();
        store.insert(Venue::B, "m1", book(dec!(0.50)));

        assert!(reader.get(Venue::B, "m1").is_some());
    }
}
