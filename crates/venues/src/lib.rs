//! Venue connectivity: streaming clients, the shared order book store,
//! and REST order adapters.
//!
//! Each venue gets one [`client::VenueClient`] holding a persistent
//! WebSocket. The client owns its desired-subscription set, replays it on
//! every reconnect, heartbeats the stream, and backs off per
//! [`backoff::ReconnectPolicy`]. Decoded books land in the
//! [`book_store::OrderBookStore`] (one writer per key) and are emitted as
//! [`client::VenueEvent`]s for the detector.
//!
//! The [`rest::VenueRestClient`] implements the order port used by the
//! execution coordinator and the market-listing fetch used by the resolver.

pub mod backoff;
pub mod book_store;
pub mod client;
pub mod error;
pub mod protocol;
pub mod rest;
pub mod venue_a;
pub mod venue_b;

pub use backoff::ReconnectPolicy;
pub use book_store::OrderBookStore;
pub use client::{ClientState, VenueClient, VenueClientConfig, VenueEvent};
pub use error::{VenueError, VenueErrorKind};
pub use protocol::{VenueFrame, VenueProtocol};
pub use rest::{VenueRestClient, VenueRestConfig};
pub use venue_a::VenueAProtocol;
pub use venue_b::VenueBProtocol;
