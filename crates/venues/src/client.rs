//! Generic venue streaming client.
//!
//! Maintains one long-lived WebSocket per venue and emits normalized
//! order-book events. The client owns the desired-subscription set; on
//! every (re)connect it replays that set to the venue rather than relying
//! on the stream to remember. Venue B additionally performs a post-open
//! auth handshake with a bounded deadline.
//!
//! State machine:
//!
//! ```text
//! Idle → Connecting → (AuthPending, venue B) → Open → Closing → Idle
//!                ↑                               │
//!                └──────── Reconnecting ◄────────┘  (close or error)
//! ```
//!
//! Reconnection backs off per [`ReconnectPolicy`]; exhaustion emits a fatal
//! error event and parks the client in `Idle` until `connect()` is called
//! again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dutchbook_core::{OrderBook, Venue};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::book_store::OrderBookStore;
use crate::error::{VenueError, VenueErrorKind};
use crate::protocol::{VenueFrame, VenueProtocol};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// =============================================================================
// Events and State
// =============================================================================

/// Events emitted by a venue client.
#[derive(Debug, Clone)]
pub enum VenueEvent {
    /// A normalized order book snapshot arrived.
    OrderBook {
        /// Source venue.
        venue: Venue,
        /// Venue market the snapshot is for.
        market_id: String,
        /// Normalized book.
        book: OrderBook,
    },
    /// The stream opened (and authenticated, where required).
    Connected {
        /// Source venue.
        venue: Venue,
    },
    /// The stream closed.
    Disconnected {
        /// Source venue.
        venue: Venue,
        /// Close reason.
        reason: String,
    },
    /// A stream error occurred.
    Error {
        /// Source venue.
        venue: Venue,
        /// Error classification.
        kind: VenueErrorKind,
        /// Human-readable detail.
        detail: String,
    },
}

/// Connection state, exposed for introspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection and none scheduled.
    Idle,
    /// Dialing the venue.
    Connecting,
    /// Stream open, waiting for the auth reply (venue B).
    AuthPending,
    /// Stream open and subscribed.
    Open,
    /// Tearing down on request.
    Closing,
    /// Waiting out a backoff delay.
    Reconnecting,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct VenueClientConfig {
    /// Streaming endpoint.
    pub ws_url: String,
    /// Liveness ping cadence while open.
    pub heartbeat_interval: Duration,
    /// Deadline for the venue B auth reply.
    pub auth_timeout: Duration,
    /// Backoff schedule for reconnection.
    pub reconnect: ReconnectPolicy,
}

impl VenueClientConfig {
    /// Creates a config with production defaults for the given endpoint.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            heartbeat_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Overrides the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Overrides the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Overrides the auth deadline.
    #[must_use]
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }
}

// =============================================================================
// Client Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

/// Handle to a venue client task.
#[derive(Clone)]
pub struct VenueClient {
    venue: Venue,
    desired: Arc<Mutex<BTreeSet<String>>>,
    command_tx: mpsc::Sender<Command>,
    state: Arc<RwLock<ClientState>>,
}

impl VenueClient {
    /// Spawns the client task. The client starts `Idle`; call
    /// [`VenueClient::connect`] to dial.
    pub fn spawn<P: VenueProtocol>(
        protocol: P,
        config: VenueClientConfig,
        books: OrderBookStore,
        events: mpsc::Sender<VenueEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let venue = protocol.venue();
        let desired = Arc::new(Mutex::new(BTreeSet::new()));
        let state = Arc::new(RwLock::new(ClientState::Idle));
        let (command_tx, command_rx) = mpsc::channel(64);

        tokio::spawn(run_client(
            protocol,
            config,
            books,
            Arc::clone(&desired),
            Arc::clone(&state),
            events,
            command_rx,
            shutdown,
        ));

        Self {
            venue,
            desired,
            command_tx,
            state,
        }
    }

    /// Returns the venue this client serves.
    #[must_use]
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Returns the desired-subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.desired.lock().iter().cloned().collect()
    }

    /// Opens (or re-opens) the stream.
    pub async fn connect(&self) {
        let _ = self.command_tx.send(Command::Connect).await;
    }

    /// Adds a market to the desired set; sends the subscription now if the
    /// stream is open, otherwise it is replayed on connect. Idempotent.
    pub async fn subscribe(&self, venue_market_id: &str) {
        let inserted = self.desired.lock().insert(venue_market_id.to_string());
        if inserted {
            let _ = self
                .command_tx
                .send(Command::Subscribe(venue_market_id.to_string()))
                .await;
        }
    }

    /// Removes a market from the desired set. Idempotent.
    pub async fn unsubscribe(&self, venue_market_id: &str) {
        let removed = self.desired.lock().remove(venue_market_id);
        if removed {
            let _ = self
                .command_tx
                .send(Command::Unsubscribe(venue_market_id.to_string()))
                .await;
        }
    }

    /// Cancels any pending reconnect, closes the stream, and clears the
    /// desired-subscription set.
    pub async fn disconnect(&self) {
        self.desired.lock().clear();
        let _ = self.command_tx.send(Command::Disconnect).await;
    }
}

// =============================================================================
// Connection Loop
// =============================================================================

enum SessionEnd {
    Shutdown,
    LocalDisconnect,
    Closed(String),
}

#[allow(clippy::too_many_arguments)]
async fn run_client<P: VenueProtocol>(
    protocol: P,
    config: VenueClientConfig,
    books: OrderBookStore,
    desired: Arc<Mutex<BTreeSet<String>>>,
    state: Arc<RwLock<ClientState>>,
    events: mpsc::Sender<VenueEvent>,
    mut command_rx: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = protocol.venue();
    let set_state = |s: ClientState| *state.write() = s;

    'idle: loop {
        set_state(ClientState::Idle);

        // Wait for an explicit connect while idle.
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                cmd = command_rx.recv() => match cmd {
                    Some(Command::Connect) => break,
                    Some(Command::Subscribe(_) | Command::Unsubscribe(_) | Command::Disconnect) => {}
                    None => return,
                },
            }
        }

        let mut failures: u32 = 0;
        'session: loop {
            if *shutdown.borrow() {
                set_state(ClientState::Idle);
                return;
            }

            set_state(ClientState::Connecting);
            let mut reached_open = false;
            let result = connect_and_run(
                &protocol,
                &config,
                &books,
                &desired,
                &state,
                &events,
                &mut command_rx,
                &mut shutdown,
                &mut reached_open,
            )
            .await;

            if reached_open {
                failures = 0;
            }

            match result {
                Ok(SessionEnd::Shutdown) => {
                    set_state(ClientState::Idle);
                    return;
                }
                Ok(SessionEnd::LocalDisconnect) => {
                    set_state(ClientState::Closing);
                    continue 'idle;
                }
                Ok(SessionEnd::Closed(reason)) => {
                    info!(venue = %venue, reason = %reason, "venue stream closed");
                    let _ = events
                        .send(VenueEvent::Disconnected {
                            venue,
                            reason: reason.clone(),
                        })
                        .await;
                }
                Err(e) => {
                    warn!(venue = %venue, error = %e, "venue stream failed");
                    let _ = events
                        .send(VenueEvent::Error {
                            venue,
                            kind: e.kind(),
                            detail: e.to_string(),
                        })
                        .await;
                    failures += 1;
                    if config.reconnect.exhausted(failures) {
                        error!(
                            venue = %venue,
                            attempts = failures,
                            "reconnect budget exhausted, client going idle"
                        );
                        let _ = events
                            .send(VenueEvent::Error {
                                venue,
                                kind: VenueErrorKind::MaxRetries,
                                detail: VenueError::MaxRetries { attempts: failures }
                                    .to_string(),
                            })
                            .await;
                        continue 'idle;
                    }
                }
            }

            // Backoff before the next attempt; cancellable by disconnect
            // or shutdown.
            set_state(ClientState::Reconnecting);
            let delay = config.reconnect.delay(failures);
            debug!(venue = %venue, delay = ?delay, failures, "scheduling reconnect");
            let deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    () = sleep_until(deadline) => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            set_state(ClientState::Idle);
                            return;
                        }
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(Command::Disconnect) => {
                            set_state(ClientState::Idle);
                            continue 'idle;
                        }
                        Some(Command::Connect) => break,
                        Some(Command::Subscribe(_) | Command::Unsubscribe(_)) => {}
                        None => return,
                    },
                }
            }
            continue 'session;
        }
    }
}

/// Runs one stream session: dial, authenticate, resubscribe, pump.
#[allow(clippy::too_many_arguments)]
async fn connect_and_run<P: VenueProtocol>(
    protocol: &P,
    config: &VenueClientConfig,
    books: &OrderBookStore,
    desired: &Arc<Mutex<BTreeSet<String>>>,
    state: &Arc<RwLock<ClientState>>,
    events: &mpsc::Sender<VenueEvent>,
    command_rx: &mut mpsc::Receiver<Command>,
    shutdown: &mut watch::Receiver<bool>,
    reached_open: &mut bool,
) -> Result<SessionEnd, VenueError> {
    let venue = protocol.venue();

    let (ws, _) = connect_async(&config.ws_url)
        .await
        .map_err(|e| VenueError::Connection(e.to_string()))?;
    let (mut write, mut read) = ws.split();

    if protocol.requires_auth() {
        *state.write() = ClientState::AuthPending;
        authenticate(protocol, config, &mut write, &mut read).await?;
    }

    *state.write() = ClientState::Open;
    *reached_open = true;
    info!(venue = %venue, "venue stream open");
    let _ = events.send(VenueEvent::Connected { venue }).await;

    // Re-issue every desired subscription; the stream remembers nothing.
    let snapshot: Vec<String> = desired.lock().iter().cloned().collect();
    let mut session_subscribed: BTreeSet<String> = BTreeSet::new();
    for market_id in snapshot {
        write
            .send(Message::Text(protocol.subscribe_frame(&market_id)))
            .await?;
        session_subscribed.insert(market_id);
    }

    let mut ping = interval(config.heartbeat_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.tick().await; // immediate first tick
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            }

            cmd = command_rx.recv() => match cmd {
                Some(Command::Subscribe(market_id)) => {
                    if session_subscribed.insert(market_id.clone()) {
                        write
                            .send(Message::Text(protocol.subscribe_frame(&market_id)))
                            .await?;
                    }
                }
                Some(Command::Unsubscribe(market_id)) => {
                    if session_subscribed.remove(&market_id) {
                        write
                            .send(Message::Text(protocol.unsubscribe_frame(&market_id)))
                            .await?;
                    }
                }
                Some(Command::Disconnect) => {
                    let _ = write.close().await;
                    return Ok(SessionEnd::LocalDisconnect);
                }
                Some(Command::Connect) => {}
                None => {
                    let _ = write.close().await;
                    return Ok(SessionEnd::LocalDisconnect);
                }
            },

            _ = ping.tick() => {
                // Two consecutive silent intervals count as a dead stream.
                if last_pong.elapsed() > config.heartbeat_interval * 2 {
                    return Ok(SessionEnd::Closed("heartbeat timeout".to_string()));
                }
                write.send(Message::Ping(Vec::new())).await?;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(protocol, &text, books, events).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Ok(text) = String::from_utf8(data) {
                        handle_frame(protocol, &text, books, events).await;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) => {
                    last_pong = Instant::now();
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "close frame".to_string());
                    return Ok(SessionEnd::Closed(reason));
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(SessionEnd::Closed("stream ended".to_string())),
            },
        }
    }
}

/// Sends the auth frame and waits for the venue's verdict.
async fn authenticate<P: VenueProtocol>(
    protocol: &P,
    config: &VenueClientConfig,
    write: &mut WsSink,
    read: &mut WsSource,
) -> Result<(), VenueError> {
    let frame = protocol
        .auth_frame()
        .ok_or_else(|| VenueError::Auth("protocol requires auth but has no frame".to_string()))?;
    write.send(Message::Text(frame)).await?;

    let wait = async {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match protocol.decode(&text) {
                    Ok(VenueFrame::AuthResult { success: true, .. }) => return Ok(()),
                    Ok(VenueFrame::AuthResult {
                        success: false,
                        message,
                    }) => {
                        return Err(VenueError::Auth(
                            message.unwrap_or_else(|| "credentials rejected".to_string()),
                        ));
                    }
                    // Anything else before the verdict is ignored.
                    Ok(_) | Err(_) => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(VenueError::Auth("stream closed during auth".to_string())),
            }
        }
    };

    match timeout(config.auth_timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(VenueError::Auth(format!(
            "no auth reply within {:?}",
            config.auth_timeout
        ))),
    }
}

/// Decodes and dispatches one inbound frame. Malformed frames are logged
/// and dropped without disturbing the stream.
async fn handle_frame<P: VenueProtocol>(
    protocol: &P,
    text: &str,
    books: &OrderBookStore,
    events: &mpsc::Sender<VenueEvent>,
) {
    let venue = protocol.venue();
    match protocol.decode(text) {
        Ok(VenueFrame::Book { market_id, book }) => {
            books.insert(venue, &market_id, book.clone());
            let _ = events
                .send(VenueEvent::OrderBook {
                    venue,
                    market_id,
                    book,
                })
                .await;
        }
        Ok(VenueFrame::AuthResult { .. } | VenueFrame::Ignored) => {}
        Err(e) => {
            warn!(venue = %venue, error = %e, "dropping malformed frame");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
