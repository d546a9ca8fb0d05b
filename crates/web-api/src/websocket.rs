//! Server-to-client push channel.
//!
//! On accept the socket receives a `connected` frame and a bounded
//! newest-first replay of recent opportunities, then live bus events.
//! Inbound frames are not part of the protocol; malformed text earns an
//! `error` frame and the connection stays up.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use dutchbook_core::{ArbitrageOpportunity, EngineEvent, ExecutionReport};

use crate::state::AppState;

/// Upper bound on the opportunity replay sent at accept time.
const REPLAY_LIMIT: i64 = 50;

/// Frames pushed to subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// Sent once on accept.
    Connected {
        /// Connection metadata.
        data: Value,
    },
    /// A detected opportunity (live or replayed).
    ArbitrageOpportunity {
        /// The opportunity.
        data: ArbitrageOpportunity,
    },
    /// Both legs of an execution were placed.
    ExecutionSuccess {
        /// The execution report.
        data: ExecutionReport,
    },
    /// An execution failed.
    ExecutionFailed {
        /// The execution report.
        data: ExecutionReport,
    },
    /// The client sent something we could not parse.
    Error {
        /// What went wrong.
        error: String,
    },
}

impl PushFrame {
    fn from_event(event: EngineEvent) -> Self {
        match event {
            EngineEvent::OpportunityDetected(opportunity) => {
                Self::ArbitrageOpportunity { data: opportunity }
            }
            EngineEvent::ExecutionSucceeded(report) => Self::ExecutionSuccess { data: report },
            EngineEvent::ExecutionFailed(report) => Self::ExecutionFailed { data: report },
        }
    }

    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                warn!(error = %e, "failed to serialize push frame");
                None
            }
        }
    }
}

/// `GET /ws`
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| push_connection(socket, state))
}

async fn push_connection(mut socket: WebSocket, state: AppState) {
    // Subscribe before the replay so no event published during the replay
    // is lost.
    let mut events = state.bus.subscribe();

    let connected = PushFrame::Connected {
        data: serde_json::json!({
            "service": "dutchbook-engine",
            "timestamp": Utc::now(),
        }),
    };
    if send_frame(&mut socket, &connected).await.is_err() {
        return;
    }

    // Bounded newest-first history.
    match state.opportunities.recent(REPLAY_LIMIT).await {
        Ok(recent) => {
            for opportunity in recent {
                let frame = PushFrame::ArbitrageOpportunity { data: opportunity };
                if send_frame(&mut socket, &frame).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "opportunity replay unavailable"),
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = PushFrame::from_event(event);
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push subscriber lagged, events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },

            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if serde_json::from_str::<Value>(&text).is_err() {
                        let frame = PushFrame::Error {
                            error: "malformed message".to_string(),
                        };
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("push connection closed");
}

async fn send_frame(socket: &mut WebSocket, frame: &PushFrame) -> Result<(), ()> {
    match frame.to_message() {
        Some(message) => socket.send(message).await.map_err(|_| ()),
        None => Ok(()),
    }
}
