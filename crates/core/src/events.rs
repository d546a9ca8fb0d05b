//! In-process event bus.
//!
//! The detector publishes opportunities and the coordinator publishes
//! execution outcomes; the push channel and the auto-execute listener are
//! independent subscribers. Backed by a broadcast channel, so a lagging
//! subscriber drops the oldest events rather than stalling publishers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ArbitrageOpportunity, ExecutionReport};

/// Events fanned out to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// The detector emitted a new opportunity.
    OpportunityDetected(ArbitrageOpportunity),
    /// Both legs of an execution were placed.
    ExecutionSucceeded(ExecutionReport),
    /// An execution failed, with compensation recorded.
    ExecutionFailed(ExecutionReport),
}

impl EngineEvent {
    /// Returns the canonical id the event concerns.
    #[must_use]
    pub fn canonical_id(&self) -> Option<&str> {
        match self {
            Self::OpportunityDetected(opp) => Some(&opp.canonical_id),
            Self::ExecutionSucceeded(_) | Self::ExecutionFailed(_) => None,
        }
    }
}

/// Broadcast-backed fan-out of [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all subsequent events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event, returning the number of subscribers reached.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Returns the current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
