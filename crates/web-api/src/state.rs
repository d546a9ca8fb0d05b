//! Shared state handed to every handler.

use std::sync::Arc;

use tokio::sync::mpsc;

use dutchbook_arbitrage::ExecutionCoordinator;
use dutchbook_core::{Config, EventBus, MappingStore, OpportunityStore, TradeStore};

/// Handler state: storage ports, the coordinator, the event bus, and the
/// process configuration (whose auto-execute flag is shared and mutable).
#[derive(Clone)]
pub struct AppState {
    /// Opportunity reads for list endpoints and the execute gate.
    pub opportunities: Arc<dyn OpportunityStore>,
    /// Trade reads for list endpoints.
    pub trades: Arc<dyn TradeStore>,
    /// Canonical mapping reads for the markets endpoint.
    pub mappings: Arc<dyn MappingStore>,
    /// Execution entry points.
    pub coordinator: Arc<ExecutionCoordinator>,
    /// Event fan-out consumed by the push channel.
    pub bus: EventBus,
    /// Process configuration snapshot.
    pub config: Config,
    /// Nudges the engine's market-sync task.
    pub sync_tx: mpsc::Sender<()>,
}
