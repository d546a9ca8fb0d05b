//! Task wiring and lifecycle.
//!
//! Startup order: database (fatal on failure), stores, venue clients,
//! detector, coordinator, market-sync loop, web server. A single watch
//! channel fans the shutdown signal out to every task: venue clients tear
//! down their streams, the detector stops consuming, the auto-execute
//! listener finishes in-flight work, and the server stops accepting.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use dutchbook_arbitrage::{
    install_mappings, shared_index, ArbitrageDetector, CoordinatorConfig, DetectorConfig,
    ExecutionCoordinator, SharedMappingIndex,
};
use dutchbook_core::{Config, EventBus, MappingStore, OpportunityStore, OrderApi, TradeStore, Venue};
use dutchbook_matching::{MarketResolver, ResolverConfig};
use dutchbook_store::{PgMappingStore, PgOpportunityStore, PgTradeStore};
use dutchbook_venues::{
    OrderBookStore, VenueAProtocol, VenueBProtocol, VenueClient, VenueClientConfig,
    VenueRestClient, VenueRestConfig,
};
use dutchbook_web_api::{ApiServer, AppState};

/// Runs the engine until the shutdown signal.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // Loss of database connectivity at startup is fatal.
    let pool = dutchbook_store::connect(&config.database_url)
        .await
        .context("database connection failed")?;
    dutchbook_store::init_schema(&pool).await?;

    let mappings: Arc<dyn MappingStore> = Arc::new(PgMappingStore::new(pool.clone()));
    let opportunities: Arc<dyn OpportunityStore> = Arc::new(PgOpportunityStore::new(pool.clone()));
    let trades: Arc<dyn TradeStore> = Arc::new(PgTradeStore::new(pool));

    let bus = EventBus::new(256);
    let books = OrderBookStore::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (venue_events_tx, venue_events_rx) = mpsc::channel(1024);

    // Streaming clients, one per venue.
    let client_a = VenueClient::spawn(
        VenueAProtocol,
        VenueClientConfig::new(&config.venue_a.ws_url),
        books.clone(),
        venue_events_tx.clone(),
        shutdown_rx.clone(),
    );
    let client_b = VenueClient::spawn(
        VenueBProtocol::new(config.venue_b.api_key.clone()),
        VenueClientConfig::new(&config.venue_b.ws_url),
        books.clone(),
        venue_events_tx,
        shutdown_rx.clone(),
    );
    client_a.connect().await;
    client_b.connect().await;

    // Outbound order adapters.
    let api_a: Arc<dyn OrderApi> = Arc::new(VenueRestClient::new(
        Venue::A,
        VenueRestConfig::new(&config.venue_a.api_url, config.venue_a.api_key.clone()),
    )?);
    let api_b: Arc<dyn OrderApi> = Arc::new(VenueRestClient::new(
        Venue::B,
        VenueRestConfig::new(&config.venue_b.api_url, config.venue_b.api_key.clone()),
    )?);

    // Canonical index, seeded from stored mappings, and the subscription
    // bootstrap derived from them.
    let index = shared_index();
    let stored = mappings.all().await?;
    install_mappings(&index, &stored);
    ArbitrageDetector::bootstrap_subscriptions(&stored, &client_a, &client_b).await;
    info!(mappings = stored.len(), "engine starting");

    // Detector.
    let detector = ArbitrageDetector::new(
        DetectorConfig::from_config(&config),
        index.clone(),
        opportunities.clone(),
        bus.clone(),
    );
    let detector_task = tokio::spawn(detector.run(venue_events_rx, shutdown_rx.clone()));

    // Coordinator and the auto-execute listener.
    let coordinator = Arc::new(ExecutionCoordinator::new(
        CoordinatorConfig {
            max_position_size: config.max_position_size,
        },
        api_a.clone(),
        api_b.clone(),
        opportunities.clone(),
        trades.clone(),
        mappings.clone(),
        bus.clone(),
    ));
    let auto_execute_task = tokio::spawn(coordinator.clone().run_auto_execute(
        bus.subscribe(),
        config.auto_execute_flag(),
        shutdown_rx.clone(),
    ));

    // Market-sync loop: periodic plus on-demand from the API.
    let (sync_tx, sync_rx) = mpsc::channel(1);
    let sync_task = tokio::spawn(run_market_sync(
        config.clone(),
        api_a,
        api_b,
        mappings.clone(),
        index,
        client_a,
        client_b,
        sync_rx,
        shutdown_rx.clone(),
    ));

    // Web surface.
    let state = AppState {
        opportunities,
        trades,
        mappings,
        coordinator,
        bus,
        config: config.clone(),
        sync_tx,
    };
    let addr = format!("0.0.0.0:{}", config.port);
    let server_task = tokio::spawn(ApiServer::new(state).serve(addr, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let (detector_res, auto_res, sync_res, server_res) =
        tokio::join!(detector_task, auto_execute_task, sync_task, server_task);
    for (name, result) in [
        ("detector", detector_res.map(|()| anyhow::Ok(()))),
        ("auto-execute", auto_res.map(|()| anyhow::Ok(()))),
        ("market-sync", sync_res.map(|()| anyhow::Ok(()))),
        ("server", server_res),
    ] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = name, error = %e, "task failed"),
            Err(e) => error!(task = name, error = %e, "task panicked"),
        }
    }

    info!("engine stopped");
    Ok(())
}

/// Periodic and on-demand market synchronization.
#[allow(clippy::too_many_arguments)]
async fn run_market_sync(
    config: Config,
    api_a: Arc<dyn OrderApi>,
    api_b: Arc<dyn OrderApi>,
    mappings: Arc<dyn MappingStore>,
    index: SharedMappingIndex,
    client_a: VenueClient,
    client_b: VenueClient,
    mut trigger: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let resolver = MarketResolver::new(ResolverConfig {
        similarity_threshold: config.similarity_threshold,
    });
    let mut ticker = tokio::time::interval(config.market_sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("market sync stopping");
                    return;
                }
            }
            _ = ticker.tick() => {
                sync_once(&resolver, &api_a, &api_b, &mappings, &index, &client_a, &client_b).await;
            }
            nudge = trigger.recv() => match nudge {
                Some(()) => {
                    sync_once(&resolver, &api_a, &api_b, &mappings, &index, &client_a, &client_b)
                        .await;
                }
                None => {
                    info!("sync trigger channel closed, market sync stopping");
                    return;
                }
            },
        }
    }
}

async fn sync_once(
    resolver: &MarketResolver,
    api_a: &Arc<dyn OrderApi>,
    api_b: &Arc<dyn OrderApi>,
    mappings: &Arc<dyn MappingStore>,
    index: &SharedMappingIndex,
    client_a: &VenueClient,
    client_b: &VenueClient,
) {
    match resolver
        .sync(api_a.as_ref(), api_b.as_ref(), mappings.as_ref())
        .await
    {
        Ok(report) => {
            // Republish the index and pick up subscriptions for any newly
            // mapped markets.
            match mappings.all().await {
                Ok(stored) => {
                    install_mappings(index, &stored);
                    ArbitrageDetector::bootstrap_subscriptions(&stored, client_a, client_b).await;
                }
                Err(e) => warn!(error = %e, "could not reload mappings after sync"),
            }
            info!(
                matched = report.matched,
                created = report.created,
                updated = report.updated,
                "market sync finished"
            );
        }
        // Prior mappings remain in effect on a failed sync.
        Err(e) => warn!(error = %e, "market sync failed"),
    }
}
