//! Router assembly and serving.

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::websocket;

/// API server for the arbitrage engine.
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Creates the server over shared state.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Builds the router with all API routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/opportunities", get(handlers::list_opportunities))
            .route(
                "/api/opportunities/active",
                get(handlers::active_opportunities),
            )
            .route("/api/markets", get(handlers::list_markets))
            .route("/api/markets/sync", post(handlers::trigger_market_sync))
            .route("/api/trades", get(handlers::list_trades))
            .route(
                "/api/execute/:opportunity_id",
                post(handlers::execute_opportunity),
            )
            .route(
                "/api/execute/:opportunity_id/cancel",
                post(handlers::cancel_execution),
            )
            .route(
                "/api/config",
                get(handlers::get_config).post(handlers::update_config),
            )
            .route("/ws", get(websocket::websocket_handler))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves until the shutdown signal fires.
    ///
    /// # Errors
    /// Returns an error when the listener cannot bind or serving fails.
    pub async fn serve(
        self,
        addr: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "web API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        Ok(())
    }
}
