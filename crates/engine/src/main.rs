//! Engine entry point: load configuration, connect storage, start the
//! pipeline, and serve the API until shutdown.

use anyhow::Context;
use dutchbook_core::Config;
use tracing_subscriber::EnvFilter;

mod app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("configuration error")?;
    app::run(config).await
}
