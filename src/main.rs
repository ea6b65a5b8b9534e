mod api_doc;
mod app;
mod bootstrap;
mod codec;
mod config;
mod error;
mod handlers;
mod instrument;
mod log_info;
mod memory;
mod metrics;
mod models;
mod routes;
mod spanner;
mod state;
mod store;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("rawkv-proxy starting");

    let config = Config::from_env()?;
    config.log_startup();

    bootstrap::run(
        Arc::new(config),
        |config| async move { store::connect(&config).await },
        bootstrap::shutdown_signal(),
    )
    .await?;

    Ok(())
}
