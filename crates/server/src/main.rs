//! tidecache worker entry point.
//!
//! Boots the caching worker on a stdio transport. Logging goes to stderr to
//! avoid interfering with the event protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use tidecache_client::{FetchConfig, HttpNetwork, Network};
use tidecache_core::{AppConfig, CacheDb, CacheRegistry};
use tidecache_server::{Worker, stdio};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.version, origin = %config.origin, "Starting tidecache worker on stdio transport");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database at {}", config.db_path.display()))?;
    let registry = CacheRegistry::new(db, config.version.clone());
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);
    let worker = Worker::new(config, registry, network)?;

    stdio::serve(Arc::new(worker), tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("host closed input, shutting down");
    Ok(())
}
