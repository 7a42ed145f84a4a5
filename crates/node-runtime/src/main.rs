//! # LC Node
//!
//! Entry point of a single devnet node.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (defaults overlaid with `LC_*` variables)
//! 3. Start the runtime: chain, genesis, workers
//! 4. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use node_runtime::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;

    let config = NodeConfig::from_env().context("loading configuration")?;

    info!("===========================================");
    info!("  LC Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Role: {:?} #{}  ({} miners, {} sharders)",
        config.devnet.role, config.devnet.node_index, config.devnet.miners, config.devnet.sharders
    );
    info!("===========================================");

    let runtime = NodeRuntime::start(config).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
