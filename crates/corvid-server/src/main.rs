//! Corvid Server - Cluster node.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corvid_server::{Args, Node};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "corvid_server=info,corvid_cluster=info,corvid_router=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting corvid node");

    // Parse command-line arguments
    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        allocation_id = %config.allocation_id,
        cluster_type = %config.cluster.cluster_type,
        port = config.cluster.port,
        alive_ttl_ms = config.cluster.alive_ttl_ms,
        "configuration loaded"
    );

    let node = Node::start(config).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
    } else {
        tracing::info!("received shutdown signal");
    }

    match node.shutdown().await {
        Ok(()) => {
            tracing::info!("node shutdown complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "node shutdown failed");
            return Err(e.into());
        }
    }

    Ok(())
}
