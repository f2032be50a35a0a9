//! Node lifecycle: cluster setup, housekeeping, ordered shutdown.

use std::sync::Arc;
use std::time::Duration;

use corvid_cluster::{Cluster, MemberList, SharedCluster};
use corvid_router::{ClusterRouter, MemoryPresenceStore};
use tracing::info;

use crate::config::NodeConfig;
use crate::error::Error;

/// A running corvid node.
pub struct Node {
    cluster: SharedCluster,
    router: ClusterRouter,
    presences: Arc<MemoryPresenceStore>,
    shutdown_timeout: Duration,
}

impl Node {
    /// Build the cluster subsystem from configuration and start the node.
    pub async fn start(config: NodeConfig) -> Result<Self, Error> {
        let cluster = Arc::new(Cluster::new(&config.cluster, config.allocation_id.clone())?);
        Self::start_with_cluster(cluster, config).await
    }

    /// Start the node on an already built cluster handle.
    pub async fn start_with_cluster(cluster: SharedCluster, config: NodeConfig) -> Result<Self, Error> {
        let presences = Arc::new(MemoryPresenceStore::new());
        let router =
            ClusterRouter::from_cluster(cluster.clone(), presences.clone(), config.router.clone())
                .await?;

        info!(
            member = %cluster.local_member(),
            housekeeping_interval_ms = config.router.housekeeping_interval.as_millis() as u64,
            "node started"
        );

        Ok(Self {
            cluster,
            router,
            presences,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Get the cluster handle.
    pub fn cluster(&self) -> &SharedCluster {
        &self.cluster
    }

    /// Get the cluster router.
    pub fn router(&self) -> &ClusterRouter {
        &self.router
    }

    /// Get the presence store.
    pub fn presences(&self) -> &Arc<MemoryPresenceStore> {
        &self.presences
    }

    /// Stop housekeeping, then leave the cluster within the shutdown deadline.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.router.stop().await;
        self.cluster.shutdown(self.shutdown_timeout).await?;
        info!("node shut down");
        Ok(())
    }
}
