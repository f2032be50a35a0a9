//! Node configuration.

use std::time::Duration;

use clap::Parser;
use corvid_cluster::config::{DEFAULT_ALIVE_TTL_MS, DEFAULT_PORT};
use corvid_cluster::{ClusterConfig, ClusterType};
use corvid_router::RouterConfig;

use crate::error::Error;

/// Default housekeeping interval in milliseconds.
pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 3000;

/// Default shutdown deadline in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Corvid node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identifier of this node process.
    pub allocation_id: String,

    /// Cluster subsystem configuration.
    pub cluster: ClusterConfig,

    /// Router configuration.
    pub router: RouterConfig,

    /// Deadline for leaving the cluster on shutdown.
    pub shutdown_timeout: Duration,
}

impl NodeConfig {
    /// Create a configuration with a freshly generated allocation ID.
    pub fn new(cluster: ClusterConfig) -> Self {
        Self {
            allocation_id: new_allocation_id(),
            cluster,
            router: RouterConfig::default(),
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }

    /// Set the allocation ID.
    pub fn with_allocation_id(mut self, allocation_id: impl Into<String>) -> Self {
        self.allocation_id = allocation_id.into();
        self
    }

    /// Set the router configuration.
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Set the shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

fn new_allocation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Command-line arguments for the node.
#[derive(Parser, Debug)]
#[command(name = "corvid-server")]
#[command(version, about = "Corvid cluster node", long_about = None)]
pub struct Args {
    /// Allocation ID of this process (generated when omitted).
    #[arg(long)]
    pub allocation_id: Option<String>,

    /// Cluster backend: standalone or memory.
    ///
    /// The memory backend keeps its store inside this process, so nodes
    /// started as separate processes do not coordinate with each other.
    #[arg(long, default_value = "standalone")]
    pub cluster_type: String,

    /// Port advertised to other members.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host advertised to other members (discovered when omitted).
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Member lease duration in milliseconds.
    #[arg(long, default_value_t = DEFAULT_ALIVE_TTL_MS)]
    pub alive_ttl_ms: u64,

    /// Lease renewal interval in milliseconds (0 = a third of the alive TTL).
    #[arg(long, default_value_t = 0)]
    pub renew_interval_ms: u64,

    /// Housekeeping interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_HOUSEKEEPING_INTERVAL_MS)]
    pub housekeeping_interval_ms: u64,

    /// Shutdown deadline in milliseconds.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_MS)]
    pub shutdown_timeout_ms: u64,
}

impl Args {
    /// Convert command-line arguments to node configuration.
    pub fn into_config(self) -> Result<NodeConfig, Error> {
        let cluster_type: ClusterType = self.cluster_type.parse()?;

        if self.housekeeping_interval_ms < 2 {
            return Err(Error::Config(format!(
                "housekeeping interval must be at least 2ms, got {}ms",
                self.housekeeping_interval_ms
            )));
        }

        let mut cluster = ClusterConfig::new(cluster_type)
            .with_port(self.port)
            .with_alive_ttl(Duration::from_millis(self.alive_ttl_ms));
        cluster.kv.renew_interval_ms = self.renew_interval_ms;
        cluster.advertise_host = self.advertise_host;
        cluster.validate()?;

        Ok(NodeConfig {
            allocation_id: self.allocation_id.unwrap_or_else(new_allocation_id),
            cluster,
            router: RouterConfig::new()
                .with_housekeeping_interval(Duration::from_millis(self.housekeeping_interval_ms)),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        })
    }
}
