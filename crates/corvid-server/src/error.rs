//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Cluster subsystem error.
    #[error("cluster error: {0}")]
    Cluster(#[from] corvid_cluster::ClusterError),

    /// Cluster router error.
    #[error("router error: {0}")]
    Router(#[from] corvid_router::RouterError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
