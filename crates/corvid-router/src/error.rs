//! Error types for corvid-router.

use std::time::Duration;

use corvid_cluster::ClusterError;
use thiserror::Error;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors reported by a presence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("presence store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the operation.
    #[error("presence store error: {0}")]
    Backend(String),
}

/// Errors that can occur in the cluster router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Error from the cluster subsystem.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Error from the presence store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A housekeeping step ran past its deadline.
    #[error("housekeeping step timed out after {0:?}")]
    Timeout(Duration),
}
