//! Error types for corvid-cluster.

use std::time::Duration;

use thiserror::Error;

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur in the cluster subsystem.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The configured cluster type has no backend.
    #[error("unrecognized cluster type: {0}")]
    UnrecognizedType(String),

    /// The configuration is inconsistent.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    /// No non-loopback IPv4 address was found on this host.
    #[error("failed to get local ip")]
    NoLocalIp,

    /// Enumerating network interfaces failed.
    #[error("interface discovery failed: {0}")]
    InterfaceDiscovery(#[source] std::io::Error),

    /// Error while campaigning for or resigning leadership.
    #[error("election error: {0}")]
    Election(String),

    /// Error while joining or leaving the member list.
    #[error("membership error: {0}")]
    Membership(String),

    /// Error from the key-value coordination backend.
    #[error("kv error: {0}")]
    Kv(String),

    /// Error encoding or decoding a member record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The shutdown deadline elapsed before teardown finished.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

impl ClusterError {
    /// Check if this error is a shutdown deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::ShutdownTimeout(_))
    }
}
