//! Configuration types for the cluster subsystem.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Default port advertised for the local member.
pub const DEFAULT_PORT: u16 = 14369;

/// Default member lease duration in milliseconds.
pub const DEFAULT_ALIVE_TTL_MS: u64 = 3000;

/// Default key used as the leadership lock.
pub const DEFAULT_LEADER_KEY: &str = "corvid/leader";

/// Default prefix under which members are published.
pub const DEFAULT_MEMBERS_PREFIX: &str = "corvid/members/";

/// Coordination backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClusterType {
    /// Single-node mode: the local node is always the only member and leader.
    Standalone,
    /// Lease-based coordination over an in-process key-value store.
    ///
    /// Each process gets a private store, so separate processes never see
    /// each other. To coordinate several nodes, share one [`Kv`] through
    /// [`Cluster::with_kv`].
    ///
    /// [`Kv`]: crate::kv::Kv
    /// [`Cluster::with_kv`]: crate::cluster::Cluster::with_kv
    Memory,
}

impl ClusterType {
    /// Get the canonical name of this cluster type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Standalone => "standalone",
            ClusterType::Memory => "memory",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterType {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" => Ok(ClusterType::Standalone),
            "memory" => Ok(ClusterType::Memory),
            _ => Err(ClusterError::UnrecognizedType(s.to_string())),
        }
    }
}

impl TryFrom<String> for ClusterType {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClusterType> for String {
    fn from(value: ClusterType) -> Self {
        value.as_str().to_string()
    }
}

/// Settings for lease-based key-value backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvBackendConfig {
    /// Key holding the current leader's allocation ID.
    pub leader_key: String,

    /// Prefix for member records; the allocation ID is appended.
    pub members_prefix: String,

    /// Interval between lease renewals in milliseconds.
    ///
    /// Zero derives the interval from the alive TTL (one third of it).
    pub renew_interval_ms: u64,
}

impl Default for KvBackendConfig {
    fn default() -> Self {
        Self {
            leader_key: DEFAULT_LEADER_KEY.to_string(),
            members_prefix: DEFAULT_MEMBERS_PREFIX.to_string(),
            renew_interval_ms: 0,
        }
    }
}

/// Configuration for the cluster subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Backend used for leader election and membership.
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,

    /// Port other nodes use to reach this node.
    pub port: u16,

    /// Member lease duration in milliseconds.
    pub alive_ttl_ms: u64,

    /// Host advertised for the local member.
    ///
    /// When unset, the first non-loopback IPv4 interface address is used.
    pub advertise_host: Option<String>,

    /// Key-value backend settings.
    pub kv: KvBackendConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_type: ClusterType::Standalone,
            port: DEFAULT_PORT,
            alive_ttl_ms: DEFAULT_ALIVE_TTL_MS,
            advertise_host: None,
            kv: KvBackendConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration for the given cluster type.
    pub fn new(cluster_type: ClusterType) -> Self {
        Self {
            cluster_type,
            ..Default::default()
        }
    }

    /// Set the advertised port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the member lease duration.
    pub fn with_alive_ttl(mut self, ttl: Duration) -> Self {
        self.alive_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Set the advertised host, skipping interface discovery.
    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = Some(host.into());
        self
    }

    /// Set the key-value backend settings.
    pub fn with_kv(mut self, kv: KvBackendConfig) -> Self {
        self.kv = kv;
        self
    }

    /// Set the lease renewal interval.
    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.kv.renew_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Get the member lease duration.
    pub fn alive_ttl(&self) -> Duration {
        Duration::from_millis(self.alive_ttl_ms)
    }

    /// Get the lease renewal interval.
    pub fn renew_interval(&self) -> Duration {
        if self.kv.renew_interval_ms == 0 {
            Duration::from_millis((self.alive_ttl_ms / 3).max(1))
        } else {
            Duration::from_millis(self.kv.renew_interval_ms)
        }
    }

    /// Check the configuration for values no backend can work with.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.port == 0 {
            return Err(ClusterError::InvalidConfig("port must be non-zero".into()));
        }
        if self.alive_ttl_ms == 0 {
            return Err(ClusterError::InvalidConfig(
                "alive ttl must be non-zero".into(),
            ));
        }
        if self.renew_interval() >= self.alive_ttl() {
            return Err(ClusterError::InvalidConfig(format!(
                "renew interval {:?} must be shorter than alive ttl {:?}",
                self.renew_interval(),
                self.alive_ttl()
            )));
        }
        if self.kv.leader_key.is_empty() || self.kv.members_prefix.is_empty() {
            return Err(ClusterError::InvalidConfig(
                "leader key and members prefix must be non-empty".into(),
            ));
        }
        Ok(())
    }
}
