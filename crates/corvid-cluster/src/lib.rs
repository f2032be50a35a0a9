//! Corvid Cluster - Leader election and membership for corvid nodes.
//!
//! This crate decides which node coordinates the cluster and which nodes are
//! alive. It provides:
//! - [`Leader`] - become or resign cluster leader, poll leadership
//! - [`MemberList`] - join or leave the cluster, snapshot live members
//! - [`Cluster`] - one handle composing both, with a deadline-bounded shutdown
//!
//! # Backends
//!
//! Backends are pluggable through the two traits. Built in:
//! - [`ClusterType::Standalone`] - single node, always leader
//! - [`ClusterType::Memory`] - leases and keys in a [`Kv`] store
//!   ([`MemoryKv`] in process, or any other [`Kv`] via [`Cluster::with_kv`])
//!
//! # Usage
//!
//! ```ignore
//! use corvid_cluster::{Cluster, ClusterConfig, ClusterType, Leader, MemberList};
//!
//! let config = ClusterConfig::new(ClusterType::Memory).with_port(5222);
//! let cluster = Cluster::new(&config, "alloc-1")?;
//!
//! cluster.elect().await?;
//! cluster.join().await?;
//!
//! if cluster.is_leader() {
//!     let members = cluster.members();
//! }
//!
//! cluster.shutdown(Duration::from_secs(5)).await?;
//! ```

pub mod backend;
pub mod cluster;
pub mod config;
pub mod error;
pub mod kv;
pub mod leader;
pub mod local_ip;
pub mod member;
pub mod member_list;

pub use cluster::{Cluster, SharedCluster};
pub use config::{ClusterConfig, ClusterType, KvBackendConfig};
pub use error::{ClusterError, Result};
pub use kv::{Kv, KvEvent, LeaseId, MemoryKv};
pub use leader::Leader;
pub use member::{Member, MemberSet};
pub use member_list::MemberList;
