//! Corvid Router - Cluster routing and presence housekeeping.
//!
//! Presence records name the allocation (node process) serving each session.
//! When a node dies its records would otherwise linger forever, so the
//! elected leader periodically deletes records whose allocation is missing
//! from the live member list.
//!
//! - [`ClusterRouter`] - elect, join, run housekeeping; route stub
//! - [`PresenceStore`] - what housekeeping needs from presence storage
//! - [`MemoryPresenceStore`] - in-memory presence storage
//!
//! # Usage
//!
//! ```ignore
//! use corvid_router::{ClusterRouter, MemoryPresenceStore, RouterConfig};
//!
//! let cluster = Arc::new(Cluster::new(&cluster_config, allocation_id)?);
//! let store = Arc::new(MemoryPresenceStore::new());
//! let router = ClusterRouter::from_cluster(cluster.clone(), store, RouterConfig::default()).await?;
//!
//! // ... serve traffic ...
//!
//! router.stop().await;
//! cluster.shutdown(Duration::from_secs(5)).await?;
//! ```

pub mod error;
pub mod memory_store;
pub mod router;
pub mod store;

pub use error::{Result, RouterError, StoreError};
pub use memory_store::MemoryPresenceStore;
pub use router::{ClusterRouter, HousekeepingReport, RouterConfig, DEFAULT_HOUSEKEEPING_INTERVAL};
pub use store::{Presence, PresenceStore};
