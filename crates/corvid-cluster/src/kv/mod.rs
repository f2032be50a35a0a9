//! Lease-based key-value coordination backend.
//!
//! The built-in leader and member list implementations only need the small
//! set of operations below, which any lease-based coordination service
//! offers: leases with a TTL that must be kept alive, keys optionally bound
//! to a lease (they vanish when it expires or is revoked), put-if-absent
//! for locking, prefix listing, and a change feed.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

pub use memory::{MemoryKv, WATCH_CAPACITY};

/// Lease identifier issued by a [`Kv`] backend.
pub type LeaseId = u64;

/// A committed change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvEvent {
    /// The key was written.
    Put { key: String, value: Vec<u8> },
    /// The key was deleted, directly or because its lease ended.
    Delete { key: String },
}

impl KvEvent {
    /// Get the key this event applies to.
    pub fn key(&self) -> &str {
        match self {
            KvEvent::Put { key, .. } | KvEvent::Delete { key } => key,
        }
    }
}

/// Key-value store with TTL leases.
#[async_trait]
pub trait Kv: Send + Sync {
    /// Grant a new lease that expires after `ttl` unless kept alive.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId>;

    /// Renew a lease for another full TTL.
    ///
    /// Returns `false` if the lease has already expired or been revoked.
    async fn keep_alive(&self, lease: LeaseId) -> Result<bool>;

    /// Revoke a lease, deleting every key bound to it. Unknown leases are ignored.
    async fn revoke(&self, lease: LeaseId) -> Result<()>;

    /// Write a key, optionally bound to a lease.
    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()>;

    /// Write a key only if it does not exist. Returns `true` if written.
    async fn create(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<bool>;

    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List all keys starting with `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Subscribe to changes committed after this call, in commit order.
    ///
    /// A receiver that falls behind gets `Lagged` and should reload with
    /// [`get_prefix`](Kv::get_prefix).
    fn watch(&self) -> broadcast::Receiver<KvEvent>;
}
