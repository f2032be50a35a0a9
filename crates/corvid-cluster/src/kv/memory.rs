//! In-process [`Kv`] implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{Kv, KvEvent, LeaseId};
use crate::error::{ClusterError, Result};

/// Events buffered per watcher before it lags.
pub const WATCH_CAPACITY: usize = 1024;

struct Entry {
    value: Vec<u8>,
    lease: Option<LeaseId>,
}

struct Lease {
    ttl: Duration,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    next_lease: LeaseId,
}

impl State {
    /// Drop expired leases and the keys bound to them. Returns the deleted keys.
    fn purge_expired(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .flat_map(|id| self.remove_lease(id))
            .collect()
    }

    fn remove_lease(&mut self, id: LeaseId) -> Vec<String> {
        if self.leases.remove(&id).is_none() {
            return Vec::new();
        }
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.lease == Some(id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys
    }

    fn check_lease(&self, lease: Option<LeaseId>) -> Result<()> {
        match lease {
            Some(id) if !self.leases.contains_key(&id) => {
                Err(ClusterError::Kv(format!("lease {} not found", id)))
            }
            _ => Ok(()),
        }
    }
}

/// Key-value store living in process memory.
///
/// Leases expire lazily: every operation first drops leases whose deadline
/// has passed. Deadlines follow the tokio clock, so paused-time tests can
/// step through expiry deterministically. Share one instance between several
/// clusters to simulate a multi-node deployment in one process.
///
/// Changes are published to watchers while the state lock is held, so every
/// watcher sees them in commit order. Expiry is only noticed, and published,
/// on the next operation.
pub struct MemoryKv {
    state: Mutex<State>,
    reachable: AtomicBool,
    events: broadcast::Sender<KvEvent>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            reachable: AtomicBool::new(true),
            events,
        }
    }

    /// Simulate the backend becoming unreachable (or reachable again).
    ///
    /// While unreachable every operation fails and leases keep ticking.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        let expired = state.purge_expired(Instant::now());
        self.publish_deletes(expired);
        state.entries.len()
    }

    /// Check if the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> Result<parking_lot::MutexGuard<'_, State>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ClusterError::Kv("backend unreachable".into()));
        }
        let mut state = self.state.lock();
        let expired = state.purge_expired(Instant::now());
        self.publish_deletes(expired);
        Ok(state)
    }

    // No receivers is not an error.
    fn publish(&self, event: KvEvent) {
        let _ = self.events.send(event);
    }

    fn publish_deletes(&self, keys: Vec<String>) {
        for key in keys {
            self.publish(KvEvent::Delete { key });
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let mut state = self.state()?;
        state.next_lease += 1;
        let id = state.next_lease;
        state.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(id)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<bool> {
        let mut state = self.state()?;
        match state.leases.get_mut(&lease) {
            Some(l) => {
                l.deadline = Instant::now() + l.ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke(&self, lease: LeaseId) -> Result<()> {
        let mut state = self.state()?;
        let deleted = state.remove_lease(lease);
        self.publish_deletes(deleted);
        Ok(())
    }

    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()> {
        let mut state = self.state()?;
        state.check_lease(lease)?;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                lease,
            },
        );
        self.publish(KvEvent::Put {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn create(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<bool> {
        let mut state = self.state()?;
        state.check_lease(lease)?;
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                lease,
            },
        );
        self.publish(KvEvent::Put {
            key: key.to_string(),
            value,
        });
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state()?;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.state()?;
        if state.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.publish(KvEvent::Delete {
            key: key.to_string(),
        });
        Ok(true)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let state = self.state()?;
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<KvEvent> {
        self.events.subscribe()
    }
}
