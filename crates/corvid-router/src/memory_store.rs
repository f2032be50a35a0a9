//! In-memory presence store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::store::{Presence, PresenceStore};

/// Presence records held in memory, keyed by user and resource.
#[derive(Default)]
pub struct MemoryPresenceStore {
    presences: DashMap<(String, String), Presence>,
}

impl MemoryPresenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the presence of a session.
    pub fn upsert(&self, presence: Presence) {
        let key = (presence.user.clone(), presence.resource.clone());
        self.presences.insert(key, presence);
    }

    /// Remove the presence of a session.
    pub fn remove(&self, user: &str, resource: &str) -> Option<Presence> {
        self.presences
            .remove(&(user.to_string(), resource.to_string()))
            .map(|(_, p)| p)
    }

    /// Get the presence of a session.
    pub fn get(&self, user: &str, resource: &str) -> Option<Presence> {
        self.presences
            .get(&(user.to_string(), resource.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Get all presences owned by an allocation.
    pub fn presences_for(&self, allocation_id: &str) -> Vec<Presence> {
        let mut presences: Vec<Presence> = self
            .presences
            .iter()
            .filter(|entry| entry.allocation_id == allocation_id)
            .map(|entry| entry.value().clone())
            .collect();
        presences.sort_by(|a, b| (&a.user, &a.resource).cmp(&(&b.user, &b.resource)));
        presences
    }

    /// Number of stored presences.
    pub fn len(&self) -> usize {
        self.presences.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.presences.is_empty()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn fetch_allocation_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids: BTreeSet<String> = self
            .presences
            .iter()
            .map(|entry| entry.allocation_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn delete_allocation_presences(&self, allocation_id: &str) -> Result<(), StoreError> {
        self.presences.retain(|_, p| p.allocation_id != allocation_id);
        Ok(())
    }
}
