//! Cluster member identity and membership snapshots.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Stable identifier of the running node process.
    pub allocation_id: String,
    /// IPv4 address other nodes use to reach this node.
    pub host: String,
    /// Port other nodes use to reach this node.
    pub port: String,
}

impl Member {
    /// Create a new member.
    pub fn new(
        allocation_id: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    /// Get the `host:port` address of this member.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.allocation_id, self.host, self.port)
    }
}

/// Point-in-time snapshot of the live cluster members, keyed by allocation ID.
///
/// Snapshots carry no ordering. They may lag the backend on removals (an
/// expired lease disappears on the next refresh) but not on additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    members: HashMap<String, Member>,
}

impl MemberSet {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a member by allocation ID.
    pub fn member(&self, allocation_id: &str) -> Option<&Member> {
        self.members.get(allocation_id)
    }

    /// Check if an allocation ID belongs to a live member.
    pub fn contains(&self, allocation_id: &str) -> bool {
        self.members.contains_key(allocation_id)
    }

    /// Add or replace a member.
    pub fn insert(&mut self, member: Member) -> Option<Member> {
        self.members.insert(member.allocation_id.clone(), member)
    }

    /// Remove a member by allocation ID.
    pub fn remove(&mut self, allocation_id: &str) -> Option<Member> {
        self.members.remove(allocation_id)
    }

    /// Number of live members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the snapshot has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate over the members in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Get the allocation IDs of all members, sorted.
    pub fn allocation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl FromIterator<Member> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Member>>(iter: I) -> Self {
        Self {
            members: iter
                .into_iter()
                .map(|m| (m.allocation_id.clone(), m))
                .collect(),
        }
    }
}
