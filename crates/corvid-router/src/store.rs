//! Presence store contract consulted by housekeeping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Availability of one user session, owned by the node that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Bare user name.
    pub user: String,
    /// Session resource.
    pub resource: String,
    /// Allocation ID of the node serving the session.
    pub allocation_id: String,
    /// Free-form status text.
    pub status: Option<String>,
}

impl Presence {
    /// Create a presence record.
    pub fn new(
        user: impl Into<String>,
        resource: impl Into<String>,
        allocation_id: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            resource: resource.into(),
            allocation_id: allocation_id.into(),
            status: None,
        }
    }

    /// Set the status text.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Storage of presence records, as far as housekeeping needs it.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Distinct allocation IDs referenced by stored presences.
    async fn fetch_allocation_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Delete every presence owned by `allocation_id`.
    async fn delete_allocation_presences(&self, allocation_id: &str) -> Result<(), StoreError>;
}
