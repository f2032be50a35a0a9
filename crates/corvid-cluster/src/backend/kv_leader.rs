//! Leader election over a lease-based key-value store.
//!
//! The leader is whoever holds the leader key. Candidates try to create it
//! bound to their own lease; the holder keeps the lease alive, and when it
//! stops (crash, partition, resign) the key disappears and the next
//! candidate to retry takes over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::RenewTask;
use crate::error::{ClusterError, Result};
use crate::kv::{Kv, LeaseId};
use crate::leader::Leader;

struct Shared {
    kv: Arc<dyn Kv>,
    key: String,
    candidate_id: String,
    ttl: Duration,
    leader: AtomicBool,
    lease: Mutex<Option<LeaseId>>,
}

impl Shared {
    fn set_leader(&self, held: bool) {
        let was = self.leader.swap(held, Ordering::SeqCst);
        if held && !was {
            info!(candidate = %self.candidate_id, "elected as cluster leader");
        } else if !held && was {
            warn!(candidate = %self.candidate_id, "lost cluster leadership");
        }
    }

    /// Try to take the leader key, then record whether this node holds it.
    async fn campaign(&self, lease: LeaseId) -> Result<()> {
        let id = self.candidate_id.as_bytes();
        let created = self.kv.create(&self.key, id.to_vec(), Some(lease)).await?;
        let held = created || self.kv.get(&self.key).await?.as_deref() == Some(id);
        self.set_leader(held);
        Ok(())
    }

    async fn renew(&self) -> Result<()> {
        let current = *self.lease.lock();
        let Some(mut lease) = current else {
            return Ok(());
        };

        if !self.kv.keep_alive(lease).await? {
            // The key went with the lease.
            self.set_leader(false);
            lease = self.kv.grant_lease(self.ttl).await?;
            *self.lease.lock() = Some(lease);
            debug!(candidate = %self.candidate_id, lease, "election lease expired, granted a new one");
        }

        self.campaign(lease).await
    }
}

/// [`Leader`] backed by a leader key in a [`Kv`] store.
pub struct KvLeader {
    shared: Arc<Shared>,
    renew_interval: Duration,
    task: Mutex<Option<RenewTask>>,
}

impl KvLeader {
    /// Create a new candidate.
    ///
    /// The election lease lasts `ttl` and is renewed every `renew_interval`,
    /// which is also how often a follower retries the campaign.
    pub fn new(
        kv: Arc<dyn Kv>,
        key: impl Into<String>,
        candidate_id: impl Into<String>,
        ttl: Duration,
        renew_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                kv,
                key: key.into(),
                candidate_id: candidate_id.into(),
                ttl,
                leader: AtomicBool::new(false),
                lease: Mutex::new(None),
            }),
            renew_interval,
            task: Mutex::new(None),
        }
    }

    /// Get the key this candidate campaigns for.
    pub fn key(&self) -> &str {
        &self.shared.key
    }
}

#[async_trait]
impl Leader for KvLeader {
    async fn elect(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Ok(());
        }

        let shared = &self.shared;
        let lease = shared
            .kv
            .grant_lease(shared.ttl)
            .await
            .map_err(|e| ClusterError::Election(format!("failed to grant lease: {}", e)))?;
        *shared.lease.lock() = Some(lease);

        if let Err(e) = shared.campaign(lease).await {
            shared.lease.lock().take();
            let _ = shared.kv.revoke(lease).await;
            return Err(ClusterError::Election(format!("failed to campaign: {}", e)));
        }

        let task_shared = shared.clone();
        let task = RenewTask::spawn("election", self.renew_interval, move || {
            let shared = task_shared.clone();
            async move {
                if let Err(e) = shared.renew().await {
                    // Leadership can no longer be proven, so stop acting on it.
                    shared.set_leader(false);
                    warn!(error = %e, "election renewal failed");
                }
            }
        });
        *self.task.lock() = Some(task);

        info!(candidate = %shared.candidate_id, key = %shared.key, "registered as leader candidate");
        Ok(())
    }

    async fn resign(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }

        self.shared.set_leader(false);

        let lease = self.shared.lease.lock().take();
        if let Some(lease) = lease {
            self.shared
                .kv
                .revoke(lease)
                .await
                .map_err(|e| ClusterError::Election(format!("failed to revoke lease: {}", e)))?;
            info!(candidate = %self.shared.candidate_id, "resigned leader candidacy");
        }
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.shared.leader.load(Ordering::SeqCst)
    }
}
