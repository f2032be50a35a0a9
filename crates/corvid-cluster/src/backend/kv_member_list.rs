//! Member list over a lease-based key-value store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use super::RenewTask;
use crate::error::{ClusterError, Result};
use crate::kv::{Kv, KvEvent, LeaseId};
use crate::member::{Member, MemberSet};
use crate::member_list::MemberList;

struct Shared {
    kv: Arc<dyn Kv>,
    prefix: String,
    local: Member,
    ttl: Duration,
    lease: Mutex<Option<LeaseId>>,
    // Lock order: events, then snapshot.
    events: Mutex<Option<broadcast::Receiver<KvEvent>>>,
    snapshot: RwLock<MemberSet>,
}

impl Shared {
    fn key(&self) -> String {
        format!("{}{}", self.prefix, self.local.allocation_id)
    }

    /// Write the local member record bound to a fresh lease.
    async fn register(&self) -> Result<LeaseId> {
        let value = serde_json::to_vec(&self.local)?;
        let lease = self.kv.grant_lease(self.ttl).await?;
        if let Err(e) = self.kv.put(&self.key(), value, Some(lease)).await {
            let _ = self.kv.revoke(lease).await;
            return Err(e);
        }
        *self.lease.lock() = Some(lease);
        Ok(lease)
    }

    /// Reload the snapshot from the store.
    ///
    /// The watch is opened before the listing and replayed over it, so no
    /// change committed in between is lost.
    async fn refresh(&self) -> Result<()> {
        let events = self.kv.watch();
        let entries = self.kv.get_prefix(&self.prefix).await?;
        let members: MemberSet = entries
            .into_iter()
            .filter_map(|(key, value)| parse_member(&key, &value))
            .collect();
        {
            let mut current = self.events.lock();
            *self.snapshot.write() = members;
            *current = Some(events);
        }
        self.apply_events();
        Ok(())
    }

    /// Apply member changes published since the last call.
    fn apply_events(&self) {
        let mut events = self.events.lock();
        let Some(rx) = events.as_mut() else {
            return;
        };
        let mut snapshot = self.snapshot.write();
        loop {
            match rx.try_recv() {
                Ok(KvEvent::Put { key, value }) => {
                    if key.starts_with(&self.prefix) {
                        if let Some(member) = parse_member(&key, &value) {
                            snapshot.insert(member);
                        }
                    }
                }
                Ok(KvEvent::Delete { key }) => {
                    if let Some(allocation_id) = key.strip_prefix(&self.prefix) {
                        snapshot.remove(allocation_id);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "member watch lagged, changes wait for the next refresh");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    async fn renew(&self) -> Result<()> {
        let current = *self.lease.lock();
        let Some(lease) = current else {
            return Ok(());
        };

        if !self.kv.keep_alive(lease).await? {
            // Registration expired while we were still running; publish again.
            let lease = self.register().await?;
            info!(allocation_id = %self.local.allocation_id, lease, "member registration expired, re-joined");
        }

        self.refresh().await
    }
}

fn parse_member(key: &str, value: &[u8]) -> Option<Member> {
    match serde_json::from_slice::<Member>(value) {
        Ok(member) => Some(member),
        Err(e) => {
            warn!(key = %key, error = %e, "skipping malformed member record");
            None
        }
    }
}

/// [`MemberList`] publishing members as leased keys under a common prefix.
///
/// The snapshot follows the store's change feed: [`members`](MemberList::members)
/// applies pending changes before answering, so a node that has joined is
/// visible at once. A background task keeps the local registration alive and
/// reloads the whole snapshot on every renewal, which is when expired members
/// drop out. While the store is unreachable the last snapshot is served.
pub struct KvMemberList {
    shared: Arc<Shared>,
    renew_interval: Duration,
    task: Mutex<Option<RenewTask>>,
}

impl KvMemberList {
    /// Create a member list for `local`.
    ///
    /// The registration lease lasts `alive_ttl` and is renewed every
    /// `renew_interval`.
    pub fn new(
        kv: Arc<dyn Kv>,
        prefix: impl Into<String>,
        local: Member,
        alive_ttl: Duration,
        renew_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                kv,
                prefix: prefix.into(),
                local,
                ttl: alive_ttl,
                lease: Mutex::new(None),
                events: Mutex::new(None),
                snapshot: RwLock::new(MemberSet::new()),
            }),
            renew_interval,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MemberList for KvMemberList {
    async fn join(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Ok(());
        }

        let shared = &self.shared;
        shared
            .register()
            .await
            .map_err(|e| ClusterError::Membership(format!("failed to register member: {}", e)))?;
        if let Err(e) = shared.refresh().await {
            debug!(error = %e, "initial member refresh failed");
        }

        let task_shared = shared.clone();
        let task = RenewTask::spawn("membership", self.renew_interval, move || {
            let shared = task_shared.clone();
            async move {
                if let Err(e) = shared.renew().await {
                    warn!(error = %e, "membership renewal failed, serving last snapshot");
                }
            }
        });
        *self.task.lock() = Some(task);

        info!(member = %shared.local, "joined cluster");
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }

        // Other members are still alive; only the local one goes.
        self.shared.apply_events();
        self.shared.events.lock().take();
        self.shared
            .snapshot
            .write()
            .remove(&self.shared.local.allocation_id);

        let lease = self.shared.lease.lock().take();
        if let Some(lease) = lease {
            self.shared
                .kv
                .revoke(lease)
                .await
                .map_err(|e| ClusterError::Membership(format!("failed to revoke lease: {}", e)))?;
            info!(member = %self.shared.local, "left cluster");
        }
        Ok(())
    }

    fn local_member(&self) -> &Member {
        &self.shared.local
    }

    fn members(&self) -> MemberSet {
        self.shared.apply_events();
        self.shared.snapshot.read().clone()
    }
}
