//! Cluster handle composing a leader and a member list.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::backend::{KvLeader, KvMemberList, StandaloneLeader, StandaloneMemberList};
use crate::config::{ClusterConfig, ClusterType};
use crate::error::{ClusterError, Result};
use crate::kv::{Kv, MemoryKv};
use crate::leader::Leader;
use crate::local_ip;
use crate::member::{Member, MemberSet};
use crate::member_list::MemberList;

/// Type alias for a shared cluster handle.
pub type SharedCluster = Arc<Cluster>;

/// Groups a [`Leader`] and a [`MemberList`] behind one handle.
///
/// `Cluster` implements both traits by delegation, so it can be handed to
/// anything that needs either capability.
pub struct Cluster {
    leader: Arc<dyn Leader>,
    member_list: Arc<dyn MemberList>,
}

impl Cluster {
    /// Create the cluster subsystem for the configured backend.
    ///
    /// The local member's host comes from `advertise_host` when set,
    /// otherwise from the first non-loopback IPv4 interface address.
    pub fn new(config: &ClusterConfig, allocation_id: impl Into<String>) -> Result<Self> {
        Self::with_interface_addrs(config, allocation_id, local_ip::interface_addrs)
    }

    /// Like [`Cluster::new`], reading interface addresses from `interface_addrs`.
    pub fn with_interface_addrs<F>(
        config: &ClusterConfig,
        allocation_id: impl Into<String>,
        interface_addrs: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> std::io::Result<Vec<IpAddr>>,
    {
        config.validate()?;
        let local_member = local_member(config, allocation_id.into(), interface_addrs)?;

        let (leader, member_list): (Arc<dyn Leader>, Arc<dyn MemberList>) =
            match config.cluster_type {
                ClusterType::Standalone => {
                    let leader: Arc<dyn Leader> = Arc::new(StandaloneLeader::new());
                    let member_list: Arc<dyn MemberList> =
                        Arc::new(StandaloneMemberList::new(local_member.clone()));
                    (leader, member_list)
                }
                ClusterType::Memory => kv_backend(config, Arc::new(MemoryKv::new()), &local_member),
            };

        info!(
            cluster_type = %config.cluster_type,
            member = %local_member,
            "cluster subsystem created"
        );
        Ok(Self::from_parts(leader, member_list))
    }

    /// Create a cluster using the lease-based backend over an existing store.
    ///
    /// The configured cluster type is ignored; several clusters sharing one
    /// store see each other as members and elect a single leader. The local
    /// host is resolved as in [`Cluster::new`]: `advertise_host` when set,
    /// otherwise real interface discovery. Set `advertise_host` when the
    /// host must not depend on the machine's interfaces.
    pub fn with_kv(
        config: &ClusterConfig,
        allocation_id: impl Into<String>,
        kv: Arc<dyn Kv>,
    ) -> Result<Self> {
        config.validate()?;
        let local_member = local_member(config, allocation_id.into(), local_ip::interface_addrs)?;
        let (leader, member_list) = kv_backend(config, kv, &local_member);
        Ok(Self::from_parts(leader, member_list))
    }

    /// Create a cluster from any leader and member list implementation.
    pub fn from_parts(leader: Arc<dyn Leader>, member_list: Arc<dyn MemberList>) -> Self {
        Self {
            leader,
            member_list,
        }
    }

    /// Leave the member list, then resign leadership, within `timeout`.
    ///
    /// Returns the teardown's own result if it finishes in time. Otherwise the
    /// teardown is cancelled where it stands and
    /// [`ClusterError::ShutdownTimeout`] is returned; any lease still held
    /// then expires on its own.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.teardown()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "cluster shutdown timed out");
                Err(ClusterError::ShutdownTimeout(timeout))
            }
        }
    }

    async fn teardown(&self) -> Result<()> {
        self.member_list.leave().await?;
        self.leader.resign().await?;
        info!(member = %self.member_list.local_member(), "cluster subsystem shut down");
        Ok(())
    }
}

#[async_trait]
impl Leader for Cluster {
    async fn elect(&self) -> Result<()> {
        self.leader.elect().await
    }

    async fn resign(&self) -> Result<()> {
        self.leader.resign().await
    }

    fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }
}

#[async_trait]
impl MemberList for Cluster {
    async fn join(&self) -> Result<()> {
        self.member_list.join().await
    }

    async fn leave(&self) -> Result<()> {
        self.member_list.leave().await
    }

    fn local_member(&self) -> &Member {
        self.member_list.local_member()
    }

    fn members(&self) -> MemberSet {
        self.member_list.members()
    }
}

fn local_member<F>(config: &ClusterConfig, allocation_id: String, interface_addrs: F) -> Result<Member>
where
    F: FnOnce() -> std::io::Result<Vec<IpAddr>>,
{
    let host = match &config.advertise_host {
        Some(host) => host.clone(),
        None => local_ip::discover(interface_addrs)?,
    };
    Ok(Member::new(allocation_id, host, config.port.to_string()))
}

fn kv_backend(
    config: &ClusterConfig,
    kv: Arc<dyn Kv>,
    local_member: &Member,
) -> (Arc<dyn Leader>, Arc<dyn MemberList>) {
    let leader = KvLeader::new(
        kv.clone(),
        config.kv.leader_key.clone(),
        local_member.allocation_id.clone(),
        config.alive_ttl(),
        config.renew_interval(),
    );
    let member_list = KvMemberList::new(
        kv,
        config.kv.members_prefix.clone(),
        local_member.clone(),
        config.alive_ttl(),
        config.renew_interval(),
    );
    (Arc::new(leader), Arc::new(member_list))
}
