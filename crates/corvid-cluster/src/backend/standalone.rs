//! Single-node backend.
//!
//! With one node there is nothing to coordinate: electing always wins and
//! the member list is just the local member once joined.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::leader::Leader;
use crate::member::{Member, MemberSet};
use crate::member_list::MemberList;

/// Leader that wins its own election.
#[derive(Debug, Default)]
pub struct StandaloneLeader {
    leader: AtomicBool,
}

impl StandaloneLeader {
    /// Create a new standalone leader in candidate state.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Leader for StandaloneLeader {
    async fn elect(&self) -> Result<()> {
        if !self.leader.swap(true, Ordering::SeqCst) {
            info!("standalone node elected as cluster leader");
        }
        Ok(())
    }

    async fn resign(&self) -> Result<()> {
        self.leader.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

/// Member list containing only the local member.
#[derive(Debug)]
pub struct StandaloneMemberList {
    local: Member,
    joined: AtomicBool,
}

impl StandaloneMemberList {
    /// Create a member list for the given local member.
    pub fn new(local: Member) -> Self {
        Self {
            local,
            joined: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MemberList for StandaloneMemberList {
    async fn join(&self) -> Result<()> {
        self.joined.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.joined.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn local_member(&self) -> &Member {
        &self.local
    }

    fn members(&self) -> MemberSet {
        if self.joined.load(Ordering::SeqCst) {
            std::iter::once(self.local.clone()).collect()
        } else {
            MemberSet::new()
        }
    }
}
