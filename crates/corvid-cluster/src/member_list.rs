//! Membership capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::member::{Member, MemberSet};

/// Participation in the distributed member directory.
#[async_trait]
pub trait MemberList: Send + Sync {
    /// Publish the local member.
    async fn join(&self) -> Result<()>;

    /// Remove the local member. Succeeds when already left.
    async fn leave(&self) -> Result<()>;

    /// Get the member this node publishes.
    fn local_member(&self) -> &Member;

    /// Get the best-known snapshot of live members without waiting on the backend.
    fn members(&self) -> MemberSet;
}
