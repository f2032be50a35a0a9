//! Leadership capability.

use async_trait::async_trait;

use crate::error::Result;

/// Candidacy for cluster leadership.
///
/// The election algorithm itself lives in the backend; callers only
/// register, resign and poll. A node moves from candidate to leader or
/// follower as the backend decides.
#[async_trait]
pub trait Leader: Send + Sync {
    /// Register the local node as a leadership candidate.
    async fn elect(&self) -> Result<()>;

    /// Give up leadership and candidacy.
    ///
    /// Succeeds when the node is not the leader.
    async fn resign(&self) -> Result<()>;

    /// Check if the local node currently holds leadership.
    ///
    /// Non-blocking and eventually consistent.
    fn is_leader(&self) -> bool;
}
