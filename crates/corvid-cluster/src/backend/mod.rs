//! Built-in leader and member list backends.

pub mod kv_leader;
pub mod kv_member_list;
pub mod standalone;

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub use kv_leader::KvLeader;
pub use kv_member_list::KvMemberList;
pub use standalone::{StandaloneLeader, StandaloneMemberList};

/// Handle for a background lease renewal task.
pub(crate) struct RenewTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RenewTask {
    /// Start a task that runs `tick` every `interval` until stopped.
    ///
    /// The first tick fires one interval after start. Dropping the handle
    /// also stops the task.
    pub(crate) fn spawn<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            debug!(task = name, interval_ms = interval.as_millis() as u64, "renew task started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => tick().await,
                }
            }

            debug!(task = name, "renew task stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task to stop and wait for it to finish.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "renew task panicked");
        }
    }
}
