//! Cluster router with leader-only presence housekeeping.

use std::sync::Arc;
use std::time::Duration;

use corvid_cluster::{Cluster, Leader, MemberList};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, RouterError};
use crate::store::PresenceStore;

/// Default interval between housekeeping steps.
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3);

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Interval between housekeeping steps.
    pub housekeeping_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
        }
    }
}

impl RouterConfig {
    /// Create a configuration with the default interval.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the housekeeping interval.
    pub fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    /// Deadline for a single housekeeping step: half the interval.
    pub fn step_timeout(&self) -> Duration {
        self.housekeeping_interval / 2
    }
}

/// Outcome of one housekeeping step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    /// The step did nothing because this node is not the leader.
    pub skipped_not_leader: bool,
    /// The step did nothing because this node is not in the member list.
    pub skipped_not_member: bool,
    /// Number of allocation IDs found in the store.
    pub scanned: usize,
    /// Allocation IDs whose presences were deleted.
    pub deleted: Vec<String>,
}

impl HousekeepingReport {
    fn skipped() -> Self {
        Self {
            skipped_not_leader: true,
            ..Default::default()
        }
    }
}

struct Housekeeper {
    leader: Arc<dyn Leader>,
    member_list: Arc<dyn MemberList>,
    store: Arc<dyn PresenceStore>,
    step_timeout: Duration,
}

impl Housekeeper {
    async fn run_once(&self) -> Result<HousekeepingReport> {
        if !self.leader.is_leader() {
            return Ok(HousekeepingReport::skipped());
        }
        tokio::time::timeout(self.step_timeout, self.sweep())
            .await
            .map_err(|_| RouterError::Timeout(self.step_timeout))?
    }

    /// Delete presences of every stored allocation missing from the member list.
    ///
    /// A leader that is not itself a member (it left, or its registration
    /// lapsed) cannot trust its view of the others and does nothing.
    async fn sweep(&self) -> Result<HousekeepingReport> {
        let allocation_ids = self.store.fetch_allocation_ids().await?;
        let members = self.member_list.members();

        let mut report = HousekeepingReport {
            scanned: allocation_ids.len(),
            ..Default::default()
        };
        let local = &self.member_list.local_member().allocation_id;
        if !members.contains(local) {
            debug!(allocation_id = %local, "local node is not a member, skipping housekeeping");
            report.skipped_not_member = true;
            return Ok(report);
        }
        for allocation_id in allocation_ids {
            if members.contains(&allocation_id) {
                continue;
            }
            // clear inactive allocation presences
            self.store.delete_allocation_presences(&allocation_id).await?;
            debug!(allocation_id = %allocation_id, "cleared presences of inactive allocation");
            report.deleted.push(allocation_id);
        }
        Ok(report)
    }

    async fn run(self: Arc<Self>, interval: Duration, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(interval_ms = interval.as_millis() as u64, "housekeeping task started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("housekeeping task stopping");
                    break;
                }
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) if !report.deleted.is_empty() => {
                        info!(
                            scanned = report.scanned,
                            deleted = report.deleted.len(),
                            "housekeeping cleared inactive allocations"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "housekeeping task error"),
                },
            }
        }
    }
}

struct HousekeepingTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Routes messages between cluster nodes and keeps presence records in
/// line with the live member list.
///
/// Starting the router registers the node as leader candidate and member.
/// From then on a background task wakes every housekeeping interval and, on
/// the leader only, deletes presences owned by allocations that are no
/// longer members. A leader missing from its own member list skips the step. Failed steps are logged and retried on the next tick.
/// Dropping the router stops the task as well.
pub struct ClusterRouter {
    housekeeper: Arc<Housekeeper>,
    task: Mutex<Option<HousekeepingTask>>,
}

impl ClusterRouter {
    /// Elect, join and start housekeeping.
    ///
    /// Fails if either election or join fails; a failed join resigns the
    /// candidacy taken just before.
    pub async fn start(
        leader: Arc<dyn Leader>,
        member_list: Arc<dyn MemberList>,
        store: Arc<dyn PresenceStore>,
        config: RouterConfig,
    ) -> Result<Self> {
        leader.elect().await?;
        if let Err(e) = member_list.join().await {
            if let Err(resign_err) = leader.resign().await {
                warn!(error = %resign_err, "failed to resign after join failure");
            }
            return Err(e.into());
        }

        let housekeeper = Arc::new(Housekeeper {
            leader,
            member_list,
            store,
            step_timeout: config.step_timeout(),
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(
            housekeeper
                .clone()
                .run(config.housekeeping_interval, shutdown_rx),
        );

        Ok(Self {
            housekeeper,
            task: Mutex::new(Some(HousekeepingTask { shutdown, handle })),
        })
    }

    /// Start the router on a cluster handle.
    pub async fn from_cluster(
        cluster: Arc<Cluster>,
        store: Arc<dyn PresenceStore>,
        config: RouterConfig,
    ) -> Result<Self> {
        Self::start(cluster.clone(), cluster, store, config).await
    }

    /// Route a message to the node owning its recipient.
    ///
    /// Inter-node forwarding is not wired yet; messages are accepted and dropped.
    pub async fn route(&self, message: &[u8]) -> Result<()> {
        trace!(len = message.len(), "cluster route");
        Ok(())
    }

    /// Run a single housekeeping step now.
    pub async fn housekeeping(&self) -> Result<HousekeepingReport> {
        self.housekeeper.run_once().await
    }

    /// Check if the background task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop the background task and wait for it to finish.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                warn!(error = %e, "housekeeping task panicked");
            }
        }
    }
}
