//! Integration tests for leader-only presence housekeeping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use corvid_cluster::{
    Cluster, ClusterConfig, ClusterError, ClusterType, Leader, Member, MemberList, MemberSet,
    MemoryKv,
};
use corvid_router::{
    ClusterRouter, MemoryPresenceStore, Presence, PresenceStore, RouterConfig, RouterError,
    StoreError,
};

const INTERVAL: Duration = Duration::from_secs(3);

/// Leader and member list whose answers are set by the test. The local
/// node is always "n1".
struct ScriptedCluster {
    local: Member,
    leader: AtomicBool,
    members: Mutex<Vec<String>>,
    fail_elect: AtomicBool,
    fail_join: AtomicBool,
    resigned: AtomicBool,
}

impl ScriptedCluster {
    fn new(leader: bool, members: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            local: Member::new("n1", "10.0.0.1", "5222"),
            leader: AtomicBool::new(leader),
            members: Mutex::new(members.iter().map(|m| m.to_string()).collect()),
            fail_elect: AtomicBool::new(false),
            fail_join: AtomicBool::new(false),
            resigned: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Leader for ScriptedCluster {
    async fn elect(&self) -> corvid_cluster::Result<()> {
        if self.fail_elect.load(Ordering::SeqCst) {
            return Err(ClusterError::Election("backend down".into()));
        }
        Ok(())
    }

    async fn resign(&self) -> corvid_cluster::Result<()> {
        self.resigned.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemberList for ScriptedCluster {
    async fn join(&self) -> corvid_cluster::Result<()> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(ClusterError::Membership("backend down".into()));
        }
        Ok(())
    }

    async fn leave(&self) -> corvid_cluster::Result<()> {
        Ok(())
    }

    fn local_member(&self) -> &Member {
        &self.local
    }

    fn members(&self) -> MemberSet {
        self.members
            .lock()
            .iter()
            .map(|id| Member::new(id.clone(), "10.0.0.1", "5222"))
            .collect()
    }
}

/// Presence store that records every call and can be told to fail.
#[derive(Default)]
struct RecordingStore {
    allocations: Mutex<BTreeSet<String>>,
    fetches: AtomicUsize,
    deletes: Mutex<Vec<String>>,
    fail_fetch: AtomicBool,
    fail_delete_of: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    fn new(allocations: &[&str]) -> Arc<Self> {
        let store = Self::default();
        *store.allocations.lock() = allocations.iter().map(|a| a.to_string()).collect();
        Arc::new(store)
    }

    fn remaining(&self) -> Vec<String> {
        self.allocations.lock().iter().cloned().collect()
    }

    fn deleted(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }

    fn calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst) + self.deletes.lock().len()
    }
}

#[async_trait]
impl PresenceStore for RecordingStore {
    async fn fetch_allocation_ids(&self) -> Result<Vec<String>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(self.remaining())
    }

    async fn delete_allocation_presences(&self, allocation_id: &str) -> Result<(), StoreError> {
        if self.fail_delete_of.lock().as_deref() == Some(allocation_id) {
            return Err(StoreError::Backend(format!("cannot delete {}", allocation_id)));
        }
        self.deletes.lock().push(allocation_id.to_string());
        self.allocations.lock().remove(allocation_id);
        Ok(())
    }
}

async fn start(cluster: &Arc<ScriptedCluster>, store: &Arc<RecordingStore>) -> ClusterRouter {
    ClusterRouter::start(
        cluster.clone(),
        cluster.clone(),
        store.clone(),
        RouterConfig::new().with_housekeeping_interval(INTERVAL),
    )
    .await
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_leader_deletes_inactive_allocations() {
    // Scenario A
    let cluster = ScriptedCluster::new(true, &["n1", "n3"]);
    let store = RecordingStore::new(&["n1", "n2", "n3"]);
    let router = start(&cluster, &store).await;

    tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;

    assert_eq!(store.deleted(), vec!["n2"]);
    assert_eq!(store.remaining(), vec!["n1", "n3"]);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_follower_does_nothing() {
    // Scenario B
    let cluster = ScriptedCluster::new(false, &["n1"]);
    let store = RecordingStore::new(&["n1", "n2"]);
    let router = start(&cluster, &store).await;

    tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(100)).await;

    assert_eq!(store.calls(), 0);
    assert_eq!(store.remaining(), vec!["n1", "n2"]);

    let report = router.housekeeping().await.unwrap();
    assert!(report.skipped_not_leader);
    assert_eq!(store.calls(), 0);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_is_retried_next_tick() {
    // Scenario C
    let cluster = ScriptedCluster::new(true, &["n1"]);
    let store = RecordingStore::new(&["n1", "n2"]);
    store.fail_fetch.store(true, Ordering::SeqCst);
    let router = start(&cluster, &store).await;

    tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    assert!(store.deleted().is_empty());
    assert!(router.is_running());

    store.fail_fetch.store(false, Ordering::SeqCst);
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(store.deleted(), vec!["n2"]);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_delete_failure_aborts_step() {
    let cluster = ScriptedCluster::new(true, &["n1"]);
    let store = RecordingStore::new(&["a", "b", "c"]);
    *store.fail_delete_of.lock() = Some("b".to_string());
    let router = start(&cluster, &store).await;

    let err = router.housekeeping().await.unwrap_err();
    assert!(matches!(err, RouterError::Store(StoreError::Backend(_))));
    // "c" is left for a later tick.
    assert_eq!(store.deleted(), vec!["a"]);
    assert_eq!(store.remaining(), vec!["b", "c"]);

    store.fail_delete_of.lock().take();
    let report = router.housekeeping().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.deleted, vec!["b", "c"]);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_members_are_never_deleted() {
    let cluster = ScriptedCluster::new(true, &["n1", "n2", "n3", "n4"]);
    let store = RecordingStore::new(&["n4", "n2", "n1", "n3"]);
    let router = start(&cluster, &store).await;

    for _ in 0..5 {
        let report = router.housekeeping().await.unwrap();
        assert!(report.deleted.is_empty());
    }
    tokio::time::sleep(INTERVAL * 3).await;

    assert!(store.deleted().is_empty());
    assert_eq!(store.remaining().len(), 4);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_leader_outside_member_list_does_nothing() {
    let cluster = ScriptedCluster::new(true, &["n2"]);
    let store = RecordingStore::new(&["n2", "n3"]);
    let router = start(&cluster, &store).await;

    let report = router.housekeeping().await.unwrap();
    assert!(report.skipped_not_member);
    assert!(report.deleted.is_empty());

    tokio::time::sleep(INTERVAL * 2).await;
    assert!(store.deleted().is_empty());

    // back in the list, the dead allocation goes
    cluster.members.lock().push("n1".to_string());
    let report = router.housekeeping().await.unwrap();
    assert_eq!(report.deleted, vec!["n3"]);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_leadership_change_between_ticks() {
    let cluster = ScriptedCluster::new(false, &["n1"]);
    let store = RecordingStore::new(&["n1", "n2"]);
    let router = start(&cluster, &store).await;

    tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(store.calls(), 0);

    cluster.leader.store(true, Ordering::SeqCst);
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(store.deleted(), vec!["n2"]);
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_step_times_out_at_half_interval() {
    let cluster = ScriptedCluster::new(true, &["n1"]);
    let store = RecordingStore::new(&["n2"]);
    *store.delay.lock() = Some(INTERVAL);
    let router = start(&cluster, &store).await;

    let err = router.housekeeping().await.unwrap_err();
    assert!(matches!(err, RouterError::Timeout(d) if d == INTERVAL / 2));
    assert!(store.deleted().is_empty());
    router.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_elect_fails() {
    let cluster = ScriptedCluster::new(true, &[]);
    cluster.fail_elect.store(true, Ordering::SeqCst);
    let store = RecordingStore::new(&[]);

    let result = ClusterRouter::start(
        cluster.clone(),
        cluster.clone(),
        store,
        RouterConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(RouterError::Cluster(ClusterError::Election(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_join_fails() {
    let cluster = ScriptedCluster::new(true, &[]);
    cluster.fail_join.store(true, Ordering::SeqCst);
    let store = RecordingStore::new(&[]);

    let result = ClusterRouter::start(
        cluster.clone(),
        cluster.clone(),
        store,
        RouterConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(RouterError::Cluster(ClusterError::Membership(_)))
    ));
    assert!(cluster.resigned.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_route_is_accepted() {
    let cluster = ScriptedCluster::new(false, &[]);
    let store = RecordingStore::new(&[]);
    let router = start(&cluster, &store).await;

    router.route(b"<message to='bob@example.org'/>").await.unwrap();
    router.stop().await;
    assert!(!router.is_running());
}

fn memory_config() -> ClusterConfig {
    ClusterConfig::new(ClusterType::Memory)
        .with_advertise_host("10.0.0.1")
        .with_alive_ttl(Duration::from_secs(3))
        .with_renew_interval(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_dead_node_presences_are_cleared() {
    let kv = Arc::new(MemoryKv::new());
    let config = memory_config();
    let n1 = Arc::new(Cluster::with_kv(&config, "n1", kv.clone()).unwrap());
    let n2 = Arc::new(Cluster::with_kv(&config, "n2", kv.clone()).unwrap());

    let store = Arc::new(MemoryPresenceStore::new());
    store.upsert(Presence::new("alice", "phone", "n1"));
    store.upsert(Presence::new("bob", "desk", "n2"));
    store.upsert(Presence::new("carol", "web", "n2"));

    let r1 = ClusterRouter::from_cluster(n1.clone(), store.clone(), RouterConfig::default())
        .await
        .unwrap();
    let r2 = ClusterRouter::from_cluster(n2.clone(), store.clone(), RouterConfig::default())
        .await
        .unwrap();

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(store.len(), 3);

    // n2 goes away without a goodbye: its housekeeping stops and its leases
    // simply expire.
    r2.stop().await;
    drop(r2);
    drop(n2);

    // lease expiry, snapshot refresh and a full housekeeping tick
    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(store.len(), 1);
    assert_eq!(store.presences_for("n1").len(), 1);

    r1.stop().await;
    n1.shutdown(Duration::from_secs(1)).await.unwrap();
}

/// Leader whose resignation hangs, so a bounded shutdown stops between
/// leaving and resigning.
struct StuckResign {
    inner: Arc<Cluster>,
}

#[async_trait]
impl Leader for StuckResign {
    async fn elect(&self) -> corvid_cluster::Result<()> {
        self.inner.elect().await
    }

    async fn resign(&self) -> corvid_cluster::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.inner.resign().await
    }

    fn is_leader(&self) -> bool {
        self.inner.is_leader()
    }
}

struct KvNodes {
    kv: Arc<MemoryKv>,
    store: Arc<MemoryPresenceStore>,
}

impl KvNodes {
    fn new() -> Self {
        Self {
            kv: Arc::new(MemoryKv::new()),
            store: Arc::new(MemoryPresenceStore::new()),
        }
    }

    fn cluster(&self, id: &str) -> Arc<Cluster> {
        Arc::new(Cluster::with_kv(&memory_config(), id, self.kv.clone()).unwrap())
    }

    async fn router(&self, cluster: &Arc<Cluster>) -> ClusterRouter {
        ClusterRouter::from_cluster(cluster.clone(), self.store.clone(), RouterConfig::default())
            .await
            .unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_node_joining_right_before_step_is_kept() {
    let nodes = KvNodes::new();
    let n1 = nodes.cluster("n1");
    let r1 = nodes.router(&n1).await;
    assert!(n1.is_leader());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let n2 = nodes.cluster("n2");
    let r2 = nodes.router(&n2).await;
    nodes.store.upsert(Presence::new("bob", "desk", "n2"));

    let report = r1.housekeeping().await.unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(nodes.store.presences_for("n2").len(), 1);

    r2.stop().await;
    r1.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_leader_that_left_keeps_live_presences() {
    let nodes = KvNodes::new();
    let n1 = nodes.cluster("n1");
    let n2 = nodes.cluster("n2");
    let r1 = nodes.router(&n1).await;
    let r2 = nodes.router(&n2).await;
    nodes.store.upsert(Presence::new("alice", "phone", "n1"));
    nodes.store.upsert(Presence::new("bob", "desk", "n2"));

    n1.leave().await.unwrap();
    assert!(n1.is_leader());
    assert!(n2.members().contains("n2"));

    let report = r1.housekeeping().await.unwrap();
    assert!(report.skipped_not_member);
    assert!(report.deleted.is_empty());

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(nodes.store.len(), 2);

    r2.stop().await;
    r1.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_shutdown_keeps_live_presences() {
    let nodes = KvNodes::new();
    let base = nodes.cluster("n1");
    let n1 = Arc::new(Cluster::from_parts(
        Arc::new(StuckResign {
            inner: base.clone(),
        }),
        base.clone(),
    ));
    let n2 = nodes.cluster("n2");
    let r1 = nodes.router(&n1).await;
    let r2 = nodes.router(&n2).await;
    nodes.store.upsert(Presence::new("bob", "desk", "n2"));

    let err = n1.shutdown(Duration::from_millis(100)).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(n1.is_leader());
    assert!(!n1.members().contains("n1"));

    let report = r1.housekeeping().await.unwrap();
    assert!(report.skipped_not_member);

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(nodes.store.presences_for("n2").len(), 1);

    r2.stop().await;
    r1.stop().await;
}
