//! End-to-end replication over the in-process transport.
//!
//! Every node runs with its own reducer registry, as separate processes
//! would.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use statehub::core::{IdentityHash, SecretHash, REPLACE_STATE_TYPE};
use statehub::store::{Role, StoreError};
use statehub::sync::{Channel, Envelope, FrameSink, FrameStream, Message};
use statehub::{
    verify_convergence, Action, BanPolicy, ClusterStore, Delivery, ErrorSink, HubConfig, Leaf,
    LeafConfig, Origin, Reducer, ReducerRegistry, ReplicationMode, SyncError,
};
use statehub_testkit::{wait_until, Counter, CounterReducer, LogReducer, TestCluster};

fn demo_hub() -> HubConfig {
    HubConfig::default().with_login("demo", "demo")
}

fn counter_cluster(config: HubConfig) -> TestCluster<CounterReducer> {
    TestCluster::start(CounterReducer::new, config).unwrap()
}

/// Hand-driven Leaf session.
struct RawLeaf {
    channel: Channel,
    fingerprint: statehub::StoreFingerprint,
}

impl RawLeaf {
    async fn open<R: Reducer>(cluster: &TestCluster<R>, origin: &str) -> Self {
        Self {
            channel: cluster.connect_raw(origin).await.unwrap(),
            fingerprint: cluster.hub().fingerprint(),
        }
    }

    async fn send(&mut self, envelope: Envelope) {
        self.channel
            .sink
            .send(envelope.encode().unwrap())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Option<Envelope> {
        tokio::time::timeout(Duration::from_secs(2), self.channel.stream.next_frame())
            .await
            .expect("hub did not answer")
            .map(|frame| Envelope::decode(&frame.unwrap()).unwrap())
    }

    /// Authenticate and return the `AUTHSTATE` reply.
    async fn auth(&mut self, login: &str, password: &str) -> Envelope {
        let envelope = Envelope::auth(
            self.fingerprint,
            IdentityHash::derive(login),
            SecretHash::derive(password),
        );
        self.send(envelope).await;
        self.recv().await.expect("hub closed before answering")
    }

    async fn forward(&mut self, action: Action) {
        self.send(Envelope::to_hub(self.fingerprint, action)).await;
    }
}

#[tokio::test]
async fn test_valid_login_connects_leaf() {
    let cluster = counter_cluster(demo_hub());
    let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();

    assert!(!leaf.store().is_connected());
    assert!(wait_until(|| leaf.is_connected()).await);
    assert!(leaf.store().is_connected());
    assert!(wait_until(|| cluster.hub().authenticated_count() == 1).await);
}

#[tokio::test]
async fn test_ban_after_threshold_ignores_valid_credentials() {
    let policy = BanPolicy {
        threshold: 3,
        window: Duration::from_secs(3600),
    };
    let cluster = counter_cluster(demo_hub().with_ban_policy(policy));
    let origin = "192.168.7.7";

    let intruder = cluster.add_leaf(origin, "demo", "wrong").unwrap();
    assert!(wait_until(|| cluster.hub().is_banned(origin)).await);
    intruder.leaf.shutdown();
    assert_eq!(
        cluster.hub().ban_record(origin).map(|r| r.failure_count),
        Some(3)
    );

    // Valid credentials from the same address are turned away with the flag.
    let mut raw = RawLeaf::open(&cluster, origin).await;
    let reply = raw.auth("demo", "demo").await;
    assert_eq!(
        reply.message,
        Message::AuthState {
            value: false,
            banned: Some(true),
        }
    );
    assert!(raw.recv().await.is_none(), "banned session must be closed");

    // Banned attempts leave the record as it was.
    assert_eq!(
        cluster.hub().ban_record(origin).map(|r| r.failure_count),
        Some(3)
    );
    assert!(cluster
        .errors()
        .iter()
        .any(|e| e == &SyncError::AddressLocked.to_string()));

    // Other addresses are unaffected.
    let friend = cluster.add_leaf("192.168.7.8", "demo", "demo").unwrap();
    assert!(wait_until(|| friend.is_connected()).await);
}

#[tokio::test]
async fn test_elapsed_window_resets_failure_count() {
    let window = Duration::from_millis(200);
    let cluster = counter_cluster(demo_hub().with_ban_policy(BanPolicy {
        threshold: 2,
        window,
    }));
    let origin = "fe80::1";

    for _ in 0..2 {
        let mut raw = RawLeaf::open(&cluster, origin).await;
        let reply = raw.auth("demo", "nope").await;
        assert_eq!(reply, Envelope::auth_state(raw.fingerprint, false, false));
    }
    assert!(cluster.hub().is_banned(origin));

    tokio::time::sleep(window + Duration::from_millis(50)).await;
    assert!(!cluster.hub().is_banned(origin));

    let mut raw = RawLeaf::open(&cluster, origin).await;
    raw.auth("demo", "nope").await;
    assert_eq!(
        cluster.hub().ban_record(origin).map(|r| r.failure_count),
        Some(1)
    );
}

#[tokio::test]
async fn test_snapshot_mode_converges() {
    let cluster = counter_cluster(demo_hub());
    cluster.hub_store().set_mode(ReplicationMode::Snapshot);
    let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
    assert!(wait_until(|| leaf.is_synced()).await);

    for n in 0..25 {
        let action = if n % 3 == 0 {
            Action::new("DECREMENT")
        } else {
            Action::new("ADD").with_payload(n)
        };
        cluster.hub_store().dispatch(action).unwrap();
    }

    let hub_state = cluster.hub_store().get_state();
    assert!(wait_until(|| leaf.state() == hub_state).await);
    assert!(verify_convergence(&leaf.state(), &hub_state)
        .unwrap()
        .is_converged());
}

#[tokio::test]
async fn test_action_mode_preserves_order() {
    let cluster = TestCluster::start(|| LogReducer, demo_hub()).unwrap();
    let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
    assert!(wait_until(|| leaf.is_synced()).await);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    leaf.store().subscribe(move |event| {
        if let Some(action) = event.action.user() {
            sink.lock().push(action.payload().and_then(|v| v.as_i64()));
        }
    });

    for step in 0..50 {
        cluster
            .hub_store()
            .dispatch(Action::new("STEP").with_payload(step))
            .unwrap();
    }

    assert!(wait_until(|| observed.lock().len() == 50).await);
    let expected: Vec<_> = (0..50i64).map(Some).collect();
    assert_eq!(*observed.lock(), expected);
    assert_eq!(leaf.state(), cluster.hub_store().get_state());
}

#[tokio::test]
async fn test_leaf_action_reaches_others_without_echo() {
    let cluster = counter_cluster(demo_hub());
    let origin = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
    let other = cluster.add_leaf("10.0.0.2", "demo", "demo").unwrap();
    assert!(wait_until(|| origin.is_synced() && other.is_synced()).await);

    let upstream = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&upstream);
    origin.store().subscribe(move |event| {
        if event.origin == Origin::Upstream && !event.action.is_replace_state() {
            *counter.lock() += 1;
        }
    });

    assert_eq!(
        origin.dispatch(Action::new("INCREMENT")).unwrap(),
        Delivery::Forwarded
    );
    assert_eq!(origin.state(), Counter { count: 1 });

    assert!(wait_until(|| cluster.hub_store().get_state().count == 1).await);
    assert!(wait_until(|| other.state().count == 1).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(origin.state(), Counter { count: 1 });
    assert_eq!(*upstream.lock(), 0);
}

#[tokio::test]
async fn test_reserved_types_from_leaf_never_reach_hub_store() {
    let cluster = counter_cluster(demo_hub());
    let mut raw = RawLeaf::open(&cluster, "10.0.0.9").await;
    assert_eq!(
        raw.auth("demo", "demo").await,
        Envelope::auth_state(raw.fingerprint, true, false)
    );

    raw.forward(Action::new(REPLACE_STATE_TYPE).with_payload(json!({ "count": 99 })))
        .await;
    raw.forward(Action::new("@@INIT")).await;
    raw.forward(Action::new("INCREMENT")).await;

    // The session survives and the valid action is applied.
    assert!(wait_until(|| cluster.hub_store().get_state().count == 1).await);
    assert_eq!(cluster.hub().authenticated_count(), 1);

    let violations = cluster
        .errors()
        .iter()
        .filter(|e| e.starts_with("protocol violation"))
        .count();
    assert_eq!(violations, 2);
}

#[tokio::test]
async fn test_demo_counter_scenario() {
    let cluster = counter_cluster(demo_hub());
    let first = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
    assert!(wait_until(|| first.is_connected()).await);
    assert!(wait_until(|| first.is_synced()).await);

    cluster.hub_store().dispatch(Action::new("INCREMENT")).unwrap();
    assert!(wait_until(|| first.state() == Counter { count: 1 }).await);

    let third = cluster.add_leaf("10.0.0.3", "demo", "demo").unwrap();
    assert!(wait_until(|| third.is_synced()).await);

    first.dispatch(Action::new("INCREMENT")).unwrap();
    assert!(wait_until(|| cluster.hub_store().get_state() == Counter { count: 2 }).await);
    assert!(wait_until(|| third.state() == Counter { count: 2 }).await);
    assert_eq!(first.state(), Counter { count: 2 });
}

#[tokio::test]
async fn test_configuration_errors_are_synchronous() {
    let registry = ReducerRegistry::new();
    let store = Arc::new(ClusterStore::new(CounterReducer::new(), &registry).unwrap());
    assert!(matches!(
        ClusterStore::new(CounterReducer::new(), &registry),
        Err(StoreError::DuplicateReducer(_))
    ));

    let network = statehub::sync::MemoryNetwork::new();
    let config = LeafConfig::new("hub", "demo", "demo");
    let _leaf = Leaf::start(
        Arc::clone(&store),
        config.clone(),
        Arc::new(network.connector("10.0.0.1")),
        ErrorSink::default(),
    )
    .unwrap();

    let second = Leaf::start(
        Arc::clone(&store),
        config.clone(),
        Arc::new(network.connector("10.0.0.1")),
        ErrorSink::default(),
    );
    assert!(matches!(
        second,
        Err(SyncError::Store(StoreError::RoleTaken(Role::Client)))
    ));

    let missing = Leaf::start(
        store,
        LeafConfig::new("hub", "demo", ""),
        Arc::new(network.connector("10.0.0.1")),
        ErrorSink::default(),
    );
    assert!(matches!(missing, Err(SyncError::Config(_))));
}

#[tokio::test]
async fn test_leaf_resyncs_after_hub_restart() {
    let mut cluster = counter_cluster(demo_hub());
    let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
    assert!(wait_until(|| leaf.is_synced()).await);

    for _ in 0..3 {
        cluster.hub_store().dispatch(Action::new("INCREMENT")).unwrap();
    }
    assert!(wait_until(|| leaf.state().count == 3).await);

    cluster.restart_hub().unwrap();

    // The new Hub's snapshot wins.
    assert!(wait_until(|| leaf.is_synced() && leaf.state().count == 0).await);
    leaf.dispatch(Action::new("INCREMENT")).unwrap();
    assert!(wait_until(|| cluster.hub_store().get_state().count == 1).await);
}

#[tokio::test]
async fn test_unknown_leaf_stays_disconnected() {
    let cluster = counter_cluster(demo_hub());
    let stranger = cluster.add_leaf("10.0.0.5", "mallory", "demo").unwrap();

    let rejected = SyncError::AuthRejected.to_string();
    assert!(wait_until(|| cluster.errors().contains(&rejected)).await);
    assert!(!stranger.is_connected());
    assert_eq!(
        stranger.dispatch(Action::new("INCREMENT")).unwrap(),
        Delivery::NotConnected
    );
    assert_eq!(cluster.hub_store().get_state(), Counter { count: 0 });
}
