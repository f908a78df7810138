//! Hub and Leaf clusters talking over real WebSocket connections.

use std::time::Duration;

use statehub::{Action, Cluster, Delivery, HubConfig, LeafConfig, ReducerRegistry, WsServer};
use statehub_testkit::{recording_sink, wait_until, Counter, CounterReducer};

fn leaf_config(port: u16, password: &str) -> LeafConfig {
    LeafConfig::new("127.0.0.1", "demo", password)
        .with_port(port)
        .with_reconnect_interval(Duration::from_millis(50))
}

fn is_synced(cluster: &Cluster<CounterReducer>) -> bool {
    cluster.leaf().is_some_and(|leaf| leaf.is_synced())
}

#[tokio::test]
async fn test_round_trip_over_websocket() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut hub = Cluster::new(CounterReducer::new(), &ReducerRegistry::new()).unwrap();
    let addr = hub
        .listen_ws(HubConfig::default().with_login("demo", "demo").with_bind("127.0.0.1", 0))
        .await
        .unwrap();

    let mut leaf = Cluster::new(CounterReducer::new(), &ReducerRegistry::new()).unwrap();
    leaf.connect_ws(leaf_config(addr.port(), "demo")).unwrap();
    assert!(wait_until(|| is_synced(&leaf)).await);
    assert!(leaf.is_connected());

    assert_eq!(hub.dispatch(Action::new("INCREMENT")).unwrap(), Delivery::Applied);
    assert!(wait_until(|| leaf.get_state() == Counter { count: 1 }).await);

    assert_eq!(leaf.dispatch(Action::new("INCREMENT")).unwrap(), Delivery::Forwarded);
    assert!(wait_until(|| hub.get_state() == Counter { count: 2 }).await);

    hub.shutdown();
    assert!(wait_until(|| !leaf.is_connected()).await);
    assert_eq!(
        leaf.dispatch(Action::new("INCREMENT")).unwrap(),
        Delivery::NotConnected
    );
}

#[tokio::test]
async fn test_stores_share_one_listener() -> anyhow::Result<()> {
    let server = WsServer::bind("127.0.0.1:0").await?;
    let port = server.local_addr().port();
    let config = HubConfig::default().with_login("demo", "demo");

    let mut counter_hub = Cluster::new(CounterReducer::new(), &ReducerRegistry::new())?;
    counter_hub.attach_hub_to(&server, config.clone())?;
    let mut tally_hub = Cluster::new(CounterReducer::named("tally"), &ReducerRegistry::new())?;
    tally_hub.attach_hub_to(&server, config)?;

    let mut counter_leaf = Cluster::new(CounterReducer::new(), &ReducerRegistry::new())?;
    counter_leaf.connect_ws(leaf_config(port, "demo"))?;
    let mut tally_leaf = Cluster::new(CounterReducer::named("tally"), &ReducerRegistry::new())?;
    tally_leaf.connect_ws(leaf_config(port, "demo"))?;
    assert!(wait_until(|| is_synced(&counter_leaf) && is_synced(&tally_leaf)).await);

    counter_hub.dispatch(Action::new("INCREMENT"))?;
    tally_hub.dispatch(Action::new("ADD").with_payload(5))?;

    assert!(wait_until(|| counter_leaf.get_state().count == 1).await);
    assert!(wait_until(|| tally_leaf.get_state().count == 5).await);
    assert_eq!(counter_leaf.get_state().count, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_login_is_recorded_against_peer_address() {
    let mut hub = Cluster::new(CounterReducer::new(), &ReducerRegistry::new()).unwrap();
    let addr = hub
        .listen_ws(HubConfig::default().with_login("demo", "demo").with_bind("127.0.0.1", 0))
        .await
        .unwrap();

    let (sink, errors) = recording_sink();
    let mut leaf = Cluster::new(CounterReducer::new(), &ReducerRegistry::new())
        .unwrap()
        .with_error_sink(sink);
    leaf.connect_ws(leaf_config(addr.port(), "wrong")).unwrap();

    let rejected = statehub::SyncError::AuthRejected.to_string();
    assert!(wait_until(|| errors.lock().contains(&rejected)).await);
    assert!(!leaf.is_connected());

    let record = hub
        .hub()
        .and_then(|hub| hub.ban_record("127.0.0.1"))
        .expect("failure recorded");
    assert!(record.failure_count >= 1);
}
