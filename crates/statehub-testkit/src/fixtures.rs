//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use statehub_core::{Action, StoreFingerprint};
use statehub_store::{ClusterStore, Reducer, ReducerRegistry};
use statehub_sync::{
    Channel, Connector, Delivery, Endpoint, ErrorSink, Hub, HubConfig, Leaf, LeafConfig,
    MemoryConnector, MemoryNetwork, Result,
};

/// Host name the harness Hub listens on.
pub const HUB_HOST: &str = "hub";

/// Reconnect interval for harness Leaves.
pub const LEAF_RECONNECT: Duration = Duration::from_millis(20);

const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// State of [`CounterReducer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

/// `INCREMENT`, `DECREMENT` and `ADD { payload: n }` over a [`Counter`].
#[derive(Debug, Clone)]
pub struct CounterReducer {
    name: String,
}

impl CounterReducer {
    /// A counter named `counter`.
    pub fn new() -> Self {
        Self::named("counter")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for CounterReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CounterReducer {
    type State = Counter;

    fn name(&self) -> &str {
        &self.name
    }

    fn initial_state(&self) -> Counter {
        Counter::default()
    }

    fn reduce(&self, state: &Counter, action: &Action) -> Counter {
        let count = match action.kind.as_str() {
            "INCREMENT" => state.count + 1,
            "DECREMENT" => state.count - 1,
            "ADD" => state.count + action.payload().and_then(|v| v.as_i64()).unwrap_or(0),
            _ => state.count,
        };
        Counter { count }
    }
}

/// Appends every action it sees, so tests can compare orderings.
#[derive(Debug, Clone, Default)]
pub struct LogReducer;

impl Reducer for LogReducer {
    type State = Vec<Action>;

    fn name(&self) -> &str {
        "log"
    }

    fn initial_state(&self) -> Vec<Action> {
        Vec::new()
    }

    fn reduce(&self, state: &Vec<Action>, action: &Action) -> Vec<Action> {
        let mut next = state.clone();
        next.push(action.clone());
        next
    }
}

/// An [`ErrorSink`] that keeps the rendered errors.
pub fn recording_sink() -> (ErrorSink, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    let sink = ErrorSink::new(move |error| captured.lock().push(error.to_string()));
    (sink, seen)
}

/// Poll `condition` until it holds or a few seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A Hub and its Leaves on one in-process network.
///
/// Every node gets a fresh store and reducer registry, as if it ran in a
/// process of its own. All nodes report to one recording sink.
pub struct TestCluster<R: Reducer> {
    network: Arc<MemoryNetwork>,
    factory: Arc<dyn Fn() -> R + Send + Sync>,
    config: HubConfig,
    endpoint: Endpoint,
    hub: Hub<R>,
    sink: ErrorSink,
    errors: Arc<Mutex<Vec<String>>>,
}

impl<R: Reducer> TestCluster<R> {
    /// Start a Hub serving stores built by `factory`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(factory: F, config: HubConfig) -> Result<Self>
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        let factory: Arc<dyn Fn() -> R + Send + Sync> = Arc::new(factory);
        let fingerprint = StoreFingerprint::derive(factory().name());
        let endpoint = Endpoint::new(HUB_HOST, config.port, &fingerprint)?;
        let network = MemoryNetwork::new();
        let (sink, errors) = recording_sink();

        let hub = spawn_hub(&network, &endpoint, factory.as_ref(), &config, &sink)?;
        Ok(Self {
            network,
            factory,
            config,
            endpoint,
            hub,
            sink,
            errors,
        })
    }

    pub fn hub(&self) -> &Hub<R> {
        &self.hub
    }

    pub fn hub_store(&self) -> &Arc<ClusterStore<R>> {
        self.hub.store()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    /// Errors reported so far by any node.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Replace the Hub with a fresh one holding the initial state.
    ///
    /// Sessions of the old Hub are closed; Leaves reconnect on their own.
    pub fn restart_hub(&mut self) -> Result<()> {
        self.hub.shutdown();
        self.hub = spawn_hub(
            &self.network,
            &self.endpoint,
            self.factory.as_ref(),
            &self.config,
            &self.sink,
        )?;
        Ok(())
    }

    /// Start a Leaf whose channels appear to come from `origin`.
    pub fn add_leaf(&self, origin: &str, login: &str, password: &str) -> Result<TestLeaf<R>> {
        let store = Arc::new(ClusterStore::new((self.factory)(), &ReducerRegistry::new())?);
        let connector = self.network.connector(origin);
        let config = LeafConfig::new(HUB_HOST, login, password)
            .with_port(self.config.port)
            .with_reconnect_interval(LEAF_RECONNECT);

        let leaf = Leaf::start(
            store,
            config,
            Arc::new(connector.clone()),
            self.sink.clone(),
        )?;
        Ok(TestLeaf { leaf, connector })
    }

    /// Open a raw channel to the Hub, bypassing the Leaf state machine.
    pub async fn connect_raw(&self, origin: &str) -> Result<Channel> {
        self.network.connector(origin).connect(&self.endpoint).await
    }
}

fn spawn_hub<R: Reducer>(
    network: &Arc<MemoryNetwork>,
    endpoint: &Endpoint,
    factory: &(dyn Fn() -> R + Send + Sync),
    config: &HubConfig,
    sink: &ErrorSink,
) -> Result<Hub<R>> {
    let store = Arc::new(ClusterStore::new(factory(), &ReducerRegistry::new())?);
    let hub = Hub::start(store, config.clone(), sink.clone())?;
    hub.serve(network.listen(endpoint));
    Ok(hub)
}

/// A Leaf started by a [`TestCluster`].
pub struct TestLeaf<R: Reducer> {
    pub leaf: Leaf<R>,
    /// Change the origin address of the next connection attempt.
    pub connector: MemoryConnector,
}

impl<R: Reducer> TestLeaf<R> {
    pub fn store(&self) -> &Arc<ClusterStore<R>> {
        self.leaf.store()
    }

    pub fn state(&self) -> R::State {
        self.leaf.store().get_state()
    }

    pub fn dispatch(&self, action: Action) -> Result<Delivery> {
        self.leaf.dispatch(action)
    }

    pub fn is_connected(&self) -> bool {
        self.leaf.is_connected()
    }

    pub fn is_synced(&self) -> bool {
        self.leaf.is_synced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counter_reducer() {
        let reducer = CounterReducer::new();
        let mut state = reducer.initial_state();
        for action in [
            Action::new("INCREMENT"),
            Action::new("INCREMENT"),
            Action::new("DECREMENT"),
            Action::new("ADD").with_payload(json!(10)),
            Action::new("UNKNOWN"),
        ] {
            state = reducer.reduce(&state, &action);
        }
        assert_eq!(state, Counter { count: 11 });
    }

    #[test]
    fn test_log_reducer_keeps_order() {
        let reducer = LogReducer;
        let first = reducer.reduce(&reducer.initial_state(), &Action::new("A"));
        let second = reducer.reduce(&first, &Action::new("B"));
        let kinds: Vec<_> = second.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_cluster_syncs_a_leaf() {
        let cluster =
            TestCluster::start(CounterReducer::new, HubConfig::default().with_login("demo", "demo"))
                .unwrap();
        cluster.hub_store().dispatch(Action::new("INCREMENT")).unwrap();

        let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo").unwrap();
        assert!(wait_until(|| leaf.is_synced()).await);
        assert_eq!(leaf.state(), Counter { count: 1 });
    }

    #[tokio::test]
    async fn test_wait_until_gives_up() {
        assert!(!wait_until(|| false).await);
    }
}
