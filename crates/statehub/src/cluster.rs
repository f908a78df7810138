//! The Cluster: one store and the replication roles attached to it.

use std::net::SocketAddr;
use std::sync::Arc;

use statehub_core::{Action, ReplicationMode, StoreFingerprint};
use statehub_store::{ClusterStore, Reducer, ReducerRegistry, StoreEvent, SubscriptionId};
use statehub_sync::{
    Connector, Delivery, ErrorSink, Hub, HubConfig, Leaf, LeafConfig, Listener, WsConnector,
    WsServer,
};
use tracing::info;

use crate::error::{Result, StatehubError};

/// A store that can serve as a Hub or mirror one as a Leaf, one at a time.
///
/// The application dispatches through the Cluster instead of the raw store,
/// so actions are routed to the Hub whenever a Leaf is attached. Hub and
/// Leaf share one [`ErrorSink`].
pub struct Cluster<R: Reducer> {
    store: Arc<ClusterStore<R>>,
    errors: ErrorSink,
    hub: Option<Hub<R>>,
    leaf: Option<Leaf<R>>,
    /// Set when the Cluster bound its own WebSocket listener.
    server: Option<WsServer>,
}

impl<R: Reducer> Cluster<R> {
    /// Create a store for `reducer`, claiming its name in `registry`.
    pub fn new(reducer: R, registry: &Arc<ReducerRegistry>) -> Result<Self> {
        let store = ClusterStore::new(reducer, registry)?;
        Ok(Self {
            store: Arc::new(store),
            errors: ErrorSink::default(),
            hub: None,
            leaf: None,
            server: None,
        })
    }

    /// Route runtime errors of roles attached from now on to `errors`.
    pub fn with_error_sink(mut self, errors: ErrorSink) -> Self {
        self.errors = errors;
        self
    }

    pub fn store(&self) -> &Arc<ClusterStore<R>> {
        &self.store
    }

    pub fn fingerprint(&self) -> StoreFingerprint {
        self.store.fingerprint()
    }

    pub fn get_state(&self) -> R::State {
        self.store.get_state()
    }

    /// Dispatch an application action.
    ///
    /// With a Leaf attached the action is applied locally and forwarded to
    /// the Hub, or refused while the Leaf is not synchronized. Otherwise it
    /// is applied and, if this Cluster is a Hub, broadcast.
    pub fn dispatch(&self, action: Action) -> Result<Delivery> {
        match &self.leaf {
            Some(leaf) => Ok(leaf.dispatch(action)?),
            None => {
                self.store.dispatch(action)?;
                Ok(Delivery::Applied)
            }
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent<'_, R::State>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn mode(&self) -> ReplicationMode {
        self.store.mode()
    }

    pub fn set_mode(&self, mode: ReplicationMode) {
        self.store.set_mode(mode);
    }

    /// False while a Leaf is attached but not authenticated.
    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    pub fn hub(&self) -> Option<&Hub<R>> {
        self.hub.as_ref()
    }

    pub fn leaf(&self) -> Option<&Leaf<R>> {
        self.leaf.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hub role
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve this store to every channel `listener` yields.
    pub fn attach_hub<L>(&mut self, config: HubConfig, listener: L) -> Result<()>
    where
        L: Listener + 'static,
    {
        let hub = Hub::start(Arc::clone(&self.store), config, self.errors.clone())?;
        hub.serve(listener);
        self.hub = Some(hub);
        Ok(())
    }

    /// Bind a WebSocket listener at `config.host:config.port` and serve
    /// this store on it. Returns the bound address.
    pub async fn listen_ws(&mut self, config: HubConfig) -> Result<SocketAddr> {
        let hub = Hub::start(Arc::clone(&self.store), config.clone(), self.errors.clone())?;
        let server = WsServer::bind(config.bind_addr()).await?;
        hub.serve(server.listener(&self.store.fingerprint()));

        let addr = server.local_addr();
        info!(store = self.store.name(), %addr, "serving over websocket");
        self.hub = Some(hub);
        self.server = Some(server);
        Ok(addr)
    }

    /// Serve this store on a listener shared with other stores.
    ///
    /// `config.host` and `config.port` are ignored.
    pub fn attach_hub_to(&mut self, server: &WsServer, config: HubConfig) -> Result<()> {
        self.attach_hub(config, server.listener(&self.store.fingerprint()))
    }

    /// Shut the Hub down and release the server role.
    pub fn detach_hub(&mut self) -> Result<()> {
        let hub = self
            .hub
            .take()
            .ok_or_else(|| StatehubError::InvalidOperation("no hub attached".into()))?;
        hub.shutdown();
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Leaf role
    // ─────────────────────────────────────────────────────────────────────────

    /// Mirror a Hub reached through `connector`.
    pub fn attach_leaf(
        &mut self,
        config: LeafConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<()> {
        let leaf = Leaf::start(
            Arc::clone(&self.store),
            config,
            connector,
            self.errors.clone(),
        )?;
        self.leaf = Some(leaf);
        Ok(())
    }

    /// Mirror a Hub over WebSocket.
    pub fn connect_ws(&mut self, config: LeafConfig) -> Result<()> {
        self.attach_leaf(config, Arc::new(WsConnector))
    }

    /// Stop the Leaf and release the client role.
    pub fn detach_leaf(&mut self) -> Result<()> {
        let leaf = self
            .leaf
            .take()
            .ok_or_else(|| StatehubError::InvalidOperation("no leaf attached".into()))?;
        leaf.shutdown();
        Ok(())
    }

    /// Detach every role. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(leaf) = self.leaf.take() {
            leaf.shutdown();
        }
        if let Some(hub) = self.hub.take() {
            hub.shutdown();
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }
}

impl<R: Reducer> Drop for Cluster<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
