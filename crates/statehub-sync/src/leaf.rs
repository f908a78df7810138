//! Leaf: a mirrored store with one outbound session to a Hub.
//!
//! The Leaf connects, sends its credentials, and on acceptance asks for a
//! full snapshot. Once that snapshot is applied, [`Leaf::dispatch`] applies
//! an action locally and forwards it to the Hub; the Hub does not echo it
//! back. Actions from the Hub go straight into the store with
//! [`Origin::Upstream`] and are never forwarded again.
//!
//! When the session ends for any reason the Leaf waits
//! `reconnect_interval` and tries again, forever. Errors along the way go
//! to the [`ErrorSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use statehub_core::{
    validate_remote_action, Action, ClusterAction, IdentityHash, SecretHash, StoreFingerprint,
};
use statehub_store::{ClusterStore, Origin, Reducer, Role};

use crate::config::LeafConfig;
use crate::error::{ConfigError, ErrorSink, Result, SyncError};
use crate::messages::{Envelope, Message};
use crate::session::{spawn_writer, Outbound, SessionEvent, SessionState};
use crate::transport::{Channel, Connector, Endpoint, FrameStream};

/// What happened to a dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Applied to a store with no Leaf attached.
    Applied,
    /// Applied locally and queued for the Hub.
    Forwarded,
    /// No synchronized session; nothing was applied.
    NotConnected,
}

struct LeafInner<R: Reducer> {
    store: Arc<ClusterStore<R>>,
    fingerprint: StoreFingerprint,
    config: LeafConfig,
    identity: IdentityHash,
    secret: SecretHash,
    connector: Arc<dyn Connector>,
    errors: ErrorSink,
    state: Mutex<SessionState>,
    /// Set once the initial snapshot of the current session is applied.
    link: Mutex<Option<Outbound>>,
    released: AtomicBool,
}

/// The client role for one store.
///
/// Dropping the Leaf shuts it down.
pub struct Leaf<R: Reducer> {
    inner: Arc<LeafInner<R>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Reducer> Leaf<R> {
    /// Attach a Leaf to `store` and start connecting.
    ///
    /// Must be called from within a tokio runtime. Fails if host, login or
    /// password is missing, or if the store already has a Leaf.
    pub fn start(
        store: Arc<ClusterStore<R>>,
        config: LeafConfig,
        connector: Arc<dyn Connector>,
        errors: ErrorSink,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        store.claim_role(Role::Client)?;

        let inner = Arc::new(LeafInner {
            fingerprint: store.fingerprint(),
            identity: IdentityHash::derive(&config.login),
            secret: SecretHash::derive(&config.password),
            store,
            config,
            connector,
            errors,
            state: Mutex::new(SessionState::Closed),
            link: Mutex::new(None),
            released: AtomicBool::new(false),
        });

        info!(
            store = inner.store.name(),
            host = %inner.config.host,
            port = inner.config.port,
            "leaf started"
        );
        let task = runtime.spawn(Arc::clone(&inner).run());

        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
        })
    }

    /// Apply an action locally and forward it to the Hub.
    ///
    /// Actions reach the Hub in the order this store applies them, including
    /// ones dispatched from a store listener. Replace-state and bookkeeping types are refused. Until the session
    /// has received its initial snapshot nothing is applied and
    /// [`Delivery::NotConnected`] is returned.
    pub fn dispatch(&self, action: Action) -> Result<Delivery> {
        validate_remote_action(&action)?;

        let Some(outbound) = self.inner.link.lock().clone() else {
            return Ok(Delivery::NotConnected);
        };
        let fingerprint = self.inner.fingerprint;
        self.inner
            .store
            .dispatch_with(action, |action| -> Result<()> {
                outbound.send(&Envelope::to_hub(fingerprint, action.clone()))
            })?;
        Ok(Delivery::Forwarded)
    }

    /// Whether the Hub has accepted this Leaf's credentials.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().is_authenticated()
    }

    /// Whether the initial snapshot has been applied and dispatches are
    /// forwarded.
    pub fn is_synced(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    pub fn session_state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn store(&self) -> &Arc<ClusterStore<R>> {
        &self.inner.store
    }

    /// Stop reconnecting, close the session and release the store's client
    /// role. Idempotent.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.detach();
        self.inner.store.release_role(Role::Client);
        info!(store = self.inner.store.name(), "leaf stopped");
    }
}

impl<R: Reducer> Drop for Leaf<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<R: Reducer> LeafInner<R> {
    async fn run(self: Arc<Self>) {
        loop {
            match self.session().await {
                Ok(()) => info!("hub closed the session"),
                Err(error) => self.errors.report(&error),
            }
            self.detach();
            debug!(
                retry_in = ?self.config.reconnect_interval,
                "scheduling reconnect"
            );
            tokio::time::sleep(self.config.reconnect_interval).await;
        }
    }

    /// One connection attempt, from connect to close.
    async fn session(&self) -> Result<()> {
        *self.state.lock() = SessionState::Connecting;
        let endpoint = Endpoint::new(&self.config.host, self.config.port, &self.fingerprint)?;
        let Channel { sink, stream, .. } = self.connector.connect(&endpoint).await?;

        let stop = Arc::new(Notify::new());
        let (outbound, _writer) = spawn_writer(sink, Arc::clone(&stop), self.errors.clone());
        self.transition(SessionEvent::Opened)?;
        outbound.send(&Envelope::auth(self.fingerprint, self.identity, self.secret))?;
        debug!(%endpoint, "credentials sent");

        let result = self.read_loop(stream, &outbound, &stop).await;
        outbound.close();
        result
    }

    async fn read_loop(
        &self,
        mut stream: Box<dyn FrameStream>,
        outbound: &Outbound,
        stop: &Notify,
    ) -> Result<()> {
        loop {
            let frame = tokio::select! {
                _ = stop.notified() => return Ok(()),
                frame = stream.next_frame() => frame,
            };
            let text = match frame {
                None => return Ok(()),
                Some(frame) => frame?,
            };

            let envelope = Envelope::decode(&text)?;
            if envelope.fingerprint != self.fingerprint {
                debug!("ignoring envelope for another store");
                continue;
            }

            match envelope.message {
                Message::AuthState { value: true, .. } => self.accepted(outbound)?,
                Message::AuthState {
                    value: false,
                    banned,
                } => {
                    self.transition(SessionEvent::AuthRejected)?;
                    return Err(if banned == Some(true) {
                        SyncError::AddressLocked
                    } else {
                        SyncError::AuthRejected
                    });
                }
                Message::ActionToLeaf {
                    action: Some(action),
                } => self.apply_upstream(action, outbound)?,
                other => debug!(kind = other.kind(), "ignoring message"),
            }
        }
    }

    fn accepted(&self, outbound: &Outbound) -> Result<()> {
        if self.state.lock().is_authenticated() {
            debug!("repeated AUTHSTATE ignored");
            return Ok(());
        }
        self.transition(SessionEvent::AuthAccepted)?;
        self.store.set_connected(true);
        outbound.send(&Envelope::start(self.fingerprint))?;
        info!(store = self.store.name(), "authenticated with hub");
        Ok(())
    }

    fn apply_upstream(&self, action: Action, outbound: &Outbound) -> Result<()> {
        if !self.state.lock().is_authenticated() {
            debug!("action before authentication ignored");
            return Ok(());
        }

        let action = ClusterAction::<R::State>::from_wire(action)?;
        let snapshot = action.is_replace_state();
        self.store.dispatch_cluster(action, Origin::Upstream);

        if snapshot {
            let mut link = self.link.lock();
            if link.is_none() {
                *link = Some(outbound.clone());
                debug!("initial snapshot applied");
            }
        }
        Ok(())
    }

    fn transition(&self, event: SessionEvent) -> Result<SessionState> {
        let mut state = self.state.lock();
        *state = state.on(event)?;
        Ok(*state)
    }

    fn detach(&self) {
        if let Some(outbound) = self.link.lock().take() {
            outbound.close();
        }
        *self.state.lock() = SessionState::Closed;
        if !self.released.load(Ordering::SeqCst) {
            self.store.set_connected(false);
        }
    }
}
