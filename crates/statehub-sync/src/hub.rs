//! Hub: the authoritative side of a replicated store.
//!
//! A Hub accepts any number of channels. Each becomes a session that must
//! authenticate before it may request a snapshot, forward actions, or
//! receive broadcasts.
//!
//! ## Broadcast
//!
//! Every change on the Hub's store is relayed to authenticated sessions:
//!
//! - `snapshot` mode sends the full state to every session.
//! - `action` mode sends the triggering action to every session except the
//!   one it came from. Replace-state and bookkeeping actions are not sent.
//!
//! Frames for one session leave in the order the store emitted them.
//!
//! ## Locking
//!
//! Store dispatch lock, then session table. Authentication takes the
//! gatekeeper, then the session table. Nothing takes the dispatch lock
//! while holding the session table.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use statehub_auth::{AddressKey, Admission, BanRecord, CredentialStore, Gatekeeper};
use statehub_core::{
    replace_state_action, validate_remote_action, Action, ClusterAction, IdentityHash,
    ReplicationMode, SecretHash, StoreFingerprint,
};
use statehub_store::{ClusterStore, Origin, Reducer, Role, StoreEvent, SubscriptionId};

use crate::config::HubConfig;
use crate::error::{ConfigError, ErrorSink, Result, SyncError};
use crate::messages::{Envelope, Message};
use crate::session::{spawn_writer, Outbound, SessionEvent, SessionId, SessionState};
use crate::transport::{Channel, FrameStream, Listener};

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

struct SessionEntry {
    state: SessionState,
    origin: AddressKey,
    outbound: Outbound,
}

struct HubInner<R: Reducer> {
    store: Arc<ClusterStore<R>>,
    fingerprint: StoreFingerprint,
    runtime: Handle,
    gatekeeper: Mutex<Gatekeeper>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    errors: ErrorSink,
    auth_timeout: Duration,
    stopped: AtomicBool,
}

/// The server role for one store.
///
/// Dropping the Hub shuts it down.
pub struct Hub<R: Reducer> {
    inner: Arc<HubInner<R>>,
}

impl<R: Reducer> Hub<R> {
    /// Attach a Hub to `store`.
    ///
    /// Must be called from within a tokio runtime. Fails if the store
    /// already has a Hub or a configured login is empty.
    pub fn start(store: Arc<ClusterStore<R>>, config: HubConfig, errors: ErrorSink) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let credentials = CredentialStore::from_pairs(&config.logins)?;
        store.claim_role(Role::Server)?;

        let fingerprint = store.fingerprint();
        let inner = Arc::new(HubInner {
            store: Arc::clone(&store),
            fingerprint,
            runtime,
            gatekeeper: Mutex::new(Gatekeeper::new(credentials, config.ban.clone())),
            sessions: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            errors,
            auth_timeout: config.auth_timeout,
            stopped: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = store.subscribe(move |event| {
            if let Some(hub) = weak.upgrade() {
                hub.broadcast(event);
            }
        });
        *inner.subscription.lock() = Some(subscription);

        let sweep = inner
            .runtime
            .spawn(sweep_loop(Arc::downgrade(&inner), config.sweep_interval));
        inner.tasks.lock().push(sweep);

        info!(
            store = store.name(),
            %fingerprint,
            logins = config.logins.len(),
            "hub started"
        );
        Ok(Self { inner })
    }

    /// Take over a freshly opened channel.
    pub fn accept(&self, channel: Channel) -> SessionId {
        self.inner.accept(channel)
    }

    /// Accept every channel `listener` yields until it closes or the Hub
    /// shuts down.
    pub fn serve<L: Listener + 'static>(&self, mut listener: L) {
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            while let Some(channel) = listener.accept().await {
                inner.accept(channel);
            }
            debug!("hub listener closed");
        });
        self.inner.tasks.lock().push(task);
    }

    /// Close every session and detach from the store. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<ClusterStore<R>> {
        &self.inner.store
    }

    pub fn fingerprint(&self) -> StoreFingerprint {
        self.inner.fingerprint
    }

    /// Open sessions, authenticated or not.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn authenticated_count(&self) -> usize {
        self.inner
            .sessions
            .read()
            .values()
            .filter(|entry| entry.state.is_authenticated())
            .count()
    }

    /// Failure record for an origin address, if any.
    pub fn ban_record(&self, address: &str) -> Option<BanRecord> {
        self.inner
            .gatekeeper
            .lock()
            .ban_record(&AddressKey::normalize(address))
    }

    /// Whether an origin address is locked out right now.
    pub fn is_banned(&self, address: &str) -> bool {
        self.inner
            .gatekeeper
            .lock()
            .ledger()
            .is_banned(&AddressKey::normalize(address), now_ms())
    }
}

impl<R: Reducer> Drop for Hub<R> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<R: Reducer> HubInner<R> {
    fn accept(self: &Arc<Self>, channel: Channel) -> SessionId {
        let Channel {
            sink,
            stream,
            origin,
        } = channel;

        let stop = Arc::new(Notify::new());
        let (outbound, _writer) = {
            let _runtime = self.runtime.enter();
            spawn_writer(sink, Arc::clone(&stop), self.errors.clone())
        };

        let id = {
            let mut sessions = self.sessions.write();
            loop {
                let id = SessionId::random();
                if let Entry::Vacant(slot) = sessions.entry(id) {
                    slot.insert(SessionEntry {
                        state: SessionState::AuthPending,
                        origin: AddressKey::normalize(&origin),
                        outbound,
                    });
                    break id;
                }
            }
        };

        if self.stopped.load(Ordering::SeqCst) {
            self.remove_session(id);
            return id;
        }

        info!(session = %id, %origin, "session opened");
        let reader = self
            .runtime
            .spawn(Arc::clone(self).read_loop(id, stream, stop));

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(reader);
        id
    }

    async fn read_loop(
        self: Arc<Self>,
        id: SessionId,
        mut stream: Box<dyn FrameStream>,
        stop: Arc<Notify>,
    ) {
        let deadline = tokio::time::sleep(self.auth_timeout);
        tokio::pin!(deadline);
        let mut awaiting_auth = true;

        loop {
            let frame = tokio::select! {
                _ = stop.notified() => break,
                _ = &mut deadline, if awaiting_auth => {
                    awaiting_auth = false;
                    if self.authenticated_outbound(id).is_some() {
                        continue;
                    }
                    warn!(session = %id, "closing session that never authenticated");
                    self.errors.report(&SyncError::AuthTimeout(self.auth_timeout));
                    break;
                }
                frame = stream.next_frame() => frame,
            };

            let text = match frame {
                None => break,
                Some(Ok(text)) => text,
                Some(Err(error)) => {
                    self.errors.report(&error);
                    break;
                }
            };

            let envelope = match Envelope::decode(&text) {
                Ok(envelope) => envelope,
                Err(error) => {
                    self.errors.report(&error);
                    break;
                }
            };

            if self.handle(id, envelope).is_break() {
                break;
            }
        }
        self.remove_session(id);
    }

    fn handle(&self, id: SessionId, envelope: Envelope) -> ControlFlow<()> {
        if envelope.fingerprint != self.fingerprint {
            debug!(session = %id, "ignoring envelope for another store");
            return ControlFlow::Continue(());
        }

        match envelope.message {
            Message::Auth { login, password } => self.authenticate(id, &login, &password),
            Message::Start => {
                self.send_snapshot(id);
                ControlFlow::Continue(())
            }
            Message::ActionToHub { action } => {
                self.apply_remote(id, action);
                ControlFlow::Continue(())
            }
            other => {
                debug!(session = %id, kind = other.kind(), "ignoring message");
                ControlFlow::Continue(())
            }
        }
    }

    fn authenticate(
        &self,
        id: SessionId,
        login: &IdentityHash,
        password: &SecretHash,
    ) -> ControlFlow<()> {
        let (flow, failure) = {
            let mut gatekeeper = self.gatekeeper.lock();
            let mut sessions = self.sessions.write();
            let Some(entry) = sessions.get_mut(&id) else {
                return ControlFlow::Break(());
            };

            if entry.state.is_authenticated() {
                debug!(session = %id, "repeated AUTH ignored");
                return ControlFlow::Continue(());
            }

            match gatekeeper.admit(&entry.origin, login, password, now_ms()) {
                Admission::Accepted => match entry.state.on(SessionEvent::AuthAccepted) {
                    Ok(state) => {
                        entry.state = state;
                        let reply = Envelope::auth_state(self.fingerprint, true, false);
                        match entry.outbound.send(&reply) {
                            Ok(()) => {
                                info!(session = %id, origin = %entry.origin, "session authenticated");
                                (ControlFlow::Continue(()), None)
                            }
                            Err(error) => (ControlFlow::Break(()), Some(error)),
                        }
                    }
                    Err(error) => (ControlFlow::Break(()), Some(error)),
                },
                Admission::Rejected { failures } => {
                    warn!(session = %id, origin = %entry.origin, failures, "authentication failed");
                    self.refuse(entry, false);
                    (ControlFlow::Break(()), Some(SyncError::AuthRejected))
                }
                Admission::Banned => {
                    warn!(session = %id, origin = %entry.origin, "authentication refused, address locked");
                    self.refuse(entry, true);
                    (ControlFlow::Break(()), Some(SyncError::AddressLocked))
                }
            }
        };

        if let Some(error) = failure {
            self.errors.report(&error);
        }
        flow
    }

    fn refuse(&self, entry: &mut SessionEntry, banned: bool) {
        entry.state = entry
            .state
            .on(SessionEvent::AuthRejected)
            .unwrap_or(SessionState::Closed);
        let _ = entry
            .outbound
            .send(&Envelope::auth_state(self.fingerprint, false, banned));
        entry.outbound.close();
    }

    fn authenticated_outbound(&self, id: SessionId) -> Option<Outbound> {
        self.sessions
            .read()
            .get(&id)
            .filter(|entry| entry.state.is_authenticated())
            .map(|entry| entry.outbound.clone())
    }

    fn send_snapshot(&self, id: SessionId) {
        let Some(outbound) = self.authenticated_outbound(id) else {
            self.errors.report(&SyncError::ProtocolViolation(
                "START before authentication".into(),
            ));
            return;
        };

        // Queued with dispatches held off, so the snapshot lands between
        // the broadcasts it already reflects and the ones it does not.
        let result = self.store.with_quiescent_state(|state| -> Result<()> {
            let action = replace_state_action(state)?;
            outbound.send(&Envelope::to_leaf(self.fingerprint, action))
        });
        match result {
            Ok(()) => debug!(session = %id, "snapshot sent"),
            Err(error) => self.errors.report(&error),
        }
    }

    fn apply_remote(&self, id: SessionId, action: Option<Action>) {
        if self.authenticated_outbound(id).is_none() {
            self.errors.report(&SyncError::ProtocolViolation(
                "ACTION_TO_HUB before authentication".into(),
            ));
            return;
        }
        let Some(action) = action else {
            debug!(session = %id, "ACTION_TO_HUB without action");
            return;
        };
        if let Err(error) = validate_remote_action(&action) {
            warn!(session = %id, kind = %action.kind, "rejected action from leaf");
            self.errors
                .report(&SyncError::ProtocolViolation(error.to_string()));
            return;
        }

        self.store
            .dispatch_cluster(ClusterAction::User(action), Origin::Session(id.0));
    }

    fn broadcast(&self, event: &StoreEvent<'_, R::State>) {
        let (action, skip) = match (self.store.mode(), event.action) {
            (ReplicationMode::Snapshot, _) => match replace_state_action(event.state) {
                Ok(action) => (action, None),
                Err(error) => {
                    self.errors.report(&error.into());
                    return;
                }
            },
            (ReplicationMode::Action, ClusterAction::ReplaceState(_)) => return,
            (ReplicationMode::Action, ClusterAction::User(action)) => {
                if action.is_bookkeeping() || action.is_replace_state() {
                    return;
                }
                let skip = match event.origin {
                    Origin::Session(id) => Some(SessionId(id)),
                    Origin::Local | Origin::Upstream => None,
                };
                (action.clone(), skip)
            }
        };

        let frame = match Envelope::to_leaf(self.fingerprint, action).encode() {
            Ok(frame) => frame,
            Err(error) => {
                self.errors.report(&error);
                return;
            }
        };

        let sessions = self.sessions.read();
        for (id, entry) in sessions.iter() {
            if !entry.state.is_authenticated() || Some(*id) == skip {
                continue;
            }
            if let Err(error) = entry.outbound.send_frame(frame.clone()) {
                debug!(session = %id, %error, "broadcast skipped stopped session");
            }
        }
    }

    fn remove_session(&self, id: SessionId) {
        let removed = self.sessions.write().remove(&id);
        if let Some(entry) = removed {
            entry.outbound.close();
            info!(session = %id, origin = %entry.origin, "session closed");
        }
    }

    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(subscription) = self.subscription.lock().take() {
            self.store.unsubscribe(subscription);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let sessions: Vec<_> = self.sessions.write().drain().collect();
        for (_, entry) in sessions {
            entry.outbound.close();
        }
        self.store.release_role(Role::Server);
        info!(store = self.store.name(), "hub stopped");
    }
}

async fn sweep_loop<R: Reducer>(hub: Weak<HubInner<R>>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(hub) = hub.upgrade() else {
            break;
        };
        let evicted = hub.gatekeeper.lock().sweep(now_ms());
        if evicted > 0 {
            debug!(evicted, "expired ban records evicted");
        }
    }
}
