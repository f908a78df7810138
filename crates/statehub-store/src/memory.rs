//! In-memory store adapter.
//!
//! Keeps the current state behind a lock and notifies listeners after every
//! dispatch. Nothing is persisted.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use statehub_core::{validate_action, Action, ClusterAction, ReplicationMode, StoreFingerprint};

use crate::error::{Result, StoreError};
use crate::registry::ReducerRegistry;
use crate::traits::{Listener, Origin, Reducer, StoreEvent, SubscriptionId};

/// A replication role a store can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepts sessions from Leaves.
    Server,
    /// Holds one outbound session to a Hub.
    Client,
}

impl Role {
    fn other(self) -> Role {
        match self {
            Role::Server => Role::Client,
            Role::Client => Role::Server,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

#[derive(Debug, Default)]
struct Roles {
    server: bool,
    client: bool,
}

impl Roles {
    fn slot(&mut self, role: Role) -> &mut bool {
        match role {
            Role::Server => &mut self.server,
            Role::Client => &mut self.client,
        }
    }
}

/// Changes waiting to be applied, in dispatch order.
struct DispatchQueue<S> {
    pending: VecDeque<(ClusterAction<S>, Origin)>,
    draining: bool,
}

impl<S> Default for DispatchQueue<S> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            draining: false,
        }
    }
}

/// Clears the draining flag even if a listener panics.
struct Draining<'a, S>(&'a RefCell<DispatchQueue<S>>);

impl<S> Drop for Draining<'_, S> {
    fn drop(&mut self) {
        let mut queue = self.0.borrow_mut();
        queue.draining = false;
        queue.pending.clear();
    }
}

/// A reducer-backed store that the replication layer can observe and feed.
pub struct ClusterStore<R: Reducer> {
    reducer: R,
    fingerprint: StoreFingerprint,
    registry: Arc<ReducerRegistry>,
    state: RwLock<R::State>,
    /// Serializes dispatches so listeners see changes in order. Reentrant:
    /// a listener that dispatches queues its change behind the current one.
    dispatch_lock: ReentrantMutex<RefCell<DispatchQueue<R::State>>>,
    listeners: RwLock<Vec<(SubscriptionId, Listener<R::State>)>>,
    next_subscription: AtomicU64,
    mode: RwLock<ReplicationMode>,
    roles: Mutex<Roles>,
    connected: AtomicBool,
}

impl<R: Reducer> ClusterStore<R> {
    /// Create a store, claiming the reducer's name in `registry`.
    pub fn new(reducer: R, registry: &Arc<ReducerRegistry>) -> Result<Self> {
        let fingerprint = registry.register(reducer.name())?;
        let state = reducer.initial_state();

        Ok(Self {
            reducer,
            fingerprint,
            registry: Arc::clone(registry),
            state: RwLock::new(state),
            dispatch_lock: ReentrantMutex::new(RefCell::new(DispatchQueue::default())),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            mode: RwLock::new(ReplicationMode::default()),
            roles: Mutex::new(Roles::default()),
            connected: AtomicBool::new(true),
        })
    }

    /// The reducer's name.
    pub fn name(&self) -> &str {
        self.reducer.name()
    }

    /// The fingerprint every wire message for this store carries.
    pub fn fingerprint(&self) -> StoreFingerprint {
        self.fingerprint
    }

    /// A copy of the current state.
    pub fn get_state(&self) -> R::State {
        self.state.read().clone()
    }

    /// Run `f` against the current state with dispatches held off.
    ///
    /// Anything `f` enqueues is ordered consistently with listener output:
    /// every change before this call has been announced, none after it has.
    pub fn with_quiescent_state<T>(&self, f: impl FnOnce(&R::State) -> T) -> T {
        let _guard = self.dispatch_lock.lock();
        let state = self.state.read();
        f(&state)
    }

    /// Dispatch a user action from the hosting application.
    ///
    /// The replace-state type is rejected; use
    /// [`replace_state`](Self::replace_state) instead. Called from inside a
    /// listener, the action is applied once the current change has been
    /// announced to every listener.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.dispatch_with(action, |_| Ok(()))
    }

    /// Dispatch a user action, running `forward` first under the dispatch
    /// lock.
    ///
    /// Whatever `forward` emits is ordered exactly like the changes this
    /// store applies. If it fails, nothing is applied.
    pub fn dispatch_with<E, F>(&self, action: Action, forward: F) -> std::result::Result<(), E>
    where
        E: From<StoreError>,
        F: FnOnce(&Action) -> std::result::Result<(), E>,
    {
        validate_action(&action).map_err(StoreError::from)?;
        let queue = self.dispatch_lock.lock();
        forward(&action)?;
        self.enqueue(&queue, ClusterAction::User(action), Origin::Local);
        Ok(())
    }

    /// Replace the whole state and notify listeners.
    pub fn replace_state(&self, state: R::State) {
        self.dispatch_cluster(ClusterAction::ReplaceState(state), Origin::Local);
    }

    /// Apply an action with an explicit origin.
    ///
    /// This is the raw path the replication layer uses; it performs no
    /// validation.
    pub fn dispatch_cluster(&self, action: ClusterAction<R::State>, origin: Origin) {
        let queue = self.dispatch_lock.lock();
        self.enqueue(&queue, action, origin);
    }

    /// Queue a change. The outermost caller drains the queue; nested callers
    /// return as soon as their change is queued.
    fn enqueue(
        &self,
        queue: &RefCell<DispatchQueue<R::State>>,
        action: ClusterAction<R::State>,
        origin: Origin,
    ) {
        {
            let mut queue = queue.borrow_mut();
            queue.pending.push_back((action, origin));
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        let _draining = Draining(queue);
        loop {
            let next = queue.borrow_mut().pending.pop_front();
            let Some((action, origin)) = next else {
                break;
            };
            self.apply(action, origin);
        }
    }

    fn apply(&self, action: ClusterAction<R::State>, origin: Origin) {
        let next = match &action {
            ClusterAction::ReplaceState(state) => state.clone(),
            ClusterAction::User(user) => {
                let current = self.state.read();
                self.reducer.reduce(&current, user)
            }
        };
        *self.state.write() = next.clone();

        let listeners: Vec<Listener<R::State>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let event = StoreEvent {
            action: &action,
            state: &next,
            origin,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Register a listener called after every change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent<'_, R::State>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// Current replication mode.
    pub fn mode(&self) -> ReplicationMode {
        *self.mode.read()
    }

    /// Change the replication mode. Takes effect on the next change.
    pub fn set_mode(&self, mode: ReplicationMode) {
        *self.mode.write() = mode;
    }

    /// Attach a role. Each role may be held once, and a store holds at most
    /// one of the two.
    pub fn claim_role(&self, role: Role) -> Result<()> {
        let mut roles = self.roles.lock();
        if *roles.slot(role.other()) {
            return Err(StoreError::RoleConflict(role.other()));
        }
        let slot = roles.slot(role);
        if *slot {
            return Err(StoreError::RoleTaken(role));
        }
        *slot = true;
        drop(roles);

        if role == Role::Client {
            self.connected.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Detach a role.
    pub fn release_role(&self, role: Role) {
        *self.roles.lock().slot(role) = false;
        if role == Role::Client {
            self.connected.store(true, Ordering::SeqCst);
        }
    }

    /// Whether a role is attached.
    pub fn has_role(&self, role: Role) -> bool {
        let mut roles = self.roles.lock();
        *roles.slot(role)
    }

    /// Whether the store is in sync with its Hub.
    ///
    /// Always true for stores without the client role.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set by the Leaf on authentication and on loss of its session.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl<R: Reducer> Drop for ClusterStore<R> {
    fn drop(&mut self) {
        self.registry.release(self.reducer.name());
    }
}

impl<R: Reducer> fmt::Debug for ClusterStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterStore")
            .field("name", &self.reducer.name())
            .field("fingerprint", &self.fingerprint)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use statehub_core::REPLACE_STATE_TYPE;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    struct CounterReducer(&'static str);

    impl Reducer for CounterReducer {
        type State = Counter;

        fn name(&self) -> &str {
            self.0
        }

        fn initial_state(&self) -> Counter {
            Counter { count: 0 }
        }

        fn reduce(&self, state: &Counter, action: &Action) -> Counter {
            match action.kind.as_str() {
                "INCREMENT" => Counter {
                    count: state.count + 1,
                },
                _ => state.clone(),
            }
        }
    }

    fn store(name: &'static str) -> ClusterStore<CounterReducer> {
        ClusterStore::new(CounterReducer(name), &ReducerRegistry::new()).unwrap()
    }

    #[test]
    fn test_dispatch_folds_through_reducer() {
        let store = store("counter");
        store.dispatch(Action::new("INCREMENT")).unwrap();
        store.dispatch(Action::new("INCREMENT")).unwrap();
        store.dispatch(Action::new("UNKNOWN")).unwrap();
        assert_eq!(store.get_state(), Counter { count: 2 });
    }

    #[test]
    fn test_dispatch_rejects_replace_state_type() {
        let store = store("counter");
        let result = store.dispatch(Action::new(REPLACE_STATE_TYPE));
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.get_state(), Counter { count: 0 });
    }

    #[test]
    fn test_replace_state_bypasses_reducer() {
        let store = store("counter");
        store.replace_state(Counter { count: 41 });
        store.dispatch(Action::new("INCREMENT")).unwrap();
        assert_eq!(store.get_state(), Counter { count: 42 });
    }

    #[test]
    fn test_listeners_see_action_state_and_origin() {
        let store = store("counter");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |event| {
            sink.lock()
                .push((event.action.is_replace_state(), event.state.count, event.origin));
        });

        store.dispatch(Action::new("INCREMENT")).unwrap();
        store.dispatch_cluster(ClusterAction::ReplaceState(Counter { count: 7 }), Origin::Upstream);
        store.dispatch_cluster(ClusterAction::User(Action::new("INCREMENT")), Origin::Session(3));

        assert_eq!(
            *seen.lock(),
            vec![
                (false, 1, Origin::Local),
                (true, 7, Origin::Upstream),
                (false, 8, Origin::Session(3)),
            ]
        );
    }

    #[test]
    fn test_listener_may_read_state() {
        let store = Arc::new(store("counter"));
        let observed = Arc::new(AtomicUsize::new(0));
        let (weak, counter) = (Arc::downgrade(&store), Arc::clone(&observed));
        store.subscribe(move |_| {
            if let Some(store) = weak.upgrade() {
                counter.store(store.get_state().count as usize, Ordering::SeqCst);
            }
        });

        store.dispatch(Action::new("INCREMENT")).unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let store = store("counter");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(Action::new("INCREMENT")).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.dispatch(Action::new("INCREMENT")).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_role_is_exclusive() {
        let store = store("counter");
        assert!(store.is_connected());

        store.claim_role(Role::Client).unwrap();
        assert!(!store.is_connected());
        assert!(matches!(
            store.claim_role(Role::Client),
            Err(StoreError::RoleTaken(Role::Client))
        ));

        store.release_role(Role::Client);
        assert!(store.is_connected());
        assert!(store.claim_role(Role::Client).is_ok());
    }

    #[test]
    fn test_store_is_hub_or_leaf_not_both() {
        let store = store("counter");
        store.claim_role(Role::Client).unwrap();
        assert!(matches!(
            store.claim_role(Role::Server),
            Err(StoreError::RoleConflict(Role::Client))
        ));
        assert!(!store.has_role(Role::Server));

        store.release_role(Role::Client);
        store.claim_role(Role::Server).unwrap();
        assert!(matches!(
            store.claim_role(Role::Client),
            Err(StoreError::RoleConflict(Role::Server))
        ));
        assert!(store.is_connected());
    }

    #[test]
    fn test_listener_may_dispatch_follow_up() {
        let store = Arc::new(store("counter"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (weak, sink) = (Arc::downgrade(&store), Arc::clone(&seen));
        store.subscribe(move |event| {
            let kind = event.action.user().map(|action| action.kind.clone());
            sink.lock().push((kind.clone(), event.state.count));
            if kind.as_deref() == Some("PING") {
                if let Some(store) = weak.upgrade() {
                    store.dispatch(Action::new("INCREMENT")).unwrap();
                }
            }
        });

        let worker = Arc::clone(&store);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(worker.dispatch(Action::new("PING")).is_ok());
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(3)), Ok(true));

        // The follow-up is announced after the action that caused it.
        assert_eq!(
            *seen.lock(),
            vec![
                (Some("PING".to_string()), 0),
                (Some("INCREMENT".to_string()), 1),
            ]
        );
        assert_eq!(store.get_state(), Counter { count: 1 });
    }

    #[test]
    fn test_dispatch_with_orders_forwarding_like_changes() {
        let store = Arc::new(store("counter"));
        let forwarded = Arc::new(Mutex::new(Vec::new()));
        let (weak, log) = (Arc::downgrade(&store), Arc::clone(&forwarded));
        store.subscribe(move |event| {
            if !event.action.user().is_some_and(|a| a.kind == "PING") {
                return;
            }
            if let Some(store) = weak.upgrade() {
                let log = Arc::clone(&log);
                store
                    .dispatch_with(Action::new("PONG"), move |a| {
                        log.lock().push(a.kind.clone());
                        Ok::<(), StoreError>(())
                    })
                    .unwrap();
            }
        });

        let log = Arc::clone(&forwarded);
        store
            .dispatch_with(Action::new("PING"), move |a| {
                log.lock().push(a.kind.clone());
                Ok::<(), StoreError>(())
            })
            .unwrap();
        assert_eq!(*forwarded.lock(), vec!["PING".to_string(), "PONG".to_string()]);
    }

    #[test]
    fn test_failed_forward_applies_nothing() {
        let store = store("counter");
        let result = store.dispatch_with(Action::new("INCREMENT"), |_| {
            Err(StoreError::EmptyReducerName)
        });
        assert!(matches!(result, Err(StoreError::EmptyReducerName)));
        assert_eq!(store.get_state(), Counter { count: 0 });
    }

    #[test]
    fn test_drop_releases_name() {
        let registry = ReducerRegistry::new();
        {
            let _store = ClusterStore::new(CounterReducer("counter"), &registry).unwrap();
            assert!(ClusterStore::new(CounterReducer("counter"), &registry).is_err());
        }
        assert!(ClusterStore::new(CounterReducer("counter"), &registry).is_ok());
    }

    #[test]
    fn test_mode_switch() {
        let store = store("counter");
        assert_eq!(store.mode(), ReplicationMode::Action);
        store.set_mode(ReplicationMode::Snapshot);
        assert_eq!(store.mode(), ReplicationMode::Snapshot);
    }
}
