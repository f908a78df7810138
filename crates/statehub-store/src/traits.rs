//! Reducer contract and store notifications.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use statehub_core::{Action, ClusterAction};

/// A user reducer: a pure function from state and action to next state.
///
/// The name identifies the logical store across processes; Hub and Leaves
/// of the same store must use the same name.
pub trait Reducer: Send + Sync + 'static {
    /// The state this reducer folds over.
    type State: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable name of this reducer.
    fn name(&self) -> &str;

    /// State before any action has been applied.
    fn initial_state(&self) -> Self::State;

    /// Fold one action into the state.
    ///
    /// Unknown action types should return the state unchanged.
    fn reduce(&self, state: &Self::State, action: &Action) -> Self::State;
}

/// Where a dispatched action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Dispatched by the hosting application.
    Local,
    /// Forwarded by the Hub session with this id.
    Session(u64),
    /// Received from the upstream Hub.
    Upstream,
}

/// Handle returned by [`ClusterStore::subscribe`](crate::ClusterStore::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Passed to every listener after a state change.
#[derive(Debug)]
pub struct StoreEvent<'a, S> {
    /// The action that was applied.
    pub action: &'a ClusterAction<S>,
    /// The state after applying it.
    pub state: &'a S,
    /// Who dispatched it.
    pub origin: Origin,
}

/// A store listener.
pub type Listener<S> = Arc<dyn Fn(&StoreEvent<'_, S>) + Send + Sync>;
