//! Action and replication types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Action type that carries a full state snapshot.
///
/// Only the Hub may originate it. The store adapter recognizes it before the
/// user reducer runs, so reducers never have to special-case it.
pub const REPLACE_STATE_TYPE: &str = "STATEHUB_SYNC";

/// Prefix of internal bookkeeping action types (e.g. `@@INIT`). Such
/// actions are never rebroadcast.
pub const BOOKKEEPING_PREFIX: &str = "@@";

/// A `type`-tagged JSON object.
///
/// Every key other than `type` is kept verbatim in `fields`, so actions
/// produced by other implementations survive a round trip through a Hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The action type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Action {
    /// Create an action with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add the conventional `payload` field.
    pub fn with_payload(self, value: impl Into<Value>) -> Self {
        self.with_field("payload", value)
    }

    /// Get a field by name.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get the `payload` field.
    pub fn payload(&self) -> Option<&Value> {
        self.field("payload")
    }

    /// Whether this action uses the reserved replace-state type.
    pub fn is_replace_state(&self) -> bool {
        self.kind == REPLACE_STATE_TYPE
    }

    /// Whether this is an internal bookkeeping action.
    pub fn is_bookkeeping(&self) -> bool {
        self.kind.starts_with(BOOKKEEPING_PREFIX)
    }
}

/// What a store actually applies: a user action, or a snapshot that
/// replaces the state wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAction<S> {
    /// Replace the whole state.
    ReplaceState(S),
    /// Fold a user action through the reducer.
    User(Action),
}

impl<S> ClusterAction<S> {
    /// Whether this is the replace-state variant.
    pub fn is_replace_state(&self) -> bool {
        matches!(self, ClusterAction::ReplaceState(_))
    }

    /// The user action, if any.
    pub fn user(&self) -> Option<&Action> {
        match self {
            ClusterAction::User(action) => Some(action),
            ClusterAction::ReplaceState(_) => None,
        }
    }
}

impl<S: Serialize> ClusterAction<S> {
    /// Encode into the wire action shape.
    ///
    /// The replace-state variant becomes `{ "type": REPLACE_STATE_TYPE,
    /// "payload": <state> }`.
    pub fn to_wire(&self) -> Result<Action, CoreError> {
        match self {
            ClusterAction::User(action) => Ok(action.clone()),
            ClusterAction::ReplaceState(state) => replace_state_action(state),
        }
    }
}

/// Build the wire form of a snapshot without cloning the state.
pub fn replace_state_action<S: Serialize>(state: &S) -> Result<Action, CoreError> {
    let payload =
        serde_json::to_value(state).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(Action::new(REPLACE_STATE_TYPE).with_payload(payload))
}

impl<S: DeserializeOwned> ClusterAction<S> {
    /// Decode a wire action, recognizing the replace-state type.
    pub fn from_wire(mut action: Action) -> Result<Self, CoreError> {
        if !action.is_replace_state() {
            return Ok(ClusterAction::User(action));
        }

        let payload = action
            .fields
            .remove("payload")
            .ok_or(CoreError::MissingPayload)?;
        let state =
            serde_json::from_value(payload).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Ok(ClusterAction::ReplaceState(state))
    }
}

/// How a Hub rebroadcasts local store changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Rebroadcast each dispatched action.
    #[default]
    Action,
    /// Rebroadcast the full state after every change.
    Snapshot,
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationMode::Action => f.write_str("action"),
            ReplicationMode::Snapshot => f.write_str("snapshot"),
        }
    }
}

impl FromStr for ReplicationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action" => Ok(ReplicationMode::Action),
            "snapshot" => Ok(ReplicationMode::Snapshot),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}
