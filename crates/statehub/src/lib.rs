//! # Statehub
//!
//! Replicates one mutable application store from a Hub to many Leaves over
//! message channels.
//!
//! ## Overview
//!
//! - **Hub**: holds the authoritative store, checks logins against hashed
//!   credentials, locks out addresses after repeated failures, and relays
//!   every change to its Leaves
//! - **Leaf**: mirrors a Hub's store and forwards local dispatches to it;
//!   reconnects on its own when the session drops
//! - **Replication mode**: `action` relays each action to every Leaf except
//!   the one it came from; `snapshot` sends the whole state after every
//!   change
//!
//! ## Key Concepts
//!
//! - **Store Fingerprint**: every wire message names the store it belongs
//!   to; messages for other stores are ignored
//! - **Replace-state**: the synthetic action that carries a snapshot. Only
//!   the Hub may originate it, and the store applies it without consulting
//!   the user reducer
//! - **Error sink**: setup mistakes are returned as errors; everything that
//!   goes wrong afterwards is reported to one injectable callback
//!
//! ## Usage
//!
//! ```rust,no_run
//! use statehub::{Action, Cluster, HubConfig, LeafConfig, ReducerRegistry};
//! # use statehub::{Reducer};
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct Counter { count: i64 }
//! # struct CounterReducer;
//! # impl Reducer for CounterReducer {
//! #     type State = Counter;
//! #     fn name(&self) -> &str { "counter" }
//! #     fn initial_state(&self) -> Counter { Counter { count: 0 } }
//! #     fn reduce(&self, s: &Counter, _: &Action) -> Counter { Counter { count: s.count + 1 } }
//! # }
//!
//! async fn example() -> statehub::Result<()> {
//!     // Hub process
//!     let mut hub = Cluster::new(CounterReducer, &ReducerRegistry::new())?;
//!     hub.listen_ws(HubConfig::default().with_login("demo", "demo")).await?;
//!
//!     // Leaf process
//!     let mut leaf = Cluster::new(CounterReducer, &ReducerRegistry::new())?;
//!     leaf.connect_ws(LeafConfig::new("localhost", "demo", "demo"))?;
//!
//!     // Once synchronized, dispatches reach the Hub.
//!     leaf.dispatch(Action::new("INCREMENT"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `statehub::core` - Digests, actions and replication mode
//! - `statehub::store` - The store adapter and reducer registry
//! - `statehub::auth` - Credential store and ban ledger
//! - `statehub::sync` - Hub, Leaf, wire messages and transports

pub mod cluster;
pub mod error;

// Re-export component crates
pub use statehub_auth as auth;
pub use statehub_core as core;
pub use statehub_store as store;
pub use statehub_sync as sync;

// Re-export main types for convenience
pub use cluster::Cluster;
pub use error::{Result, StatehubError};

// Re-export commonly used types
pub use statehub_auth::{BanPolicy, BanRecord};
pub use statehub_core::{Action, ClusterAction, ReplicationMode, StoreFingerprint};
pub use statehub_store::{ClusterStore, Origin, Reducer, ReducerRegistry, StoreEvent};
pub use statehub_sync::{
    state_digest, verify_convergence, ConvergenceResult, Delivery, ErrorSink, Hub, HubConfig,
    Leaf, LeafConfig, SyncError, WsServer, DEFAULT_PORT,
};
