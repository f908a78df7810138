//! # Statehub Store
//!
//! The store adapter: everything the replication layer needs from a local
//! state container, and nothing about networks.
//!
//! ## Overview
//!
//! A [`ClusterStore`] wraps a user [`Reducer`] and exposes the classic
//! `get_state` / `dispatch` / `subscribe` contract. It recognizes the
//! replace-state variant of [`ClusterAction`](statehub_core::ClusterAction)
//! itself, so user reducers only ever see their own actions.
//!
//! ## Key Types
//!
//! - [`Reducer`] - the user-supplied `reduce(state, action) -> state`
//! - [`ClusterStore`] - the in-memory store with listeners, mode and roles
//! - [`ReducerRegistry`] - rejects two stores with the same reducer name
//! - [`StoreEvent`] / [`Origin`] - what listeners are told after a change
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statehub_store::{ClusterStore, ReducerRegistry};
//!
//! let registry = ReducerRegistry::new();
//! let store = ClusterStore::new(CounterReducer, &registry)?;
//! store.subscribe(|event| println!("now {:?}", event.state));
//! store.dispatch(Action::new("INCREMENT"))?;
//! ```
//!
//! ## Design Notes
//!
//! - **Serialized dispatch**: one dispatch at a time; listeners run in
//!   dispatch order while the next dispatch waits.
//! - **Listeners must not dispatch**: doing so from inside a listener
//!   deadlocks. Reading state from a listener is fine.

pub mod error;
pub mod memory;
pub mod registry;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{ClusterStore, Role};
pub use registry::ReducerRegistry;
pub use traits::{Listener, Origin, Reducer, StoreEvent, SubscriptionId};
