//! # Statehub Testkit
//!
//! Testing utilities for statehub.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Reducers**: [`CounterReducer`] and [`LogReducer`], small enough to
//!   reason about in assertions
//! - **Fixtures**: [`TestCluster`], a Hub plus any number of Leaves wired
//!   over an in-process network, each with its own reducer registry as if
//!   it ran in a separate process
//! - **Generators**: proptest strategies for actions, origin addresses and
//!   logins
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use statehub_testkit::{CounterReducer, TestCluster};
//!
//! let cluster = TestCluster::start(CounterReducer::new, HubConfig::default().with_login("demo", "demo"))?;
//! let leaf = cluster.add_leaf("10.0.0.1", "demo", "demo")?;
//! assert!(wait_until(|| leaf.is_synced()).await);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use statehub_testkit::generators::action_sequence;
//!
//! proptest! {
//!     #[test]
//!     fn counter_never_panics(actions in action_sequence(32)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    recording_sink, wait_until, Counter, CounterReducer, LogReducer, TestCluster, TestLeaf,
    HUB_HOST, LEAF_RECONNECT,
};
