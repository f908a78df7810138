//! # Statehub Core
//!
//! Pure primitives shared by every statehub crate: the digests that identify
//! credentials and logical stores, the action type that flows over the wire,
//! and the replication mode switch.
//!
//! This crate contains no I/O, no locking and no networking.
//!
//! ## Key Types
//!
//! - [`IdentityHash`] / [`SecretHash`] - namespaced one-way digests of a login
//!   and a password
//! - [`StoreFingerprint`] - digest of a reducer name; every wire message
//!   carries one
//! - [`Action`] - a `type`-tagged JSON object, the unit of change
//! - [`ClusterAction`] - an [`Action`] or the synthetic replace-state
//!   variant that only the Hub may originate
//! - [`ReplicationMode`] - `action` vs `snapshot` broadcast strategy

pub mod crypto;
pub mod error;
pub mod serde_helpers;
pub mod types;
pub mod validation;

pub use crypto::{Blake3Hash, IdentityHash, SecretHash, StoreFingerprint};
pub use error::{CoreError, ValidationError};
pub use types::{
    replace_state_action, Action, ClusterAction, ReplicationMode, BOOKKEEPING_PREFIX,
    REPLACE_STATE_TYPE,
};
pub use validation::{validate_action, validate_remote_action};
