//! Error types for the store module.

use thiserror::Error;

use crate::memory::Role;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another live store already uses this reducer name.
    #[error("a reducer named {0:?} is already registered")]
    DuplicateReducer(String),

    /// Reducer names must be non-empty.
    #[error("reducer name must not be empty")]
    EmptyReducerName,

    /// The role is already attached to this store.
    #[error("store already has the {0} role")]
    RoleTaken(Role),

    /// A store is either a Hub or a Leaf, never a relay between the two.
    #[error("store already has the {0} role and cannot hold both")]
    RoleConflict(Role),

    /// Action rejected before reaching the reducer.
    #[error("invalid action: {0}")]
    Validation(#[from] statehub_core::ValidationError),

    /// Core conversion error.
    #[error("core error: {0}")]
    Core(#[from] statehub_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
