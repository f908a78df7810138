//! Error types for the statehub facade.

use statehub_auth::AuthError;
use statehub_core::{CoreError, ValidationError};
use statehub_store::StoreError;
use statehub_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while setting up or using a [`Cluster`](crate::Cluster).
#[derive(Debug, Error)]
pub enum StatehubError {
    /// Replication error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Action rejected before reaching the store.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Credential or ban ledger error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Core conversion error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A role was requested that this cluster does not hold.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl StatehubError {
    /// Whether this is a setup mistake rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StatehubError::Sync(SyncError::Config(_))
                | StatehubError::Sync(SyncError::Store(_))
                | StatehubError::Store(_)
        )
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, StatehubError>;
