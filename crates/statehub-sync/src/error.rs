//! Error types for the sync module.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use statehub_auth::AuthError;
use statehub_core::{CoreError, ValidationError};
use statehub_store::StoreError;

use crate::session::{SessionEvent, SessionState};

/// Setup mistakes. Returned from constructors, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Host and port do not form a valid endpoint URL.
    #[error("malformed endpoint: {0}")]
    MalformedEndpoint(String),

    /// Hub and Leaf spawn tasks and need a tokio runtime.
    #[error("no tokio runtime is running")]
    NoRuntime,
}

/// Errors that can occur during replication.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The Hub refused the credentials.
    #[error("authentication rejected")]
    AuthRejected,

    /// The Hub refused the origin address after repeated failures.
    #[error("address locked after repeated authentication failures")]
    AddressLocked,

    /// Channel-level failure: connect, read or write.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame is not a valid envelope.
    #[error("parse error: {0}")]
    Parse(String),

    /// A peer sent something it is not allowed to send.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("illegal session transition: {event:?} in state {state:?}")]
    IllegalTransition {
        state: SessionState,
        event: SessionEvent,
    },

    /// A session did not authenticate in time.
    #[error("no authentication within {0:?}")]
    AuthTimeout(std::time::Duration),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Where runtime errors go.
///
/// Hub and Leaf never return errors that happen after setup; they hand them
/// to the sink and carry on. The default sink logs through `tracing`.
#[derive(Clone)]
pub struct ErrorSink(Arc<dyn Fn(&SyncError) + Send + Sync>);

impl ErrorSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Hand an error to the sink.
    pub fn report(&self, error: &SyncError) {
        (self.0)(error)
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::new(|error| tracing::error!(%error, "statehub error"))
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorSink(..)")
    }
}
