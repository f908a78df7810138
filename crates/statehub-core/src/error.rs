//! Error types for statehub core.

use thiserror::Error;

/// Errors raised while converting actions and digests.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("replace-state action carries no payload")]
    MissingPayload,

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unknown replication mode: {0}")]
    UnknownMode(String),
}

/// Validation errors for actions entering a store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("action type must not be empty")]
    EmptyActionType,

    #[error("action type {0} is reserved for the hub")]
    ReservedActionType(String),
}
