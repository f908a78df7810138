//! Error types for the auth module.

use thiserror::Error;

/// Errors that can occur while building or querying auth state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A configured login or password is empty.
    #[error("empty {0} in credential list")]
    EmptyCredential(&'static str),

    /// A ledger key that no address normalizes to.
    #[error("malformed address key: {0}")]
    MalformedAddressKey(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
