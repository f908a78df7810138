//! Credential store.

use std::collections::HashMap;

use statehub_core::{IdentityHash, SecretHash};

use crate::error::{AuthError, Result};

/// Identity digest to secret digest, built once from configuration.
///
/// Raw logins and passwords are hashed on the way in and dropped.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<IdentityHash, SecretHash>,
}

impl CredentialStore {
    /// Build from `(login, password)` pairs.
    ///
    /// A login listed twice keeps its last password.
    pub fn from_pairs<I, L, P>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, P)>,
        L: AsRef<str>,
        P: AsRef<str>,
    {
        let mut entries = HashMap::new();
        for (login, password) in pairs {
            let (login, password) = (login.as_ref(), password.as_ref());
            if login.is_empty() {
                return Err(AuthError::EmptyCredential("login"));
            }
            if password.is_empty() {
                return Err(AuthError::EmptyCredential("password"));
            }
            entries.insert(IdentityHash::derive(login), SecretHash::derive(password));
        }
        Ok(Self { entries })
    }

    /// Whether the secret matches the one stored for this identity.
    pub fn verify(&self, identity: &IdentityHash, secret: &SecretHash) -> bool {
        self.entries.get(identity) == Some(secret)
    }

    /// Whether an identity is known.
    pub fn contains(&self, identity: &IdentityHash) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
