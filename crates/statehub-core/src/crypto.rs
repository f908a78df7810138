//! Digest primitives for statehub.
//!
//! Wraps Blake3 hashing with strong types. Raw logins and passwords never
//! leave the process that was configured with them; only their namespaced
//! digests are stored or sent.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Domain prefix for login digests.
pub const IDENTITY_DOMAIN: &[u8] = b"statehub-identity-v0:";

/// Domain prefix for password digests.
pub const SECRET_DOMAIN: &[u8] = b"statehub-secret-v0:";

/// Domain prefix for reducer-name digests.
pub const FINGERPRINT_DOMAIN: &[u8] = b"statehub-store-v0:";

/// A 32-byte Blake3 hash.
///
/// Serialized as a lowercase hex string so it can travel inside JSON
/// envelopes unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash `domain || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Blake3Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Blake3Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Blake3Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Digest of a namespaced login. Used as the credential map key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(pub Blake3Hash);

impl IdentityHash {
    /// Derive from a raw login.
    pub fn derive(login: &str) -> Self {
        Self(Blake3Hash::hash_with_domain(IDENTITY_DOMAIN, login.as_bytes()))
    }
}

impl fmt::Debug for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityHash({})", &self.0.to_hex()[..16])
    }
}

/// Digest of a namespaced password. Stored and compared, never reversed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHash(pub Blake3Hash);

impl SecretHash {
    /// Derive from a raw password.
    pub fn derive(password: &str) -> Self {
        Self(Blake3Hash::hash_with_domain(SECRET_DOMAIN, password.as_bytes()))
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(..)")
    }
}

/// Identifies one logical store on the wire.
///
/// Hub and every Leaf of the same logical store derive it from the same
/// reducer name, so they agree without coordination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreFingerprint(pub Blake3Hash);

impl StoreFingerprint {
    /// Derive from a reducer name.
    pub fn derive(reducer_name: &str) -> Self {
        Self(Blake3Hash::hash_with_domain(
            FINGERPRINT_DOMAIN,
            reducer_name.as_bytes(),
        ))
    }

    /// Hex form, as used in endpoint paths.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for StoreFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreFingerprint({})", &self.0.to_hex()[..16])
    }
}

impl fmt::Display for StoreFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}
