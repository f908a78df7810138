//! Process-wide reducer name registry.
//!
//! Two stores built from reducers with the same name would compute the same
//! [`StoreFingerprint`] and receive each other's traffic. The registry
//! refuses the second one. It is an explicit object rather than a global so
//! tests can create a fresh one per case or [`clear`](ReducerRegistry::clear)
//! a shared one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use statehub_core::StoreFingerprint;

use crate::error::{Result, StoreError};

/// Tracks which reducer names are currently bound to a live store.
#[derive(Debug, Default)]
pub struct ReducerRegistry {
    names: Mutex<HashMap<String, StoreFingerprint>>,
}

impl ReducerRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a reducer name and return its fingerprint.
    pub fn register(&self, name: &str) -> Result<StoreFingerprint> {
        if name.is_empty() {
            return Err(StoreError::EmptyReducerName);
        }

        let mut names = self.names.lock();
        if names.contains_key(name) {
            return Err(StoreError::DuplicateReducer(name.to_string()));
        }

        let fingerprint = StoreFingerprint::derive(name);
        names.insert(name.to_string(), fingerprint);
        tracing::debug!(reducer = name, fingerprint = %fingerprint, "reducer registered");
        Ok(fingerprint)
    }

    /// Release a reducer name. Returns whether it was registered.
    pub fn release(&self, name: &str) -> bool {
        self.names.lock().remove(name).is_some()
    }

    /// Whether a name is currently claimed.
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains_key(name)
    }

    /// Fingerprint of a claimed name.
    pub fn fingerprint(&self, name: &str) -> Option<StoreFingerprint> {
        self.names.lock().get(name).copied()
    }

    /// Number of claimed names.
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    /// Whether no names are claimed.
    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }

    /// Forget every name.
    pub fn clear(&self) {
        self.names.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_register_returns_fingerprint() {
        let registry = ReducerRegistry::new();
        let fp = registry.register("counter").unwrap();
        assert_eq!(fp, StoreFingerprint::derive("counter"));
        assert_eq!(registry.fingerprint("counter"), Some(fp));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = ReducerRegistry::new();
        registry.register("counter").unwrap();
        assert!(matches!(
            registry.register("counter"),
            Err(StoreError::DuplicateReducer(name)) if name == "counter"
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = ReducerRegistry::new();
        assert!(matches!(
            registry.register(""),
            Err(StoreError::EmptyReducerName)
        ));
    }

    #[test]
    fn test_release_allows_reuse() {
        let registry = ReducerRegistry::new();
        registry.register("counter").unwrap();
        assert!(registry.release("counter"));
        assert!(!registry.release("counter"));
        assert!(registry.register("counter").is_ok());
    }

    #[test]
    fn test_clear() {
        let registry = ReducerRegistry::new();
        registry.register("a").unwrap();
        registry.register("b").unwrap();
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn names_are_exclusive_until_released(name in "[a-z][a-z0-9_-]{0,31}") {
            let registry = ReducerRegistry::new();
            prop_assert_eq!(registry.register(&name).unwrap(), StoreFingerprint::derive(&name));
            prop_assert!(registry.register(&name).is_err());
            prop_assert!(registry.release(&name));
            prop_assert!(registry.register(&name).is_ok());
        }
    }
}
