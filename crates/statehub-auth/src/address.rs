//! Origin address normalization.
//!
//! Ledger keys replace `.` with `_` so they are safe in any key space that
//! treats dots as path separators. To keep the mapping a bijection, literal
//! `_` and the escape character `~` are escaped:
//!
//! | address char | key text |
//! |---|---|
//! | `.` | `_` |
//! | `_` | `~_` |
//! | `~` | `~~` |
//!
//! Addresses are compared textually: `::ffff:10.0.0.1` and `10.0.0.1` are
//! different keys.

use std::fmt;

use crate::error::{AuthError, Result};

/// A normalized origin address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressKey(String);

impl AddressKey {
    /// Normalize a textual address. Surrounding whitespace is ignored.
    pub fn normalize(address: &str) -> Self {
        let trimmed = address.trim();
        let mut key = String::with_capacity(trimmed.len());
        for c in trimmed.chars() {
            match c {
                '.' => key.push('_'),
                '_' => key.push_str("~_"),
                '~' => key.push_str("~~"),
                other => key.push(other),
            }
        }
        Self(key)
    }

    /// Parse an already-normalized key.
    pub fn from_key(key: &str) -> Result<Self> {
        let candidate = Self(key.to_string());
        candidate.to_address()?;
        Ok(candidate)
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the address this key was normalized from.
    pub fn to_address(&self) -> Result<String> {
        let mut address = String::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            match c {
                '_' => address.push('.'),
                '~' => match chars.next() {
                    Some(escaped @ ('_' | '~')) => address.push(escaped),
                    _ => return Err(AuthError::MalformedAddressKey(self.0.clone())),
                },
                other => address.push(other),
            }
        }
        Ok(address)
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ipv4_dots_replaced() {
        let key = AddressKey::normalize("192.168.0.1");
        assert_eq!(key.as_str(), "192_168_0_1");
        assert_eq!(key.to_address().unwrap(), "192.168.0.1");
    }

    #[test]
    fn test_ipv6_passes_through() {
        let key = AddressKey::normalize("2001:db8::1");
        assert_eq!(key.as_str(), "2001:db8::1");
    }

    #[test]
    fn test_ipv4_mapped_ipv6_is_distinct_from_ipv4() {
        let v4 = AddressKey::normalize("10.0.0.1");
        let mapped = AddressKey::normalize("::ffff:10.0.0.1");
        assert_ne!(v4, mapped);
        assert_eq!(mapped.to_address().unwrap(), "::ffff:10.0.0.1");
    }

    #[test]
    fn test_underscore_does_not_collide_with_dot() {
        let dotted = AddressKey::normalize("a.b");
        let underscored = AddressKey::normalize("a_b");
        assert_ne!(dotted, underscored);
        assert_eq!(underscored.to_address().unwrap(), "a_b");
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(
            AddressKey::normalize(" 127.0.0.1 "),
            AddressKey::normalize("127.0.0.1")
        );
    }

    #[test]
    fn test_malformed_key_rejected() {
        assert!(AddressKey::from_key("1_2_3_4").is_ok());
        assert!(AddressKey::from_key("bad~x").is_err());
        assert!(AddressKey::from_key("trailing~").is_err());
    }

    proptest! {
        #[test]
        fn normalization_is_reversible(address in "[0-9a-f:._~]{0,40}") {
            let key = AddressKey::normalize(&address);
            prop_assert_eq!(key.to_address().unwrap(), address);
        }

        #[test]
        fn normalization_is_injective(a in "[0-9._~]{0,12}", b in "[0-9._~]{0,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(AddressKey::normalize(&a), AddressKey::normalize(&b));
        }
    }
}
