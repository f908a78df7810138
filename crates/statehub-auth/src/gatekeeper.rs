//! Admission decisions for incoming sessions.

use statehub_core::{IdentityHash, SecretHash};

use crate::address::AddressKey;
use crate::ban::{BanLedger, BanPolicy, BanRecord};
use crate::credentials::CredentialStore;

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Credentials matched; any failure record for the address is gone.
    Accepted,
    /// Credentials did not match.
    Rejected {
        /// Failures recorded for the address so far, including this one.
        failures: u32,
    },
    /// The address is locked out. Credentials were not checked.
    Banned,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Credential store plus ban ledger.
#[derive(Debug, Clone, Default)]
pub struct Gatekeeper {
    credentials: CredentialStore,
    ledger: BanLedger,
}

impl Gatekeeper {
    pub fn new(credentials: CredentialStore, policy: BanPolicy) -> Self {
        Self {
            credentials,
            ledger: BanLedger::new(policy),
        }
    }

    /// Decide whether `origin` may authenticate with these digests.
    ///
    /// 1. A banned origin is refused and its record left untouched.
    /// 2. A match clears the origin's record.
    /// 3. A mismatch records one failure.
    pub fn admit(
        &mut self,
        origin: &AddressKey,
        identity: &IdentityHash,
        secret: &SecretHash,
        now_ms: u64,
    ) -> Admission {
        if self.ledger.is_banned(origin, now_ms) {
            return Admission::Banned;
        }

        if self.credentials.verify(identity, secret) {
            self.ledger.clear(origin);
            Admission::Accepted
        } else {
            let failures = self.ledger.record_failure(origin, now_ms);
            Admission::Rejected { failures }
        }
    }

    /// Evict expired ban records.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        self.ledger.sweep(now_ms)
    }

    pub fn ban_record(&self, origin: &AddressKey) -> Option<BanRecord> {
        self.ledger.get(origin).copied()
    }

    pub fn ledger(&self) -> &BanLedger {
        &self.ledger
    }
}
