//! Ban ledger.
//!
//! Tracks failed authentication attempts per origin address and decides
//! whether an address is currently locked out.
//!
//! ## Semantics
//!
//! - An address is banned iff `failure_count >= threshold` and
//!   `now - last_attempt_ms < window`.
//! - A failure after the window has elapsed resets the count before adding
//!   itself, so it yields `failure_count == 1`.
//! - A successful login clears the record.
//! - [`BanLedger::sweep`] evicts records whose window has elapsed.
//!
//! Time is passed in as Unix milliseconds; the ledger never reads a clock.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use statehub_core::serde_helpers::duration_ms;

use crate::address::AddressKey;

/// Thresholds for the ban ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanPolicy {
    /// Failures within one window that lock an address.
    pub threshold: u32,
    /// How long a failure is remembered.
    #[serde(rename = "window_ms", with = "duration_ms")]
    pub window: Duration,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            threshold: 15,
            window: Duration::from_secs(3 * 60 * 60),
        }
    }
}

impl BanPolicy {
    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis().min(u64::MAX as u128) as u64
    }
}

/// Failure history of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanRecord {
    /// Time of the most recent failure (Unix ms).
    pub last_attempt_ms: u64,
    /// Failures since the record was created or last reset.
    pub failure_count: u32,
}

/// Per-address failure records.
#[derive(Debug, Clone, Default)]
pub struct BanLedger {
    policy: BanPolicy,
    records: HashMap<AddressKey, BanRecord>,
}

impl BanLedger {
    /// Create an empty ledger.
    pub fn new(policy: BanPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    fn window_elapsed(&self, record: &BanRecord, now_ms: u64) -> bool {
        now_ms.saturating_sub(record.last_attempt_ms) >= self.policy.window_ms()
    }

    /// Whether `key` is locked out at `now_ms`.
    ///
    /// Does not mutate the ledger.
    pub fn is_banned(&self, key: &AddressKey, now_ms: u64) -> bool {
        match self.records.get(key) {
            Some(record) => {
                record.failure_count >= self.policy.threshold
                    && !self.window_elapsed(record, now_ms)
            }
            None => false,
        }
    }

    /// Record a failed attempt and return the updated count.
    pub fn record_failure(&mut self, key: &AddressKey, now_ms: u64) -> u32 {
        let window_ms = self.policy.window_ms();
        let record = self.records.entry(key.clone()).or_insert(BanRecord {
            last_attempt_ms: now_ms,
            failure_count: 0,
        });

        if now_ms.saturating_sub(record.last_attempt_ms) >= window_ms {
            record.failure_count = 0;
        }
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_attempt_ms = now_ms;

        if record.failure_count == self.policy.threshold {
            tracing::warn!(origin = %key, failures = record.failure_count, "address locked");
        }
        record.failure_count
    }

    /// Forget an address. Returns whether a record existed.
    pub fn clear(&mut self, key: &AddressKey) -> bool {
        self.records.remove(key).is_some()
    }

    /// Evict every record whose window has elapsed. Returns how many.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let window_ms = self.policy.window_ms();
        let before = self.records.len();
        self.records
            .retain(|_, record| now_ms.saturating_sub(record.last_attempt_ms) < window_ms);
        before - self.records.len()
    }

    /// The record for an address, if any.
    pub fn get(&self, key: &AddressKey) -> Option<&BanRecord> {
        self.records.get(key)
    }

    /// Number of tracked addresses.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no addresses are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
