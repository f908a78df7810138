//! # Statehub Auth
//!
//! Everything a Hub consults before it lets a session in.
//!
//! ## Overview
//!
//! - **Credential Store**: maps an [`IdentityHash`](statehub_core::IdentityHash)
//!   to a [`SecretHash`](statehub_core::SecretHash). Built once from the
//!   configured logins; immutable afterwards.
//! - **Ban Ledger**: failed-authentication counts per origin address. An
//!   address is banned while its count is at or above the threshold and its
//!   last failure is younger than the window. Once the window has passed
//!   the next failure starts counting from one again.
//! - **Gatekeeper**: combines the two into one admission decision.
//!
//! All time is passed in explicitly as Unix milliseconds, so every decision
//! here is deterministic and testable without a clock.

pub mod address;
pub mod ban;
pub mod credentials;
pub mod error;
pub mod gatekeeper;

pub use address::AddressKey;
pub use ban::{BanLedger, BanPolicy, BanRecord};
pub use credentials::CredentialStore;
pub use error::{AuthError, Result};
pub use gatekeeper::{Admission, Gatekeeper};
