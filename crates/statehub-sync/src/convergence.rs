//! Convergence verification.
//!
//! Two replicas have converged when their states have the same canonical
//! JSON form. Object keys are emitted in sorted order, so field order in
//! the source type does not matter.

use serde::Serialize;

use statehub_core::Blake3Hash;

use crate::error::{Result, SyncError};

/// Result of comparing two replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Same state.
    Converged { digest: Blake3Hash },
    /// Different state.
    Diverged {
        local: Blake3Hash,
        remote: Blake3Hash,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged { .. })
    }
}

/// Hash of a state's canonical JSON form.
pub fn state_digest<S: Serialize>(state: &S) -> Result<Blake3Hash> {
    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(state).map_err(|e| SyncError::Parse(e.to_string()))?;
    let bytes = serde_json::to_vec(&value).map_err(|e| SyncError::Parse(e.to_string()))?;
    Ok(Blake3Hash::hash(&bytes))
}

/// Compare a local state against a remote one.
pub fn verify_convergence<S: Serialize>(local: &S, remote: &S) -> Result<ConvergenceResult> {
    let local = state_digest(local)?;
    let remote = state_digest(remote)?;

    if local == remote {
        Ok(ConvergenceResult::Converged { digest: local })
    } else {
        Ok(ConvergenceResult::Diverged { local, remote })
    }
}
