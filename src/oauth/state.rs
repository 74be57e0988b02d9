//! In-memory PKCE state tracking.
//!
//! Each authorization flow parks its code verifier here under the random
//! `state` parameter until the callback consumes it. Process-local by
//! design: a state is only ever redeemed against the process that minted
//! it. A multi-process deployment would swap this for a shared store keyed
//! the same way.

use crate::types::{ProviderId, UserId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// States older than this are rejected at redemption and swept in the
/// background.
pub const STATE_TTL: Duration = Duration::minutes(15);

/// One in-flight authorization.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub code_verifier: String,
    pub user_id: UserId,
    pub provider_id: ProviderId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct StateStore {
    states: RwLock<HashMap<String, PendingAuthorization>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state: String, pending: PendingAuthorization) {
        self.states.write().unwrap().insert(state, pending);
    }

    /// Atomically look up and remove. Consumption is a write, so a state
    /// can be redeemed at most once.
    pub fn take(&self, state: &str) -> Option<PendingAuthorization> {
        self.states.write().unwrap().remove(state)
    }

    /// Drop entries older than [`STATE_TTL`]. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - STATE_TTL;
        let mut states = self.states.write().unwrap();
        let before = states.len();
        states.retain(|_, pending| pending.created_at > cutoff);
        before - states.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.states.read().unwrap().len()
    }
}
