//! In-memory minute ledger
//!
//! Keeps per-user connected-minute totals in process memory. Used by the
//! presence node when no durable store is wired in, and by tests.

use async_trait::async_trait;
use dashmap::DashMap;
use metaverse_core::{MinuteLedger, PresenceResult, SessionKey};

#[derive(Debug, Default)]
pub struct InMemoryMinuteLedger {
    totals: DashMap<SessionKey, u64>,
}

impl InMemoryMinuteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total minutes recorded for a user
    pub fn total(&self, user_id: &str) -> u64 {
        self.totals.get(user_id).map_or(0, |total| *total)
    }

    /// Number of users with a recorded total
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

#[async_trait]
impl MinuteLedger for InMemoryMinuteLedger {
    async fn add_minutes(&self, user_id: &SessionKey, delta: u64) -> PresenceResult<()> {
        let mut total = self.totals.entry(user_id.clone()).or_insert(0);
        *total = total.saturating_add(delta);
        tracing::trace!(user_id = %user_id, delta = delta, total = *total, "Minutes recorded");
        Ok(())
    }
}
