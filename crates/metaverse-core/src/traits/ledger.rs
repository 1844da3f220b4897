//! Durable minute accounting port
//!
//! The registry only ever adds positive deltas; the implementation owns the
//! persisted "total minutes" counter on the user's record.

use async_trait::async_trait;

use crate::error::PresenceResult;
use crate::value_objects::SessionKey;

#[async_trait]
pub trait MinuteLedger: Send + Sync {
    /// Add `delta` connected minutes to the user's durable total
    ///
    /// Failures should be reported as `PresenceError::DurableWriteFailed`.
    /// The registry logs them and does not retry.
    async fn add_minutes(&self, user_id: &SessionKey, delta: u64) -> PresenceResult<()>;
}
