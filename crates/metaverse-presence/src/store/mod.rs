//! TTL session storage
//!
//! Generic keyed session registry and the background reaper that evicts
//! sessions after an inactivity timeout.

mod reaper;
mod ttl_store;

pub use reaper::{spawn_reaper, ReaperHandle, Sweep};
pub use ttl_store::{CleanupHook, Touched, TtlSessionStore};
