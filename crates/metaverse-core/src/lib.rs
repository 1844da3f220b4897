//! # metaverse-core
//!
//! Domain layer for the presence registry: session keys, location state,
//! presence snapshots, and the ports the registry consumes (durable minute
//! accounting and session id generation).
//! This crate has zero dependencies on infrastructure (maps, runtimes, storage).

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Availability, DomainPresenceSnapshot, LocationPatch, LocationState, UserPresenceSnapshot,
};
pub use error::{PresenceError, PresenceResult};
pub use traits::{MinuteLedger, SessionIdGenerator};
pub use value_objects::SessionKey;
