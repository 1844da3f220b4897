//! Presence entities
//!
//! Location state carried by a user session and the snapshot types returned
//! to readers of the registry.

mod location;
mod presence;

pub use location::{Availability, LocationPatch, LocationState};
pub use presence::{DomainPresenceSnapshot, UserPresenceSnapshot};
