//! Domain-keyed presence registry

mod manager;

pub use manager::{DomainPresenceManager, DomainSession};
