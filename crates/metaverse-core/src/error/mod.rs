//! Error types for the presence domain

mod presence_error;

pub use presence_error::{PresenceError, PresenceResult};
