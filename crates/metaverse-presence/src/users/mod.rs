//! User-keyed presence registry

mod manager;
mod session;

pub use manager::UserPresenceManager;
pub use session::{UserSession, UserSessionState};
