//! Value objects

mod session_key;

pub use session_key::SessionKey;
