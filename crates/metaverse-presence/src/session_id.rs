//! Session id generation
//!
//! Default generator handed out by the service builder.

use metaverse_core::SessionIdGenerator;

/// Random v4 UUID session ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIds;

impl SessionIdGenerator for UuidSessionIds {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
