//! Session id generation port

/// Produces opaque, unique session ids
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}
