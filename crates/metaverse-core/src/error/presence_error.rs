//! Presence errors - error kinds surfaced by the session registry

use thiserror::Error;

/// Presence registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    /// Empty or malformed identity passed to the registry
    #[error("Invalid session key: {0:?}")]
    InvalidKey(String),

    /// A location update referenced a domain with no live session
    #[error("Domain has no live session: {0}")]
    UnknownDomainOnLink(String),

    /// The external minute-accounting write failed
    #[error("Durable minute write failed for {user_id}: {reason}")]
    DurableWriteFailed { user_id: String, reason: String },
}

impl PresenceError {
    /// Get an error code string for observability and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::UnknownDomainOnLink(_) => "UNKNOWN_DOMAIN_ON_LINK",
            Self::DurableWriteFailed { .. } => "DURABLE_WRITE_FAILED",
        }
    }

    /// Create a durable write failure for a user
    pub fn durable_write(user_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::DurableWriteFailed {
            user_id: user_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is the caller's fault
    ///
    /// Only `InvalidKey` is ever returned to callers of the user operations;
    /// everything else degrades inside the registry.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidKey(_))
    }
}

/// Result type for presence operations
pub type PresenceResult<T> = Result<T, PresenceError>;
