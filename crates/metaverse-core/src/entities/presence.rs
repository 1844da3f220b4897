//! Presence snapshots
//!
//! Plain copies of registry state handed to readers. Mutating a snapshot
//! never affects the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::LocationState;
use crate::value_objects::SessionKey;

/// Point-in-time copy of a user session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresenceSnapshot {
    /// Opaque session id, stable for the life of the session
    pub session_id: String,
    pub user_id: SessionKey,
    /// Whole minutes already credited to the durable counter
    pub minutes_counted: u64,
    pub location: LocationState,
    /// Wall-clock time the session was created
    pub connected_at: DateTime<Utc>,
}

/// Point-in-time copy of a domain session and its roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPresenceSnapshot {
    pub domain_id: SessionKey,
    /// Users currently inside the domain, in arrival order
    pub users: Vec<UserPresenceSnapshot>,
    /// Wall-clock time the domain session was created
    pub online_since: DateTime<Utc>,
}

impl DomainPresenceSnapshot {
    /// Number of users currently inside the domain
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// Whether a user is on the roster
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.user_id.as_str() == user_id)
    }
}
