//! User session
//!
//! The payload of a user-keyed TTL session. Owned by the user registry via
//! `Arc`; domain rosters only hold `Weak` references to it.

use chrono::{DateTime, Utc};
use metaverse_core::{LocationState, SessionKey, UserPresenceSnapshot};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::time::Instant;

const SECS_PER_MINUTE: u64 = 60;

/// Mutable part of a user session, guarded by the session lock
#[derive(Debug, Default)]
pub struct UserSessionState {
    /// Whole minutes already credited to the durable counter
    pub(crate) minutes_counted: u64,
    pub(crate) location: LocationState,
    /// Set once the session has been detached and removed from the registry
    pub(crate) closed: bool,
}

impl UserSessionState {
    pub fn minutes_counted(&self) -> u64 {
        self.minutes_counted
    }

    pub fn location(&self) -> &LocationState {
        &self.location
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A live user session
pub struct UserSession {
    session_id: String,
    user_id: SessionKey,
    since: Instant,
    connected_at: DateTime<Utc>,
    state: Mutex<UserSessionState>,
}

impl UserSession {
    /// Create a fresh session: zero minutes, default location
    pub fn new(session_id: String, user_id: SessionKey) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            user_id,
            since: Instant::now(),
            connected_at: Utc::now(),
            state: Mutex::new(UserSessionState::default()),
        })
    }

    /// Opaque session id, stable for the life of the session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &SessionKey {
        &self.user_id
    }

    /// Monotonic creation instant, the origin for minute accounting
    pub fn since(&self) -> Instant {
        self.since
    }

    /// Lock the mutable state
    ///
    /// Lock order: user map shard, then this lock, then the domain map.
    /// Never touch the user map while holding this guard.
    pub fn lock(&self) -> MutexGuard<'_, UserSessionState> {
        self.state.lock()
    }

    /// Domain the user is currently in
    pub fn domain_id(&self) -> Option<SessionKey> {
        self.state.lock().location.domain_id.clone()
    }

    pub fn minutes_counted(&self) -> u64 {
        self.state.lock().minutes_counted
    }

    /// Whether the session has been detached and removed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Advance the minute watermark to `now`
    ///
    /// `state` must be this session's locked state. Returns the number of
    /// newly completed minutes, or `None` when no whole minute has passed
    /// since the last call. The watermark never moves back.
    pub fn account_minutes(&self, state: &mut UserSessionState, now: Instant) -> Option<u64> {
        let elapsed = elapsed_minutes(self.since, now);
        if elapsed <= state.minutes_counted {
            return None;
        }
        let delta = elapsed - state.minutes_counted;
        state.minutes_counted = elapsed;
        Some(delta)
    }

    /// Copy the session into a snapshot
    pub fn snapshot(&self) -> UserPresenceSnapshot {
        let state = self.state.lock();
        UserPresenceSnapshot {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            minutes_counted: state.minutes_counted,
            location: state.location.clone(),
            connected_at: self.connected_at,
        }
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Whole minutes between two instants
fn elapsed_minutes(since: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(since).as_secs() / SECS_PER_MINUTE
}
