//! User presence manager
//!
//! Tracks online users, their live location, and connected-minute
//! accounting. Each user's session is created by its first heartbeat and
//! detached from its domain before it is removed.

use metaverse_core::{
    LocationPatch, MinuteLedger, PresenceError, SessionIdGenerator, SessionKey,
    UserPresenceSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::session::{UserSession, UserSessionState};
use crate::linker::PresenceLinker;
use crate::store::{ReaperHandle, TtlSessionStore};

/// Registry of online users
pub struct UserPresenceManager {
    sessions: Arc<TtlSessionStore<Arc<UserSession>>>,
    linker: PresenceLinker,
    ledger: Arc<dyn MinuteLedger>,
    ids: Arc<dyn SessionIdGenerator>,
}

impl UserPresenceManager {
    pub fn new(
        ttl: Duration,
        linker: PresenceLinker,
        ledger: Arc<dyn MinuteLedger>,
        ids: Arc<dyn SessionIdGenerator>,
    ) -> Self {
        let detach = linker.clone();
        let sessions = TtlSessionStore::new("users", ttl).with_cleanup(
            move |user_id, session: &Arc<UserSession>| {
                let mut state = session.lock();
                state.closed = true;
                detach.link(session, &mut state, None)?;
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session.session_id(),
                    minutes = state.minutes_counted,
                    "User session closed"
                );
                Ok(())
            },
        );

        Self {
            sessions: Arc::new(sessions),
            linker,
            ledger,
            ids,
        }
    }

    /// Heartbeat a user, creating the session on first sight
    ///
    /// Returns the session id. Must be called from within a tokio runtime;
    /// completed minutes are written to the ledger on a spawned task.
    pub fn heartbeat(&self, user_id: &SessionKey) -> String {
        self.with_open_session(user_id, |_, _| ())
    }

    /// Heartbeat a user and apply a partial location update
    ///
    /// A domain change in the patch goes through the linker. Failing to join
    /// the domain is logged and leaves the user outside every domain.
    pub fn update_location(&self, user_id: &SessionKey, patch: &LocationPatch) -> String {
        self.with_open_session(user_id, |session, state| {
            patch.apply(&mut state.location);
            if let Some(new_domain) = patch.domain_change() {
                if let Err(e) = self.linker.link(session, state, new_domain) {
                    tracing::warn!(
                        user_id = %user_id,
                        code = e.code(),
                        error = %e,
                        "Could not join domain"
                    );
                }
            }
        })
    }

    /// Remove a user's session, detaching it from its domain first
    pub fn disconnect(&self, user_id: &SessionKey) -> bool {
        let removed = self.sessions.remove(user_id).is_some();
        if removed {
            tracing::debug!(user_id = %user_id, "User disconnected");
        }
        removed
    }

    /// Live session for a user
    pub fn get(&self, user_id: &SessionKey) -> Option<Arc<UserSession>> {
        self.sessions.get(user_id)
    }

    /// Whether `session` is the user's current, unexpired session
    ///
    /// An expired session that the reaper has not removed yet is offline.
    pub fn is_online(&self, session: &Arc<UserSession>) -> bool {
        self.sessions
            .get(session.user_id())
            .is_some_and(|live| Arc::ptr_eq(&live, session))
    }

    /// Snapshot of a user's session
    pub fn presence(&self, user_id: &SessionKey) -> Option<UserPresenceSnapshot> {
        self.sessions.get(user_id).map(|session| session.snapshot())
    }

    /// Number of online users
    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn linker(&self) -> &PresenceLinker {
        &self.linker
    }

    /// Run one reaper pass
    pub fn sweep(&self) -> usize {
        self.sessions.sweep()
    }

    pub fn spawn_reaper(&self, interval: Duration) -> ReaperHandle {
        self.sessions.spawn_reaper(interval)
    }

    fn touch(&self, user_id: &SessionKey) -> Arc<UserSession> {
        let touched = self
            .sessions
            .touch(user_id, || UserSession::new(self.ids.generate(), user_id.clone()));
        let session = touched.payload;

        if touched.created {
            tracing::debug!(
                user_id = %user_id,
                session_id = %session.session_id(),
                "User came online"
            );
        } else {
            tracing::trace!(user_id = %user_id, "User heartbeat");
        }

        session
    }

    /// Touch the user's session, lock it, and run `f` on it
    ///
    /// Returns the session id. A session reaped between the touch and the
    /// lock is closed; touching again then yields a fresh one.
    fn with_open_session<F>(&self, user_id: &SessionKey, f: F) -> String
    where
        F: FnOnce(&Arc<UserSession>, &mut UserSessionState),
    {
        loop {
            let session = self.touch(user_id);
            let mut state = session.lock();
            if state.closed {
                continue;
            }

            self.refresh(&session, &mut state);
            f(&session, &mut state);
            drop(state);
            return session.session_id().to_string();
        }
    }

    /// Per-heartbeat upkeep on a locked, open session
    ///
    /// Credits completed minutes and puts the user back on its domain's
    /// roster if the domain was re-created since the user joined it.
    fn refresh(&self, session: &Arc<UserSession>, state: &mut UserSessionState) {
        if let Some(delta) = session.account_minutes(state, Instant::now()) {
            self.record_minutes(session.user_id(), delta);
        }

        if let Err(e) = self.linker.rejoin(session, state) {
            tracing::debug!(
                user_id = %session.user_id(),
                code = e.code(),
                error = %e,
                "Could not rejoin domain"
            );
        }
    }

    /// Fire-and-forget write of newly completed minutes
    fn record_minutes(&self, user_id: &SessionKey, delta: u64) {
        let ledger = Arc::clone(&self.ledger);
        let user_id = user_id.clone();

        tokio::spawn(async move {
            if let Err(e) = ledger.add_minutes(&user_id, delta).await {
                let e = match e {
                    e @ PresenceError::DurableWriteFailed { .. } => e,
                    other => PresenceError::durable_write(user_id.as_str(), other),
                };
                tracing::warn!(
                    user_id = %user_id,
                    delta = delta,
                    code = e.code(),
                    error = %e,
                    "Minute accounting degraded"
                );
            }
        });
    }
}

impl std::fmt::Debug for UserPresenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPresenceManager")
            .field("sessions", &self.sessions)
            .finish()
    }
}
