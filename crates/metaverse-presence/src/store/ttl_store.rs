//! Generic TTL session store
//!
//! A keyed registry where every record carries a last-seen instant and is
//! evicted once it has been idle for longer than the TTL. `touch` is both the
//! initializer and the keep-alive.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metaverse_core::{PresenceResult, SessionKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::reaper::{spawn_reaper, ReaperHandle, Sweep};

/// Hook run with a session's payload right before the session is deleted
pub type CleanupHook<T> = Box<dyn Fn(&SessionKey, &T) -> PresenceResult<()> + Send + Sync>;

/// A stored session record
struct TtlSession<T> {
    payload: T,
    last_seen_at: Instant,
}

impl<T> TtlSession<T> {
    fn new(payload: T, now: Instant) -> Self {
        Self {
            payload,
            last_seen_at: now,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen_at) > ttl
    }
}

/// Result of a `touch`
#[derive(Debug, Clone)]
pub struct Touched<T> {
    /// The live payload (freshly created or existing)
    pub payload: T,
    /// Whether this touch created the session
    pub created: bool,
}

/// Keyed registry of sessions with inactivity expiry
///
/// Uses `DashMap` so read-modify-write of a single key happens under its
/// shard lock. Cleanup hooks run while that lock is held; a hook may lock
/// other stores but must never call back into its own store.
pub struct TtlSessionStore<T> {
    name: &'static str,
    ttl: Duration,
    sessions: DashMap<SessionKey, TtlSession<T>>,
    on_cleanup: Option<CleanupHook<T>>,
}

impl<T: Clone> TtlSessionStore<T> {
    /// Create an empty store
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            sessions: DashMap::new(),
            on_cleanup: None,
        }
    }

    /// Register the hook run before a session is deleted
    #[must_use]
    pub fn with_cleanup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SessionKey, &T) -> PresenceResult<()> + Send + Sync + 'static,
    {
        self.on_cleanup = Some(Box::new(hook));
        self
    }

    /// Store name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Inactivity timeout
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Heartbeat a key
    ///
    /// Creates the session through `on_create` when there is no live session
    /// for `key`, otherwise refreshes its last-seen instant. A session that has
    /// expired but has not been reaped yet is cleaned up and replaced.
    pub fn touch<F>(&self, key: &SessionKey, on_create: F) -> Touched<T>
    where
        F: FnOnce() -> T,
    {
        let now = Instant::now();

        match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now, self.ttl) {
                    self.run_cleanup(key, &entry.get().payload);
                    let payload = on_create();
                    entry.insert(TtlSession::new(payload.clone(), now));
                    tracing::trace!(store = self.name, key = %key, "Replaced expired session");
                    Touched {
                        payload,
                        created: true,
                    }
                } else {
                    let session = entry.get_mut();
                    session.last_seen_at = now;
                    Touched {
                        payload: session.payload.clone(),
                        created: false,
                    }
                }
            }
            Entry::Vacant(entry) => {
                let payload = on_create();
                entry.insert(TtlSession::new(payload.clone(), now));
                Touched {
                    payload,
                    created: true,
                }
            }
        }
    }

    /// Get a live payload without refreshing it
    pub fn get(&self, key: &SessionKey) -> Option<T> {
        let now = Instant::now();
        self.sessions
            .get(key)
            .filter(|session| !session.is_expired(now, self.ttl))
            .map(|session| session.payload.clone())
    }

    /// Mutate a live payload in place without refreshing it
    pub fn update<R, F>(&self, key: &SessionKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let now = Instant::now();
        let mut session = self.sessions.get_mut(key)?;
        if session.is_expired(now, self.ttl) {
            return None;
        }
        Some(f(&mut session.payload))
    }

    /// Whether a live session exists for `key`
    pub fn contains(&self, key: &SessionKey) -> bool {
        let now = Instant::now();
        self.sessions
            .get(key)
            .is_some_and(|session| !session.is_expired(now, self.ttl))
    }

    /// Explicitly remove a session, running the cleanup hook first
    pub fn remove(&self, key: &SessionKey) -> Option<T> {
        self.sessions
            .remove_if(key, |key, session| {
                self.run_cleanup(key, &session.payload);
                true
            })
            .map(|(_, session)| session.payload)
    }

    /// Remove every expired session, returning how many were reaped
    ///
    /// A failing cleanup hook is logged and the session is removed anyway, so
    /// one bad session never stalls the rest of the pass.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();

        // Collect first: removing while iterating would deadlock on the shard.
        let expired: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for key in expired {
            // Re-checked under the shard lock: a heartbeat may have landed since the scan.
            let removed = self.sessions.remove_if(&key, |key, session| {
                if session.is_expired(now, self.ttl) {
                    self.run_cleanup(key, &session.payload);
                    true
                } else {
                    false
                }
            });
            if removed.is_some() {
                reaped += 1;
            }
        }

        if reaped > 0 {
            tracing::debug!(
                store = self.name,
                reaped = reaped,
                remaining = self.sessions.len(),
                "Reaped expired sessions"
            );
        }

        reaped
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .count()
    }

    /// Whether there are no live sessions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all live sessions
    pub fn keys(&self) -> Vec<SessionKey> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn run_cleanup(&self, key: &SessionKey, payload: &T) {
        if let Some(hook) = &self.on_cleanup {
            if let Err(e) = hook(key, payload) {
                tracing::warn!(
                    store = self.name,
                    key = %key,
                    code = e.code(),
                    error = %e,
                    "Session cleanup hook failed"
                );
            }
        }
    }
}

impl<T> TtlSessionStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start the periodic sweep for this store on the current runtime
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> ReaperHandle {
        spawn_reaper(Arc::clone(self) as Arc<dyn Sweep>, interval)
    }
}

impl<T> Sweep for TtlSessionStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn sweep(&self) -> usize {
        TtlSessionStore::sweep(self)
    }
}

impl<T> std::fmt::Debug for TtlSessionStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlSessionStore")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("sessions", &self.sessions.len())
            .field("on_cleanup", &self.on_cleanup.is_some())
            .finish()
    }
}
