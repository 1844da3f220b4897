//! Domain presence manager
//!
//! Tracks which domains are online and the roster of user sessions inside
//! each one. Rosters hold `Weak` references; the user registry owns the
//! sessions. Nothing here ever locks back into the user registry while a
//! domain entry is held.

use chrono::{DateTime, Utc};
use metaverse_core::{DomainPresenceSnapshot, PresenceError, PresenceResult, SessionKey};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::store::{ReaperHandle, TtlSessionStore};
use crate::users::UserSession;

/// Payload of a domain-keyed session
#[derive(Debug, Clone)]
pub struct DomainSession {
    domain_id: SessionKey,
    roster: Vec<Weak<UserSession>>,
    since: DateTime<Utc>,
}

impl DomainSession {
    fn new(domain_id: SessionKey) -> Self {
        Self {
            domain_id,
            roster: Vec::new(),
            since: Utc::now(),
        }
    }

    pub fn domain_id(&self) -> &SessionKey {
        &self.domain_id
    }

    /// When the domain session was created
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Open user sessions still alive, in join order
    ///
    /// Locks each member in turn, so never call it while holding a user
    /// session lock.
    pub fn members(&self) -> Vec<Arc<UserSession>> {
        self.roster
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|user| !user.is_closed())
            .collect()
    }

    /// Raw roster length, dead references included
    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    fn position(&self, user: &Arc<UserSession>) -> Option<usize> {
        self.roster
            .iter()
            .position(|member| std::ptr::eq(member.as_ptr(), Arc::as_ptr(user)))
    }

    fn prune(&mut self) {
        self.roster.retain(|member| member.strong_count() > 0);
    }
}

/// Registry of online domains
pub struct DomainPresenceManager {
    sessions: Arc<TtlSessionStore<DomainSession>>,
}

impl DomainPresenceManager {
    pub fn new(ttl: Duration) -> Self {
        let sessions = TtlSessionStore::new("domains", ttl).with_cleanup(
            |domain_id, domain: &DomainSession| {
                tracing::debug!(
                    domain_id = %domain_id,
                    roster = domain.roster.len(),
                    "Domain session expired"
                );
                Ok(())
            },
        );

        Self {
            sessions: Arc::new(sessions),
        }
    }

    /// Keep a domain online, creating its session with an empty roster
    pub fn heartbeat(&self, domain_id: &SessionKey) -> DomainSession {
        let touched = self
            .sessions
            .touch(domain_id, || DomainSession::new(domain_id.clone()));
        if touched.created {
            tracing::debug!(domain_id = %domain_id, "Domain came online");
        }
        touched.payload
    }

    /// Append a user to a live domain's roster unless already present
    ///
    /// Does not refresh the domain's TTL.
    ///
    /// # Errors
    /// Returns `UnknownDomainOnLink` if the domain has no live session.
    pub fn add_user(&self, domain_id: &SessionKey, user: &Arc<UserSession>) -> PresenceResult<()> {
        self.sessions
            .update(domain_id, |domain| {
                domain.prune();
                if domain.position(user).is_none() {
                    domain.roster.push(Arc::downgrade(user));
                    tracing::debug!(
                        domain_id = %domain_id,
                        user_id = %user.user_id(),
                        roster = domain.roster.len(),
                        "User joined domain"
                    );
                }
            })
            .ok_or_else(|| PresenceError::UnknownDomainOnLink(domain_id.to_string()))
    }

    /// Remove a user from a domain's roster by identity
    ///
    /// Returns whether the user was present. Absent users and offline domains
    /// are not errors.
    pub fn remove_user(&self, domain_id: &SessionKey, user: &Arc<UserSession>) -> bool {
        self.sessions
            .update(domain_id, |domain| {
                let removed = domain.position(user).map(|i| domain.roster.remove(i));
                domain.prune();
                removed.is_some()
            })
            .unwrap_or(false)
    }

    /// Whether the user is in the domain's roster
    pub fn contains(&self, domain_id: &SessionKey, user: &Arc<UserSession>) -> bool {
        self.sessions
            .get(domain_id)
            .is_some_and(|domain| domain.position(user).is_some())
    }

    /// Whether the domain has a live session
    pub fn is_live(&self, domain_id: &SessionKey) -> bool {
        self.sessions.contains(domain_id)
    }

    /// Live session payload without refreshing it
    pub fn get(&self, domain_id: &SessionKey) -> Option<DomainSession> {
        self.sessions.get(domain_id)
    }

    /// Snapshot of the users in a domain
    pub fn snapshot(&self, domain_id: &SessionKey) -> Option<DomainPresenceSnapshot> {
        self.snapshot_where(domain_id, |_| true)
    }

    /// Snapshot of the members of a domain that pass `is_online`
    ///
    /// The reference list is copied out before any user session is locked.
    pub fn snapshot_where<F>(
        &self,
        domain_id: &SessionKey,
        is_online: F,
    ) -> Option<DomainPresenceSnapshot>
    where
        F: Fn(&Arc<UserSession>) -> bool,
    {
        let domain = self.sessions.get(domain_id)?;
        Some(DomainPresenceSnapshot {
            domain_id: domain.domain_id.clone(),
            users: domain
                .members()
                .into_iter()
                .filter(|user| is_online(user))
                .map(|user| user.snapshot())
                .collect(),
            online_since: domain.since,
        })
    }

    /// Number of live users in a domain, zero if the domain is offline
    pub fn online_count(&self, domain_id: &SessionKey) -> usize {
        self.online_count_where(domain_id, |_| true)
    }

    /// Number of members of a domain that pass `is_online`
    pub fn online_count_where<F>(&self, domain_id: &SessionKey, is_online: F) -> usize
    where
        F: Fn(&Arc<UserSession>) -> bool,
    {
        self.sessions.get(domain_id).map_or(0, |domain| {
            domain.members().into_iter().filter(|user| is_online(user)).count()
        })
    }

    /// Number of live domain sessions
    pub fn domain_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run one reaper pass
    pub fn sweep(&self) -> usize {
        self.sessions.sweep()
    }

    pub fn spawn_reaper(&self, interval: Duration) -> ReaperHandle {
        self.sessions.spawn_reaper(interval)
    }
}

impl std::fmt::Debug for DomainPresenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainPresenceManager")
            .field("sessions", &self.sessions)
            .finish()
    }
}
