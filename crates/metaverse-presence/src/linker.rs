//! Presence linker
//!
//! The only code that mutates both registries. Keeps a user's current domain
//! and that domain's roster in agreement as users move, leave, or expire.

use metaverse_core::{PresenceResult, SessionKey};
use std::sync::Arc;

use crate::domains::DomainPresenceManager;
use crate::users::{UserSession, UserSessionState};

/// Stateless coordinator between the user and domain registries
#[derive(Debug, Clone)]
pub struct PresenceLinker {
    domains: Arc<DomainPresenceManager>,
}

impl PresenceLinker {
    pub fn new(domains: Arc<DomainPresenceManager>) -> Self {
        Self { domains }
    }

    pub fn domains(&self) -> &Arc<DomainPresenceManager> {
        &self.domains
    }

    /// Move `user` into `new_domain`, or out of any domain with `None`
    ///
    /// `state` must be the locked state of `user`; holding it across the whole
    /// move means nobody observes the new `domain_id` before the rosters have
    /// been updated. Staying in the same domain is not a move, but a user
    /// missing from that domain's live roster is put back without refreshing
    /// the domain.
    ///
    /// # Errors
    /// Returns `UnknownDomainOnLink` if the target domain could not be joined.
    /// The user is then left outside every domain.
    pub fn link(
        &self,
        user: &Arc<UserSession>,
        state: &mut UserSessionState,
        new_domain: Option<&SessionKey>,
    ) -> PresenceResult<()> {
        if state.location.domain_id.as_ref() == new_domain {
            return self.rejoin(user, state);
        }

        if let Some(previous) = &state.location.domain_id {
            self.domains.remove_user(previous, user);
        }

        if let Some(domain_id) = new_domain {
            self.domains.heartbeat(domain_id);
            if let Err(e) = self.domains.add_user(domain_id, user) {
                state.location.domain_id = None;
                return Err(e);
            }
        }

        state.location.domain_id = new_domain.cloned();
        Ok(())
    }

    /// Put `user` back on the roster of the domain it is already in
    ///
    /// Covers a domain that expired and came back with an empty roster while
    /// the user kept heartbeating. Does nothing when the user is in no domain,
    /// the domain is offline, or the user is already listed. The domain is
    /// never refreshed.
    ///
    /// # Errors
    /// Returns `UnknownDomainOnLink` if the domain expired between the
    /// liveness check and the roster update.
    pub fn rejoin(&self, user: &Arc<UserSession>, state: &UserSessionState) -> PresenceResult<()> {
        let Some(domain_id) = &state.location.domain_id else {
            return Ok(());
        };
        if self.domains.is_live(domain_id) && !self.domains.contains(domain_id, user) {
            self.domains.add_user(domain_id, user)?;
        }
        Ok(())
    }
}
