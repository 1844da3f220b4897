//! Presence service
//!
//! Entry point for the connection-handling layer: heartbeats, location
//! updates, and snapshot reads over the user and domain registries.

use metaverse_common::PresenceConfig;
use metaverse_core::{
    DomainPresenceSnapshot, LocationPatch, MinuteLedger, PresenceResult, SessionIdGenerator,
    SessionKey, UserPresenceSnapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::domains::DomainPresenceManager;
use crate::linker::PresenceLinker;
use crate::session_id::UuidSessionIds;
use crate::store::ReaperHandle;
use crate::users::UserPresenceManager;

/// Presence service
///
/// Cheap to clone; all clones share the same registries.
#[derive(Clone)]
pub struct PresenceService {
    users: Arc<UserPresenceManager>,
    domains: Arc<DomainPresenceManager>,
    config: PresenceConfig,
    reapers: Arc<Mutex<Vec<ReaperHandle>>>,
}

impl PresenceService {
    /// Start building a service around a minute ledger
    pub fn builder(
        config: PresenceConfig,
        ledger: Arc<dyn MinuteLedger>,
    ) -> PresenceServiceBuilder {
        PresenceServiceBuilder {
            config,
            ledger,
            ids: None,
        }
    }

    /// Heartbeat a user, returning its session id
    ///
    /// # Errors
    /// Returns `InvalidKey` for a malformed user id; no session is created.
    #[instrument(skip(self))]
    pub async fn heartbeat_user(&self, user_id: &str) -> PresenceResult<String> {
        let user_id = SessionKey::new(user_id)?;
        Ok(self.users.heartbeat(&user_id))
    }

    /// Heartbeat a user and apply a partial location update
    ///
    /// # Errors
    /// Returns `InvalidKey` for a malformed user id.
    #[instrument(skip(self, patch))]
    pub async fn update_user_location(
        &self,
        user_id: &str,
        patch: &LocationPatch,
    ) -> PresenceResult<String> {
        let user_id = SessionKey::new(user_id)?;
        Ok(self.users.update_location(&user_id, patch))
    }

    /// Keep a domain online
    ///
    /// # Errors
    /// Returns `InvalidKey` for a malformed domain id.
    #[instrument(skip(self))]
    pub async fn heartbeat_domain(&self, domain_id: &str) -> PresenceResult<()> {
        let domain_id = SessionKey::new(domain_id)?;
        self.domains.heartbeat(&domain_id);
        Ok(())
    }

    /// Users currently inside a domain, `None` if the domain is offline
    pub async fn domain_roster(
        &self,
        domain_id: &str,
    ) -> PresenceResult<Option<Vec<UserPresenceSnapshot>>> {
        Ok(self.domain_presence(domain_id).await?.map(|domain| domain.users))
    }

    /// Snapshot of a domain and its roster
    pub async fn domain_presence(
        &self,
        domain_id: &str,
    ) -> PresenceResult<Option<DomainPresenceSnapshot>> {
        let domain_id = SessionKey::new(domain_id)?;
        Ok(self
            .domains
            .snapshot_where(&domain_id, |user| self.users.is_online(user)))
    }

    /// Number of live users in a domain
    pub async fn domain_online_count(&self, domain_id: &str) -> PresenceResult<usize> {
        let domain_id = SessionKey::new(domain_id)?;
        Ok(self
            .domains
            .online_count_where(&domain_id, |user| self.users.is_online(user)))
    }

    /// Snapshot of a user's session, `None` if the user is offline
    pub async fn user_presence(
        &self,
        user_id: &str,
    ) -> PresenceResult<Option<UserPresenceSnapshot>> {
        let user_id = SessionKey::new(user_id)?;
        Ok(self.users.presence(&user_id))
    }

    /// Explicitly end a user's session
    #[instrument(skip(self))]
    pub async fn disconnect_user(&self, user_id: &str) -> PresenceResult<bool> {
        let user_id = SessionKey::new(user_id)?;
        Ok(self.users.disconnect(&user_id))
    }

    pub fn online_user_count(&self) -> usize {
        self.users.online_count()
    }

    pub fn online_domain_count(&self) -> usize {
        self.domains.domain_count()
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Run one reaper pass over both registries
    ///
    /// Users go first so expiring users are detached before their domain is
    /// considered.
    pub fn sweep(&self) -> usize {
        self.users.sweep() + self.domains.sweep()
    }

    /// Start the background reapers; calling it again is a no-op
    pub fn start(&self) {
        let mut reapers = self.reapers.lock();
        if !reapers.is_empty() {
            debug!("Reapers already running");
            return;
        }

        let interval = self.config.reaper_interval();
        reapers.push(self.users.spawn_reaper(interval));
        reapers.push(self.domains.spawn_reaper(interval));

        info!(
            ttl_secs = self.config.session_ttl().as_secs(),
            interval_ms = interval.as_millis() as u64,
            "Presence service started"
        );
    }

    /// Stop the background reapers
    ///
    /// Sessions stay in memory; they are simply no longer reaped.
    pub async fn shutdown(&self) {
        let reapers = std::mem::take(&mut *self.reapers.lock());
        for reaper in reapers {
            reaper.stop().await;
        }
        info!("Presence service stopped");
    }

    /// Whether the background reapers are running
    pub fn is_running(&self) -> bool {
        let reapers = self.reapers.lock();
        !reapers.is_empty() && reapers.iter().all(|reaper| !reaper.is_finished())
    }
}

impl std::fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceService")
            .field("users", &self.users)
            .field("domains", &self.domains)
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`PresenceService`]
pub struct PresenceServiceBuilder {
    config: PresenceConfig,
    ledger: Arc<dyn MinuteLedger>,
    ids: Option<Arc<dyn SessionIdGenerator>>,
}

impl PresenceServiceBuilder {
    /// Use a custom session id generator instead of random UUIDs
    pub fn session_ids(mut self, ids: Arc<dyn SessionIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> PresenceService {
        let ttl = self.config.session_ttl();
        let domains = Arc::new(DomainPresenceManager::new(ttl));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UuidSessionIds) as Arc<dyn SessionIdGenerator>);
        let users = UserPresenceManager::new(
            ttl,
            PresenceLinker::new(Arc::clone(&domains)),
            self.ledger,
            ids,
        );

        PresenceService {
            users: Arc::new(users),
            domains,
            config: self.config,
            reapers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}
