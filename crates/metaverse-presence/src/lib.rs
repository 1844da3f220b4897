//! # metaverse-presence
//!
//! Ephemeral presence registry: which users and which domains are online,
//! where each user currently is, and how many minutes they have been
//! connected. All state lives in memory and expires through TTL sessions.

pub mod domains;
pub mod ledger;
pub mod linker;
pub mod service;
pub mod session_id;
pub mod store;
pub mod users;

pub use domains::{DomainPresenceManager, DomainSession};
pub use ledger::InMemoryMinuteLedger;
pub use linker::PresenceLinker;
pub use service::{PresenceService, PresenceServiceBuilder};
pub use session_id::UuidSessionIds;
pub use store::{ReaperHandle, TtlSessionStore};
pub use users::{UserPresenceManager, UserSession, UserSessionState};

use metaverse_common::AppConfig;
use std::sync::Arc;
use std::time::Duration;

/// How often the node logs its online counts
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Run a presence node until Ctrl-C
///
/// Minutes are kept in an in-memory ledger; a deployment with a durable user
/// store wires its own `MinuteLedger` through [`PresenceService::builder`].
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let ledger = Arc::new(InMemoryMinuteLedger::new());
    let service = PresenceService::builder(config.presence, ledger).build();
    service.start();

    tracing::info!(name = %config.app.name, "Presence node running");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            _ = status.tick() => {
                tracing::info!(
                    users = service.online_user_count(),
                    domains = service.online_domain_count(),
                    "Presence status"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
