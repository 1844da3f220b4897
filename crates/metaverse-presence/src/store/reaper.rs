//! Background reaper
//!
//! One periodic sweep task per store instead of one timer per session.
//! Reaping is best-effort: an expired session is removed within one polling
//! interval of crossing its TTL.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Something that can be swept for expired sessions
pub trait Sweep: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run one pass, returning how many sessions were reaped
    fn sweep(&self) -> usize;
}

/// Handle to a running reaper task
///
/// Dropping the handle also ends the task.
pub struct ReaperHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Name of the swept store
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the reaper and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            tracing::warn!(store = %self.name, error = %e, "Reaper task did not shut down cleanly");
        }

        tracing::info!(store = %self.name, "Reaper stopped");
    }
}

impl std::fmt::Debug for ReaperHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaperHandle")
            .field("name", &self.name)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Spawn a task that sweeps `target` every `interval`
///
/// The first pass runs one interval after the call.
pub fn spawn_reaper(target: Arc<dyn Sweep>, interval: Duration) -> ReaperHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let name = target.name().to_string();

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = target.sweep();
                    tracing::trace!(store = target.name(), reaped = reaped, "Reaper pass complete");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(store = target.name(), "Reaper loop ended");
    });

    tracing::info!(
        store = %name,
        interval_ms = interval.as_millis() as u64,
        "Reaper started"
    );

    ReaperHandle {
        name,
        shutdown,
        task,
    }
}
