//! Refresh loops — one background task per tracked instance.
//!
//! A loop never interrupts a refresh in progress: shutdown is only
//! observed between cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use streamwatch_core::RefreshMode;

use crate::instance::InstanceTracker;

/// When a loop refreshes its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub mode: RefreshMode,
    /// Period in `Periodic` mode; minimum spacing in `OnDemand` mode.
    pub interval: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            mode: RefreshMode::Periodic,
            interval: Duration::from_secs(10),
        }
    }
}

/// Drive `tracker` until `shutdown` flips.
///
/// Both modes refresh once immediately so the cache is populated at startup.
pub async fn run_refresh_loop(
    tracker: Arc<InstanceTracker>,
    schedule: RefreshSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(instance = %tracker.name(), mode = ?schedule.mode, "refresh loop starting");
    let _ = tracker.refresh().await;
    let mut last = Instant::now();

    loop {
        match schedule.mode {
            RefreshMode::Periodic => {
                tokio::select! {
                    _ = tokio::time::sleep(schedule.interval) => {}
                    _ = shutdown.changed() => break,
                }
            }
            RefreshMode::OnDemand => {
                tokio::select! {
                    _ = tracker.trigger().notified() => {}
                    _ = shutdown.changed() => break,
                }
                let ready_at = last + schedule.interval;
                if Instant::now() < ready_at {
                    tokio::select! {
                        _ = tokio::time::sleep_until(ready_at) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        let _ = tracker.refresh().await;
        last = Instant::now();
    }

    debug!(instance = %tracker.name(), "refresh loop shutting down");
}
