//! Shared collaborators handed to every instance tracker.

use std::sync::Arc;

use streamwatch_core::epoch_millis;
use streamwatch_metrics::MetricLabelIndex;
use streamwatch_remote::ConnectionManager;

use crate::coordinator::MetricsRefreshCoordinator;

/// Source of "now" in Unix epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(epoch_millis)
}

/// Parameters of the batched job snapshot call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub depth: u32,
    pub include_static: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            include_static: false,
        }
    }
}

/// Everything an [`InstanceTracker`](crate::InstanceTracker) needs besides
/// its own name.
#[derive(Clone)]
pub struct TrackerContext {
    pub domain: String,
    pub connection: Arc<ConnectionManager>,
    pub coordinator: Arc<MetricsRefreshCoordinator>,
    pub clock: Clock,
    pub snapshot: SnapshotOptions,
}

impl TrackerContext {
    pub fn new(
        domain: impl Into<String>,
        connection: Arc<ConnectionManager>,
        coordinator: Arc<MetricsRefreshCoordinator>,
    ) -> Self {
        Self {
            domain: domain.into(),
            connection,
            coordinator,
            clock: system_clock(),
            snapshot: SnapshotOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotOptions) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn index(&self) -> &Arc<MetricLabelIndex> {
        self.coordinator.index()
    }
}
