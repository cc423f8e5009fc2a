//! Domain tracker — owns one [`InstanceTracker`] per configured instance
//! and their refresh loops.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use streamwatch_core::{ConfigError, StreamwatchConfig};
use streamwatch_metrics::MetricLabelIndex;
use streamwatch_remote::{ConnectionManager, PayloadFetcher};

use crate::context::{SnapshotOptions, TrackerContext};
use crate::coordinator::MetricsRefreshCoordinator;
use crate::error::{RefreshError, TrackerError, TrackerResult};
use crate::instance::{InstanceTracker, RefreshReport};
use crate::schedule::{RefreshSchedule, run_refresh_loop};

/// A running refresh loop.
struct LoopSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Tracks every configured instance of one domain.
pub struct DomainTracker {
    domain: String,
    instances: BTreeMap<String, Arc<InstanceTracker>>,
    ctx: TrackerContext,
    schedule: RefreshSchedule,
    loops: Mutex<HashMap<String, LoopSlot>>,
}

impl DomainTracker {
    pub fn new(
        ctx: TrackerContext,
        instances: impl IntoIterator<Item = String>,
        schedule: RefreshSchedule,
    ) -> Self {
        let instances = instances
            .into_iter()
            .map(|name| {
                let tracker = Arc::new(InstanceTracker::new(name.clone(), ctx.clone()));
                (name, tracker)
            })
            .collect();
        Self {
            domain: ctx.domain.clone(),
            instances,
            ctx,
            schedule,
            loops: Mutex::new(HashMap::new()),
        }
    }

    /// Wire a tracker from `streamwatch.toml` settings.
    pub fn from_config(
        config: &StreamwatchConfig,
        connection: Arc<ConnectionManager>,
        fetcher: Arc<dyn PayloadFetcher>,
    ) -> Result<Self, ConfigError> {
        let index = Arc::new(MetricLabelIndex::new());
        let coordinator = Arc::new(MetricsRefreshCoordinator::new(
            fetcher,
            index,
            config.endpoint.payload_host_override.clone(),
            config.refresh.fetch_retries,
        ));
        let ctx = TrackerContext::new(config.domain.name.clone(), connection, coordinator)
            .with_snapshot(SnapshotOptions {
                depth: config.refresh.snapshot_depth,
                include_static: config.refresh.include_static,
            });
        let schedule = RefreshSchedule {
            mode: config.refresh.mode,
            interval: config.refresh_interval()?,
        };
        Ok(Self::new(ctx, config.domain.instances.clone(), schedule))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn schedule(&self) -> RefreshSchedule {
        self.schedule
    }

    pub fn instance(&self, name: &str) -> TrackerResult<Arc<InstanceTracker>> {
        self.instances
            .get(name)
            .cloned()
            .ok_or_else(|| TrackerError::InstanceNotFound(name.to_string()))
    }

    /// Trackers in instance-name order.
    pub fn instances(&self) -> impl Iterator<Item = &Arc<InstanceTracker>> {
        self.instances.values()
    }

    pub fn index(&self) -> &Arc<MetricLabelIndex> {
        self.ctx.index()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.ctx.connection
    }

    /// Refresh every instance once, in order, outside the loops.
    pub async fn refresh_all(&self) -> Vec<(String, Result<RefreshReport, RefreshError>)> {
        let mut out = Vec::with_capacity(self.instances.len());
        for (name, tracker) in &self.instances {
            out.push((name.clone(), tracker.refresh().await));
        }
        out
    }

    /// Start one refresh loop per instance. Instances that already have a
    /// loop are left alone.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        for (name, tracker) in &self.instances {
            if loops.contains_key(name) {
                continue;
            }
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(run_refresh_loop(
                tracker.clone(),
                self.schedule,
                shutdown_rx,
            ));
            loops.insert(
                name.clone(),
                LoopSlot {
                    handle,
                    shutdown_tx,
                },
            );
        }
        info!(
            domain = %self.domain,
            instances = loops.len(),
            mode = ?self.schedule.mode,
            interval_ms = self.schedule.interval.as_millis() as u64,
            "refresh loops started"
        );
    }

    /// Stop all loops, letting any refresh in progress finish.
    pub async fn stop_all(&self) {
        let mut loops = self.loops.lock().await;
        for (name, slot) in loops.drain() {
            let _ = slot.shutdown_tx.send(true);
            if let Err(e) = slot.handle.await {
                warn!(instance = %name, error = %e, "refresh loop ended abnormally");
            }
            debug!(instance = %name, "refresh loop stopped");
        }
        info!(domain = %self.domain, "all refresh loops stopped");
    }

    /// Names of instances with a running loop.
    pub async fn active_loops(&self) -> Vec<String> {
        let loops = self.loops.lock().await;
        let mut names: Vec<String> = loops.keys().cloned().collect();
        names.sort();
        names
    }
}
