//! Per-instance tracker — reconciles polled job listings into the cache.
//!
//! One refresh task per instance calls [`InstanceTracker::refresh`]; any
//! number of readers call the accessors concurrently. Network calls run
//! without holding any lock readers need: the next [`JobTable`] is built
//! off-lock and swapped in at the end of the cycle.
//!
//! ```text
//! refresh()
//!   ├── acquire handle          ── fail → Unavailable, all payloads failed
//!   ├── get_instance_status()
//!   ├── list_jobs()             ── fail → Unavailable, all payloads failed
//!   ├── reconcile() + remove_children_of() for removed / renamed jobs
//!   ├── job_metrics()           → payload + replace_children_of() per job
//!   ├── job_snapshots()         → payload per job
//!   ├── resources()             → instance payload + resource series
//!   └── swap table, publish self-metrics
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use streamwatch_core::{EntityId, InstanceStatus, JobHealth, TrackerState};
use streamwatch_metrics::{EntityType, MetricSeries};
use streamwatch_remote::{RemoteError, RemoteHandle};

use crate::context::TrackerContext;
use crate::error::{RefreshError, TrackerError, TrackerResult};
use crate::job::{CachedPayload, JobRecord, JobTable, Reconciliation, reconcile};

/// Point-in-time view of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub name: String,
    pub state: TrackerState,
    pub available: bool,
    pub status: InstanceStatus,
    pub health: JobHealth,
    /// Unix epoch milliseconds, as reported by the endpoint.
    pub start_time: Option<u64>,
    pub job_count: usize,
    pub resources: CachedPayload,
    pub last_refresh_duration_ms: Option<u64>,
    pub refresh_failures: u64,
}

/// What one successful refresh cycle did.
///
/// The job listing succeeded; each batch reports its own outcome.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub reconciliation: Reconciliation,
    pub status: Result<(), RefreshError>,
    pub metrics: Result<(), RefreshError>,
    pub snapshots: Result<(), RefreshError>,
    pub resources: Result<(), RefreshError>,
}

#[derive(Debug, Default)]
struct Summary {
    state: TrackerState,
    status: InstanceStatus,
    health: JobHealth,
    start_time: Option<u64>,
    resources: CachedPayload,
    last_duration: Option<Duration>,
}

/// Tracks the jobs of one instance.
pub struct InstanceTracker {
    name: String,
    ctx: TrackerContext,
    table: RwLock<Arc<JobTable>>,
    summary: RwLock<Summary>,
    /// Serializes refresh cycles.
    refresh_lock: Mutex<()>,
    failures: AtomicU64,
    trigger: Notify,
}

impl InstanceTracker {
    pub fn new(name: impl Into<String>, ctx: TrackerContext) -> Self {
        Self {
            name: name.into(),
            ctx,
            table: RwLock::new(Arc::new(JobTable::default())),
            summary: RwLock::new(Summary::default()),
            refresh_lock: Mutex::new(()),
            failures: AtomicU64::new(0),
            trigger: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Readers ────────────────────────────────────────────────────

    pub fn state(&self) -> TrackerState {
        self.summary.read().expect("summary lock").state
    }

    pub fn info(&self) -> InstanceInfo {
        let job_count = self.jobs().len();
        let s = self.summary.read().expect("summary lock");
        InstanceInfo {
            name: self.name.clone(),
            state: s.state,
            available: s.state.is_available(),
            status: s.status,
            health: s.health,
            start_time: s.start_time,
            job_count,
            resources: s.resources.clone(),
            last_refresh_duration_ms: s.last_duration.map(|d| d.as_millis() as u64),
            refresh_failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// The table published by the most recent completed refresh.
    pub fn jobs(&self) -> Arc<JobTable> {
        self.table.read().expect("job table lock").clone()
    }

    pub fn job(&self, id: &EntityId) -> TrackerResult<Arc<JobRecord>> {
        self.jobs()
            .get(id)
            .cloned()
            .ok_or_else(|| TrackerError::JobNotFound {
                instance: self.name.clone(),
                id: id.clone(),
            })
    }

    pub fn job_by_name(&self, name: &str) -> TrackerResult<Arc<JobRecord>> {
        self.jobs()
            .by_name(name)
            .cloned()
            .ok_or_else(|| TrackerError::JobNameNotFound {
                instance: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn job_metrics(&self, id: &EntityId) -> TrackerResult<CachedPayload> {
        Ok(self.job(id)?.metrics.clone())
    }

    pub fn job_snapshot(&self, id: &EntityId) -> TrackerResult<CachedPayload> {
        Ok(self.job(id)?.snapshot.clone())
    }

    /// Indexed series for one job and everything nested under it.
    pub fn job_series(&self, id: &EntityId) -> TrackerResult<Vec<(MetricSeries, f64)>> {
        let job = self.job(id)?;
        Ok(self
            .ctx
            .index()
            .children_of(&[self.name.clone(), job.name.clone()], EntityType::in_job_tree))
    }

    pub fn resources(&self) -> CachedPayload {
        self.summary.read().expect("summary lock").resources.clone()
    }

    /// Ask the refresh loop for a refresh. Never blocks; repeated requests
    /// before the loop wakes collapse into one.
    pub fn request_refresh(&self) {
        self.trigger.notify_one();
    }

    pub(crate) fn trigger(&self) -> &Notify {
        &self.trigger
    }

    // ── Refresh ────────────────────────────────────────────────────

    /// Run one refresh cycle.
    ///
    /// Fails only when the job listing could not be obtained; the cached
    /// view is then kept and every payload is marked failed.
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let _running = self.refresh_lock.lock().await;
        let started = Instant::now();
        let now = (self.ctx.clock)();
        {
            let mut s = self.summary.write().expect("summary lock");
            if s.state == TrackerState::Uninitialized {
                s.state = TrackerState::Initializing;
            }
        }

        let result = self.refresh_cycle(now).await;
        let elapsed = started.elapsed();
        self.summary.write().expect("summary lock").last_duration = Some(elapsed);

        match &result {
            Ok(report) => debug!(
                instance = %self.name,
                jobs = self.jobs().len(),
                added = report.reconciliation.added.len(),
                removed = report.reconciliation.removed.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "refresh complete"
            ),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(instance = %self.name, error = %e, "refresh failed; serving cached view");
            }
        }
        self.publish_self_metrics(elapsed);
        result
    }

    async fn refresh_cycle(&self, now: u64) -> Result<RefreshReport, RefreshError> {
        let domain = self.ctx.domain.as_str();
        let name = self.name.as_str();

        let handle = match self.ctx.connection.acquire().await {
            Ok(h) => h,
            Err(e) => {
                self.mark_unavailable(now);
                return Err(e.into());
            }
        };

        let status = match handle.get_instance_status(domain, name).await {
            Ok(report) => {
                let mut s = self.summary.write().expect("summary lock");
                s.status = report.status;
                s.health = report.health;
                s.start_time = report.start_time;
                Ok(())
            }
            Err(e) if e.is_connectivity() => {
                self.ctx.connection.report_failure(&handle, &e).await;
                self.mark_unavailable(now);
                return Err(e.into());
            }
            Err(e) => {
                warn!(instance = %name, error = %e, "instance status unavailable");
                Err(RefreshError::from(e))
            }
        };

        let listed = match handle.list_jobs(domain, name).await {
            Ok(listed) => listed,
            Err(e) => {
                self.ctx.connection.report_failure(&handle, &e).await;
                self.mark_unavailable(now);
                return Err(e.into());
            }
        };

        let current = self.jobs();
        let (next, reconciliation) = reconcile(&current, &listed);
        self.retire_series(&reconciliation);

        let mut connectivity_lost = false;
        let (next, metrics) = self
            .refresh_metrics(&handle, next, now, &mut connectivity_lost)
            .await;
        let (next, snapshots) = self
            .refresh_snapshots(&handle, next, now, &mut connectivity_lost)
            .await;
        let resources = self
            .refresh_resources(&handle, now, &mut connectivity_lost)
            .await;

        *self.table.write().expect("job table lock") = Arc::new(next);
        {
            let mut s = self.summary.write().expect("summary lock");
            s.state = if connectivity_lost {
                TrackerState::Unavailable
            } else {
                TrackerState::Available
            };
        }

        Ok(RefreshReport {
            reconciliation,
            status,
            metrics,
            snapshots,
            resources,
        })
    }

    /// Drop the metric subtrees of removed jobs and of renamed jobs' old names.
    fn retire_series(&self, diff: &Reconciliation) {
        let index = self.ctx.index();
        for (id, old_name) in &diff.removed {
            index.remove_children_of(&[self.name.clone(), old_name.clone()], EntityType::in_job_tree);
            info!(instance = %self.name, job_id = %id, job = %old_name, "job removed");
        }
        for (id, old_name, new_name) in &diff.renamed {
            index.remove_children_of(&[self.name.clone(), old_name.clone()], EntityType::in_job_tree);
            info!(instance = %self.name, job_id = %id, from = %old_name, to = %new_name, "job renamed");
        }
        for id in &diff.added {
            info!(instance = %self.name, job_id = %id, "job discovered");
        }
    }

    async fn refresh_metrics(
        &self,
        handle: &RemoteHandle,
        table: JobTable,
        now: u64,
        connectivity_lost: &mut bool,
    ) -> (JobTable, Result<(), RefreshError>) {
        let coordinator = &self.ctx.coordinator;
        match coordinator.job_metrics(handle, &self.ctx.domain, &self.name).await {
            Ok(batch) => {
                let next = table.map_records(|r| match batch.get(&r.id) {
                    Some(m) => {
                        coordinator.publish_job(&self.name, &r.name, &m.metrics);
                        JobRecord {
                            metrics: r.metrics.succeeded(m.raw.clone(), now),
                            ..r.clone()
                        }
                    }
                    None => {
                        debug!(instance = %self.name, job_id = %r.id, "job missing from metrics payload");
                        JobRecord {
                            metrics: r.metrics.failed(now),
                            ..r.clone()
                        }
                    }
                });
                (next, Ok(()))
            }
            Err(e) => {
                self.note_failure(handle, &e, connectivity_lost).await;
                warn!(instance = %self.name, error = %e, "job metrics refresh failed");
                let next = table.map_records(|r| JobRecord {
                    metrics: r.metrics.failed(now),
                    ..r.clone()
                });
                (next, Err(e))
            }
        }
    }

    async fn refresh_snapshots(
        &self,
        handle: &RemoteHandle,
        table: JobTable,
        now: u64,
        connectivity_lost: &mut bool,
    ) -> (JobTable, Result<(), RefreshError>) {
        if *connectivity_lost {
            let next = table.map_records(|r| JobRecord {
                snapshot: r.snapshot.failed(now),
                ..r.clone()
            });
            return (next, Err(skipped_after_connectivity_loss()));
        }
        let opts = self.ctx.snapshot;
        let result = self
            .ctx
            .coordinator
            .job_snapshots(handle, &self.ctx.domain, &self.name, opts.depth, opts.include_static)
            .await;
        match result {
            Ok(batch) => {
                let next = table.map_records(|r| JobRecord {
                    snapshot: match batch.get(&r.id) {
                        Some(raw) => r.snapshot.succeeded(raw.clone(), now),
                        None => r.snapshot.failed(now),
                    },
                    ..r.clone()
                });
                (next, Ok(()))
            }
            Err(e) => {
                self.note_failure(handle, &e, connectivity_lost).await;
                warn!(instance = %self.name, error = %e, "job snapshot refresh failed");
                let next = table.map_records(|r| JobRecord {
                    snapshot: r.snapshot.failed(now),
                    ..r.clone()
                });
                (next, Err(e))
            }
        }
    }

    async fn refresh_resources(
        &self,
        handle: &RemoteHandle,
        now: u64,
        connectivity_lost: &mut bool,
    ) -> Result<(), RefreshError> {
        if *connectivity_lost {
            let mut s = self.summary.write().expect("summary lock");
            s.resources = s.resources.failed(now);
            return Err(skipped_after_connectivity_loss());
        }
        let coordinator = &self.ctx.coordinator;
        match coordinator.resources(handle, &self.ctx.domain, &self.name).await {
            Ok(decoded) => {
                coordinator.publish_resources(&self.name, &decoded);
                let mut s = self.summary.write().expect("summary lock");
                s.resources = s.resources.succeeded(decoded.raw, now);
                Ok(())
            }
            Err(e) => {
                self.note_failure(handle, &e, connectivity_lost).await;
                warn!(instance = %self.name, error = %e, "resource refresh failed");
                let mut s = self.summary.write().expect("summary lock");
                s.resources = s.resources.failed(now);
                Err(e)
            }
        }
    }

    async fn note_failure(&self, handle: &RemoteHandle, err: &RefreshError, connectivity_lost: &mut bool) {
        if let RefreshError::Remote(e) = err {
            self.ctx.connection.report_failure(handle, e).await;
        }
        if err.is_connectivity() {
            *connectivity_lost = true;
        }
    }

    /// Keep the job set, mark every payload failed at `now`.
    fn mark_unavailable(&self, now: u64) {
        let next = self.jobs().map_records(|r| r.failed(now));
        *self.table.write().expect("job table lock") = Arc::new(next);

        let mut s = self.summary.write().expect("summary lock");
        s.resources = s.resources.failed(now);
        if s.state != TrackerState::Unavailable {
            info!(instance = %self.name, "instance unavailable");
        }
        s.state = TrackerState::Unavailable;
    }

    fn publish_self_metrics(&self, elapsed: Duration) {
        let index = self.ctx.index();
        let available = if self.state().is_available() { 1.0 } else { 0.0 };
        let values = [
            ("streamwatch_refresh_duration_seconds", elapsed.as_secs_f64()),
            (
                "streamwatch_refresh_failures_total",
                self.failures.load(Ordering::Relaxed) as f64,
            ),
            ("streamwatch_jobs", self.jobs().len() as f64),
            ("streamwatch_instance_available", available),
        ];
        for (metric, value) in values {
            match MetricSeries::new(metric, EntityType::Instance, vec![self.name.clone()]) {
                Ok(series) => index.add(series, value),
                Err(e) => warn!(error = %e, "dropping self metric"),
            }
        }
    }
}

/// Batches after a connectivity failure are not attempted on the dropped
/// handle; they are recorded as failed with this error.
fn skipped_after_connectivity_loss() -> RefreshError {
    RefreshError::Remote(RemoteError::Connectivity(
        "skipped: connection lost earlier in this cycle".into(),
    ))
}
