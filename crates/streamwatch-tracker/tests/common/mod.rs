//! Scripted in-memory remote endpoint for tracker tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use streamwatch_core::{EntityId, InstanceStatus, JobHealth, JobStatus};
use streamwatch_remote::{
    ConnectFuture, ConnectionManager, Connector, FetchError, FetchFuture, InstanceStatusReport,
    JobDescriptor, PayloadFetcher, RemoteEndpoint, RemoteError, RemoteFuture, RetrievalToken,
    RetryPolicy,
};
use streamwatch_tracker::{
    Clock, DomainTracker, InstanceTracker, MetricsRefreshCoordinator, RefreshSchedule,
    TrackerContext,
};

pub const METRICS: &str = "metrics";
pub const SNAPSHOTS: &str = "snapshots";
pub const RESOURCES: &str = "resources";

#[derive(Default)]
pub struct FakeState {
    pub jobs: Vec<JobDescriptor>,
    pub list_error: Option<RemoteError>,
    pub status_error: Option<RemoteError>,
    /// Failure of the `snapshot_*` call for a token kind.
    pub token_errors: HashMap<&'static str, RemoteError>,
    /// Remaining fetch failures per token kind.
    pub fetch_failures: HashMap<&'static str, u32>,
    /// Jobs left out of the metrics payload.
    pub omit_metrics: HashSet<EntityId>,
    pub metric_value: f64,
    pub resources: Vec<(String, f64)>,
    pub connect_down: bool,
    pub connects: u32,
    pub list_calls: u32,
    pub fetches: u32,
}

pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                metric_value: 1.0,
                resources: vec![("host1".to_string(), 0.5)],
                ..FakeState::default()
            }),
        })
    }

    pub fn set_jobs(&self, jobs: &[(u64, &str)]) {
        self.update(|s| {
            s.jobs = jobs
                .iter()
                .map(|(id, name)| JobDescriptor {
                    id: EntityId::from(*id),
                    name: name.to_string(),
                    status: JobStatus::Running,
                    health: JobHealth::Healthy,
                })
                .collect();
        });
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn fetches(&self) -> u32 {
        self.state.lock().unwrap().fetches
    }

    fn token(&self, kind: &'static str) -> Result<RetrievalToken, RemoteError> {
        match self.state.lock().unwrap().token_errors.get(kind) {
            Some(e) => Err(e.clone()),
            None => Ok(RetrievalToken(format!("http://fake/{kind}"))),
        }
    }

    fn body(&self, kind: &str) -> String {
        let s = self.state.lock().unwrap();
        match kind {
            METRICS => {
                let jobs: Vec<_> = s
                    .jobs
                    .iter()
                    .filter(|j| !s.omit_metrics.contains(&j.id))
                    .map(|j| {
                        json!({
                            "id": j.id.as_str(),
                            "name": j.name,
                            "metrics": [{"name": "nTuples", "value": s.metric_value}],
                            "operators": [{
                                "name": "Op1",
                                "metrics": [{"name": "nExceptions", "value": 0}],
                                "inputPorts": [{"index": 0, "metrics": [{"name": "nTuplesProcessed", "value": s.metric_value}]}],
                                "outputPorts": []
                            }]
                        })
                    })
                    .collect();
                json!({ "jobs": jobs }).to_string()
            }
            SNAPSHOTS => {
                let jobs: Vec<_> = s
                    .jobs
                    .iter()
                    .map(|j| json!({"id": j.id.as_str(), "name": j.name, "pes": []}))
                    .collect();
                json!({ "jobs": jobs }).to_string()
            }
            _ => {
                let resources: Vec<_> = s
                    .resources
                    .iter()
                    .map(|(id, v)| json!({"id": id, "metrics": [{"name": "cpuLoad", "value": v}]}))
                    .collect();
                json!({ "resources": resources }).to_string()
            }
        }
    }
}

impl RemoteEndpoint for FakeRemote {
    fn list_jobs<'a>(&'a self, _domain: &'a str, _instance: &'a str) -> RemoteFuture<'a, Vec<JobDescriptor>> {
        let result = {
            let mut s = self.state.lock().unwrap();
            s.list_calls += 1;
            match &s.list_error {
                Some(e) => Err(e.clone()),
                None => Ok(s.jobs.clone()),
            }
        };
        Box::pin(async move { result })
    }

    fn get_instance_status<'a>(
        &'a self,
        _domain: &'a str,
        _instance: &'a str,
    ) -> RemoteFuture<'a, InstanceStatusReport> {
        let result = match &self.state.lock().unwrap().status_error {
            Some(e) => Err(e.clone()),
            None => Ok(InstanceStatusReport {
                status: InstanceStatus::Running,
                health: JobHealth::Healthy,
                start_time: Some(1_700_000_000_000),
            }),
        };
        Box::pin(async move { result })
    }

    fn snapshot_job_metrics<'a>(&'a self, _domain: &'a str, _instance: &'a str) -> RemoteFuture<'a, RetrievalToken> {
        let result = self.token(METRICS);
        Box::pin(async move { result })
    }

    fn snapshot_jobs<'a>(
        &'a self,
        _domain: &'a str,
        _instance: &'a str,
        _depth: u32,
        _include_static: bool,
    ) -> RemoteFuture<'a, RetrievalToken> {
        let result = self.token(SNAPSHOTS);
        Box::pin(async move { result })
    }

    fn snapshot_instance_resources<'a>(
        &'a self,
        _domain: &'a str,
        _instance: &'a str,
    ) -> RemoteFuture<'a, RetrievalToken> {
        let result = self.token(RESOURCES);
        Box::pin(async move { result })
    }
}

impl PayloadFetcher for FakeRemote {
    fn fetch<'a>(&'a self, token: &'a RetrievalToken, _host_override: Option<&'a str>) -> FetchFuture<'a> {
        let kind = token.0.rsplit('/').next().unwrap_or_default().to_string();
        let failing = {
            let mut s = self.state.lock().unwrap();
            s.fetches += 1;
            match s.fetch_failures.get_mut(kind.as_str()) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        let result = if failing {
            Err(FetchError::Connect("payload host refused".into()))
        } else {
            Ok(Bytes::from(self.body(&kind)))
        };
        Box::pin(async move { result })
    }
}

pub struct FakeConnector(pub Arc<FakeRemote>);

impl Connector for FakeConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        let result = {
            let mut s = self.0.state.lock().unwrap();
            s.connects += 1;
            if s.connect_down {
                Err(RemoteError::Connectivity("connection refused".into()))
            } else {
                Ok(self.0.clone() as Arc<dyn RemoteEndpoint>)
            }
        };
        Box::pin(async move { result })
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub clock: Arc<AtomicU64>,
    pub domain: DomainTracker,
}

impl Harness {
    pub fn new(instances: &[&str], schedule: RefreshSchedule, fetch_retries: u32) -> Self {
        let remote = FakeRemote::new();
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(FakeConnector(remote.clone())),
            RetryPolicy {
                startup_attempts: 1,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
        ));
        let index = Arc::new(streamwatch_metrics::MetricLabelIndex::new());
        let coordinator = Arc::new(MetricsRefreshCoordinator::new(
            remote.clone(),
            index,
            None,
            fetch_retries,
        ));
        let clock = Arc::new(AtomicU64::new(1_000));
        let now = clock.clone();
        let clock_fn: Clock = Arc::new(move || now.load(Ordering::SeqCst));
        let ctx = TrackerContext::new("StreamsDomain", connection, coordinator).with_clock(clock_fn);
        let domain = DomainTracker::new(ctx, instances.iter().map(|s| s.to_string()), schedule);
        Self { remote, clock, domain }
    }

    /// One instance named `inst`, periodic every 10s, no fetch retries.
    pub fn single() -> Self {
        Self::new(&["inst"], RefreshSchedule::default(), 0)
    }

    pub fn tracker(&self) -> Arc<InstanceTracker> {
        self.domain.instances().next().unwrap().clone()
    }

    pub fn set_time(&self, t: u64) {
        self.clock.store(t, Ordering::SeqCst);
    }
}

pub fn ids(tracker: &InstanceTracker) -> Vec<u64> {
    tracker
        .jobs()
        .ids()
        .map(|id| id.as_str().parse().unwrap())
        .collect()
}

pub fn labels(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}
