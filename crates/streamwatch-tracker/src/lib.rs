//! streamwatch-tracker — the hierarchy cache for one domain.
//!
//! Polls the remote endpoint for each configured instance, reconciles
//! the job listing into a copy-on-write job table, and fans batched
//! metrics into the shared [`MetricLabelIndex`](streamwatch_metrics::MetricLabelIndex).
//! Transient failures never erase cached data; they only update the
//! freshness triple of whatever could not be refreshed.
//!
//! # Architecture
//!
//! ```text
//! DomainTracker
//!   ├── InstanceTracker (one per instance)
//!   │     ├── refresh() ← run_refresh_loop (Periodic | OnDemand)
//!   │     ├── RwLock<Arc<JobTable>> → readers (jobs, job, job_by_name, ...)
//!   │     └── MetricsRefreshCoordinator
//!   │           ├── snapshot_* → RetrievalToken → PayloadFetcher (retried)
//!   │           └── publish_job() → MetricLabelIndex::replace_children_of()
//!   └── ConnectionManager (shared)
//! ```

pub mod context;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod instance;
pub mod job;
pub mod payload;
pub mod schedule;

pub use context::{Clock, SnapshotOptions, TrackerContext, system_clock};
pub use coordinator::MetricsRefreshCoordinator;
pub use domain::DomainTracker;
pub use error::{RefreshError, TrackerError, TrackerResult};
pub use instance::{InstanceInfo, InstanceTracker, RefreshReport};
pub use job::{CachedPayload, JobRecord, JobTable, Reconciliation};
pub use schedule::{RefreshSchedule, run_refresh_loop};
