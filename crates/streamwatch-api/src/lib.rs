//! streamwatch-api — REST API over the hierarchy cache.
//!
//! Read-only views of the cached instance and job state, a refresh
//! trigger, and the Prometheus scrape endpoint. Every handler reads the
//! tracker's published snapshots and never waits on the remote endpoint.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/instances` | List tracked instances |
//! | GET | `/api/v1/instances/{instance}` | Instance summary |
//! | GET | `/api/v1/instances/{instance}/resources` | Cached resource payload |
//! | POST | `/api/v1/instances/{instance}/refresh` | Request a refresh |
//! | GET | `/api/v1/instances/{instance}/jobs` | List cached jobs |
//! | GET | `/api/v1/instances/{instance}/jobs/{id}` | Job by id |
//! | GET | `/api/v1/instances/{instance}/jobnames/{name}` | Job by name |
//! | GET | `/api/v1/instances/{instance}/jobs/{id}/metrics` | Cached metrics payload |
//! | GET | `/api/v1/instances/{instance}/jobs/{id}/snapshot` | Cached snapshot payload |
//! | GET | `/api/v1/instances/{instance}/jobs/{id}/series` | Indexed series for a job |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use streamwatch_tracker::DomainTracker;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<DomainTracker>,
}

/// Build the complete router (REST + metrics).
pub fn build_router(tracker: Arc<DomainTracker>) -> Router {
    let state = ApiState { tracker };

    let api_routes = Router::new()
        .route("/instances", get(handlers::list_instances))
        .route("/instances/{instance}", get(handlers::get_instance))
        .route("/instances/{instance}/resources", get(handlers::get_resources))
        .route("/instances/{instance}/refresh", post(handlers::request_refresh))
        .route("/instances/{instance}/jobs", get(handlers::list_jobs))
        .route("/instances/{instance}/jobs/{id}", get(handlers::get_job))
        .route("/instances/{instance}/jobnames/{name}", get(handlers::get_job_by_name))
        .route("/instances/{instance}/jobs/{id}/metrics", get(handlers::get_job_metrics))
        .route("/instances/{instance}/jobs/{id}/snapshot", get(handlers::get_job_snapshot))
        .route("/instances/{instance}/jobs/{id}/series", get(handlers::get_job_series))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
