//! REST API handlers.
//!
//! Each handler reads the tracker's published snapshots and returns JSON
//! responses. Lookup misses become 404, malformed ids 400.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use streamwatch_core::{EntityId, Freshness, ParseIdError, RefreshMode};
use streamwatch_metrics::MetricSeries;
use streamwatch_tracker::{CachedPayload, InstanceTracker, TrackerError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn not_found(e: TrackerError) -> Response {
    error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
}

fn parse_id(raw: &str) -> Result<EntityId, Response> {
    raw.parse()
        .map_err(|e: ParseIdError| error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response())
}

/// A cached payload as served: the last good body plus its freshness.
#[derive(Debug, Serialize)]
pub struct PayloadView {
    pub freshness: Freshness,
    pub stale: bool,
    pub payload: Option<Value>,
}

impl From<CachedPayload> for PayloadView {
    fn from(cached: CachedPayload) -> Self {
        Self {
            stale: cached.freshness.is_stale(),
            freshness: cached.freshness,
            payload: cached.payload.map(|p| (*p).clone()),
        }
    }
}

/// One indexed series with its current value.
#[derive(Debug, Serialize)]
pub struct SeriesView {
    #[serde(flatten)]
    pub series: MetricSeries,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct RefreshAccepted {
    pub instance: String,
    pub mode: RefreshMode,
}

// ── Instances ──────────────────────────────────────────────────

/// GET /api/v1/instances
pub async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    let infos: Vec<_> = state.tracker.instances().map(|t| t.info()).collect();
    ApiResponse::ok(infos)
}

/// GET /api/v1/instances/{instance}
pub async fn get_instance(
    State(state): State<ApiState>,
    Path(instance): Path<String>,
) -> impl IntoResponse {
    match state.tracker.instance(&instance) {
        Ok(tracker) => ApiResponse::ok(tracker.info()).into_response(),
        Err(e) => not_found(e),
    }
}

/// GET /api/v1/instances/{instance}/resources
pub async fn get_resources(
    State(state): State<ApiState>,
    Path(instance): Path<String>,
) -> impl IntoResponse {
    match state.tracker.instance(&instance) {
        Ok(tracker) => ApiResponse::ok(PayloadView::from(tracker.resources())).into_response(),
        Err(e) => not_found(e),
    }
}

/// POST /api/v1/instances/{instance}/refresh
///
/// Signals the instance's refresh loop and returns immediately. In
/// periodic mode the next scheduled cycle serves the request.
pub async fn request_refresh(
    State(state): State<ApiState>,
    Path(instance): Path<String>,
) -> impl IntoResponse {
    match state.tracker.instance(&instance) {
        Ok(tracker) => {
            tracker.request_refresh();
            tracing::debug!(instance = %instance, "refresh requested");
            (
                StatusCode::ACCEPTED,
                ApiResponse::ok(RefreshAccepted {
                    instance,
                    mode: state.tracker.schedule().mode,
                }),
            )
                .into_response()
        }
        Err(e) => not_found(e),
    }
}

// ── Jobs ───────────────────────────────────────────────────────

/// GET /api/v1/instances/{instance}/jobs
pub async fn list_jobs(
    State(state): State<ApiState>,
    Path(instance): Path<String>,
) -> impl IntoResponse {
    match state.tracker.instance(&instance) {
        Ok(tracker) => {
            let jobs: Vec<_> = tracker.jobs().iter().map(|j| (**j).clone()).collect();
            ApiResponse::ok(jobs).into_response()
        }
        Err(e) => not_found(e),
    }
}

fn lookup_job<T: Serialize>(
    state: &ApiState,
    instance: &str,
    id: &str,
    view: impl FnOnce(&InstanceTracker, &EntityId) -> Result<T, TrackerError>,
) -> Response {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state
        .tracker
        .instance(instance)
        .and_then(|tracker| view(tracker.as_ref(), &id))
    {
        Ok(data) => ApiResponse::ok(data).into_response(),
        Err(e) => not_found(e),
    }
}

/// GET /api/v1/instances/{instance}/jobs/{id}
pub async fn get_job(
    State(state): State<ApiState>,
    Path((instance, id)): Path<(String, String)>,
) -> impl IntoResponse {
    lookup_job(&state, &instance, &id, |t, id| {
        t.job(id).map(|j| (*j).clone())
    })
}

/// GET /api/v1/instances/{instance}/jobnames/{name}
pub async fn get_job_by_name(
    State(state): State<ApiState>,
    Path((instance, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state
        .tracker
        .instance(&instance)
        .and_then(|tracker| tracker.job_by_name(&name))
    {
        Ok(job) => ApiResponse::ok((*job).clone()).into_response(),
        Err(e) => not_found(e),
    }
}

/// GET /api/v1/instances/{instance}/jobs/{id}/metrics
pub async fn get_job_metrics(
    State(state): State<ApiState>,
    Path((instance, id)): Path<(String, String)>,
) -> impl IntoResponse {
    lookup_job(&state, &instance, &id, |t, id| {
        t.job_metrics(id).map(PayloadView::from)
    })
}

/// GET /api/v1/instances/{instance}/jobs/{id}/snapshot
pub async fn get_job_snapshot(
    State(state): State<ApiState>,
    Path((instance, id)): Path<(String, String)>,
) -> impl IntoResponse {
    lookup_job(&state, &instance, &id, |t, id| {
        t.job_snapshot(id).map(PayloadView::from)
    })
}

/// GET /api/v1/instances/{instance}/jobs/{id}/series
pub async fn get_job_series(
    State(state): State<ApiState>,
    Path((instance, id)): Path<(String, String)>,
) -> impl IntoResponse {
    lookup_job(&state, &instance, &id, |t, id| {
        t.job_series(id).map(|series| {
            series
                .into_iter()
                .map(|(series, value)| SeriesView { series, value })
                .collect::<Vec<_>>()
        })
    })
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = streamwatch_metrics::render_prometheus(state.tracker.index());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use streamwatch_metrics::{EntityType, MetricLabelIndex};
    use streamwatch_remote::{
        ConnectFuture, ConnectionManager, Connector, HttpFetcher, RemoteError, RetryPolicy,
    };
    use streamwatch_tracker::{
        DomainTracker, MetricsRefreshCoordinator, RefreshSchedule, TrackerContext,
    };

    struct DownConnector;

    impl Connector for DownConnector {
        fn connect(&self) -> ConnectFuture<'_> {
            Box::pin(async { Err(RemoteError::Connectivity("connection refused".into())) })
        }
    }

    fn test_state() -> ApiState {
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(DownConnector),
            RetryPolicy {
                startup_attempts: 1,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
        ));
        let coordinator = Arc::new(MetricsRefreshCoordinator::new(
            Arc::new(HttpFetcher::new(None, Duration::from_secs(1))),
            Arc::new(MetricLabelIndex::new()),
            None,
            0,
        ));
        let ctx = TrackerContext::new("StreamsDomain", connection, coordinator);
        let tracker = DomainTracker::new(
            ctx,
            ["inst".to_string(), "other".to_string()],
            RefreshSchedule::default(),
        );
        ApiState {
            tracker: Arc::new(tracker),
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn list_instances_in_name_order() {
        let resp = list_instances(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["name"], "inst");
        assert_eq!(body["data"][1]["name"], "other");
        assert_eq!(body["data"][0]["available"], false);
    }

    #[tokio::test]
    async fn get_unknown_instance() {
        let resp = get_instance(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn empty_job_list_before_first_refresh() {
        let resp = list_jobs(State(test_state()), Path("inst".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn malformed_job_id_is_bad_request() {
        let resp = get_job(
            State(test_state()),
            Path(("inst".to_string(), "12ab".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let state = test_state();
        let resp = get_job_metrics(
            State(state.clone()),
            Path(("inst".to_string(), "7".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = get_job_by_name(State(state), Path(("inst".to_string(), "A".to_string())))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_request_is_accepted() {
        let resp = request_refresh(State(test_state()), Path("inst".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["instance"], "inst");
        assert_eq!(body["data"]["mode"], "periodic");
    }

    #[tokio::test]
    async fn refresh_unknown_instance() {
        let resp = request_refresh(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn resources_never_refreshed() {
        let resp = get_resources(State(test_state()), Path("inst".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["payload"], Value::Null);
        assert_eq!(body["data"]["stale"], true);
        assert_eq!(body["data"]["freshness"]["last_refresh"], Value::Null);
    }

    #[tokio::test]
    async fn prometheus_renders_index() {
        let state = test_state();
        state
            .tracker
            .index()
            .add(
                MetricSeries::new("nTuples", EntityType::Job, vec!["inst".into(), "A".into()])
                    .unwrap(),
                3.0,
            );
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(ct.starts_with("text/plain"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("instancename=\"inst\""));
        assert!(text.contains("jobname=\"A\""));
    }

    #[test]
    fn payload_view_reports_staleness() {
        let cached = CachedPayload::default()
            .succeeded(Arc::new(serde_json::json!({"k": 1})), 10)
            .failed(20);
        let view = PayloadView::from(cached);
        assert!(view.stale);
        assert_eq!(view.freshness.last_refresh, Some(10));
        assert_eq!(view.payload.unwrap()["k"], 1);
    }
}
