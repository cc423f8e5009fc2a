//! Batched payload retrieval for one refresh cycle.
//!
//! Each batch is a two-step exchange: ask the endpoint for a retrieval
//! token, then redeem the token over the payload side channel. A failed
//! redemption is retried with the same token; a failed endpoint call is
//! not retried within the cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use streamwatch_core::EntityId;
use streamwatch_metrics::{EntityType, MetricLabelIndex};
use streamwatch_remote::{FetchError, PayloadFetcher, RemoteFuture, RemoteHandle, RetrievalToken};

use crate::error::RefreshError;
use crate::payload::{
    DecodedJobMetrics, DecodedResources, JobMetrics, decode_job_metrics, decode_job_snapshots,
    decode_resources, job_series, resource_series,
};

/// Fetches consolidated payloads and fans metrics into the index.
pub struct MetricsRefreshCoordinator {
    fetcher: Arc<dyn PayloadFetcher>,
    index: Arc<MetricLabelIndex>,
    host_override: Option<String>,
    fetch_retries: u32,
}

impl MetricsRefreshCoordinator {
    pub fn new(
        fetcher: Arc<dyn PayloadFetcher>,
        index: Arc<MetricLabelIndex>,
        host_override: Option<String>,
        fetch_retries: u32,
    ) -> Self {
        Self {
            fetcher,
            index,
            host_override,
            fetch_retries,
        }
    }

    pub fn index(&self) -> &Arc<MetricLabelIndex> {
        &self.index
    }

    /// One consolidated metrics payload for every job in the instance.
    pub async fn job_metrics(
        &self,
        handle: &RemoteHandle,
        domain: &str,
        instance: &str,
    ) -> Result<BTreeMap<EntityId, DecodedJobMetrics>, RefreshError> {
        let body = self
            .retrieve(handle.snapshot_job_metrics(domain, instance))
            .await?;
        decode_job_metrics(&body)
    }

    /// One consolidated structural snapshot for every job in the instance.
    pub async fn job_snapshots(
        &self,
        handle: &RemoteHandle,
        domain: &str,
        instance: &str,
        depth: u32,
        include_static: bool,
    ) -> Result<BTreeMap<EntityId, Arc<Value>>, RefreshError> {
        let body = self
            .retrieve(handle.snapshot_jobs(domain, instance, depth, include_static))
            .await?;
        decode_job_snapshots(&body)
    }

    pub async fn resources(
        &self,
        handle: &RemoteHandle,
        domain: &str,
        instance: &str,
    ) -> Result<DecodedResources, RefreshError> {
        let body = self
            .retrieve(handle.snapshot_instance_resources(domain, instance))
            .await?;
        decode_resources(&body)
    }

    /// Replace the metric subtree of one job in a single atomic step.
    /// Resource series that happen to share the job's label tuple are kept.
    pub fn publish_job(&self, instance: &str, job_name: &str, metrics: &JobMetrics) {
        let prefix = [instance.to_string(), job_name.to_string()];
        let series = job_series(instance, job_name, metrics);
        let vanished = self
            .index
            .replace_children_of(&prefix, EntityType::in_job_tree, series);
        if !vanished.is_empty() {
            debug!(%instance, job = %job_name, vanished = vanished.len(), "dropped vanished job series");
        }
    }

    /// Replace every resource series of `instance`.
    pub fn publish_resources(&self, instance: &str, resources: &DecodedResources) {
        let prefix = [instance.to_string()];
        let series = resource_series(instance, &resources.resources);
        self.index.replace_entities(&prefix, EntityType::Resource, series);
    }

    async fn retrieve(
        &self,
        request: RemoteFuture<'_, RetrievalToken>,
    ) -> Result<Bytes, RefreshError> {
        let token = request.await?;
        Ok(self.redeem(&token).await?)
    }

    /// Redeem `token`, retrying up to `fetch_retries` extra times.
    async fn redeem(&self, token: &RetrievalToken) -> Result<Bytes, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(token, self.host_override.as_deref()).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.fetch_retries => {
                    attempt += 1;
                    warn!(%token, attempt, error = %e, "payload fetch failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
