//! Batch payload formats and their fan-out into metric series.
//!
//! Metrics payload:
//!
//! ```text
//! {"jobs": [{"id": "1", "name": "A",
//!            "metrics": [{"name": "health", "value": 1}],
//!            "operators": [{"name": "Op1", "metrics": [...],
//!                           "inputPorts": [{"index": 0, "metrics": [...]}],
//!                           "outputPorts": [...]}]}]}
//! ```
//!
//! Snapshot payload is `{"jobs": [{"id": "1", ...}]}` with free-form job
//! bodies. Resource payload is `{"resources": [{"id": "host1", "metrics": [...]}]}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use streamwatch_core::EntityId;
use streamwatch_metrics::{EntityType, MetricSeries};

use crate::error::RefreshError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobMetrics {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricValue>,
    #[serde(default)]
    pub operators: Vec<OperatorMetrics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorMetrics {
    pub name: String,
    #[serde(default)]
    pub metrics: Vec<MetricValue>,
    #[serde(default)]
    pub input_ports: Vec<PortMetrics>,
    #[serde(default)]
    pub output_ports: Vec<PortMetrics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PortMetrics {
    pub index: u32,
    #[serde(default)]
    pub metrics: Vec<MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceMetrics {
    pub id: String,
    #[serde(default)]
    pub metrics: Vec<MetricValue>,
}

/// One job's entry in a metrics batch: the raw JSON (cached and served
/// as-is) and its typed view (used for fan-out).
#[derive(Debug, Clone)]
pub struct DecodedJobMetrics {
    pub raw: Arc<Value>,
    pub metrics: JobMetrics,
}

/// A decoded resource payload.
#[derive(Debug, Clone)]
pub struct DecodedResources {
    pub raw: Arc<Value>,
    pub resources: Vec<ResourceMetrics>,
}

#[derive(Deserialize)]
struct JobsEnvelope {
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Deserialize)]
struct JobRef {
    id: EntityId,
}

#[derive(Deserialize)]
struct ResourcesEnvelope {
    #[serde(default)]
    resources: Vec<ResourceMetrics>,
}

/// Split a metrics batch by job id. Entries that do not decode are skipped.
pub fn decode_job_metrics(body: &[u8]) -> Result<BTreeMap<EntityId, DecodedJobMetrics>, RefreshError> {
    let envelope: JobsEnvelope = serde_json::from_slice(body)
        .map_err(|e| RefreshError::Decode(format!("metrics payload: {e}")))?;

    let mut out = BTreeMap::new();
    for raw in envelope.jobs {
        match JobMetrics::deserialize(&raw) {
            Ok(metrics) => {
                out.insert(
                    metrics.id.clone(),
                    DecodedJobMetrics {
                        raw: Arc::new(raw),
                        metrics,
                    },
                );
            }
            Err(e) => warn!(error = %e, "skipping malformed job metrics entry"),
        }
    }
    Ok(out)
}

/// Split a snapshot batch by job id. Entries without an id are skipped.
pub fn decode_job_snapshots(body: &[u8]) -> Result<BTreeMap<EntityId, Arc<Value>>, RefreshError> {
    let envelope: JobsEnvelope = serde_json::from_slice(body)
        .map_err(|e| RefreshError::Decode(format!("snapshot payload: {e}")))?;

    let mut out = BTreeMap::new();
    for raw in envelope.jobs {
        match JobRef::deserialize(&raw) {
            Ok(job) => {
                out.insert(job.id, Arc::new(raw));
            }
            Err(e) => warn!(error = %e, "skipping job snapshot without id"),
        }
    }
    Ok(out)
}

pub fn decode_resources(body: &[u8]) -> Result<DecodedResources, RefreshError> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| RefreshError::Decode(format!("resource payload: {e}")))?;
    let envelope = ResourcesEnvelope::deserialize(&raw)
        .map_err(|e| RefreshError::Decode(format!("resource payload: {e}")))?;
    Ok(DecodedResources {
        raw: Arc::new(raw),
        resources: envelope.resources,
    })
}

// ── Fan-out ────────────────────────────────────────────────────────

fn push_series(
    out: &mut Vec<(MetricSeries, f64)>,
    entity_type: EntityType,
    labels: &[String],
    metrics: &[MetricValue],
) {
    for m in metrics {
        match MetricSeries::new(entity_type.metric_name(&m.name), entity_type, labels.to_vec()) {
            Ok(series) => out.push((series, m.value)),
            Err(e) => warn!(error = %e, metric = %m.name, "dropping metric"),
        }
    }
}

/// Every series for one job: the job itself, its operators, and their ports.
pub fn job_series(instance: &str, job_name: &str, job: &JobMetrics) -> Vec<(MetricSeries, f64)> {
    let mut out = Vec::new();
    let job_labels = vec![instance.to_string(), job_name.to_string()];
    push_series(&mut out, EntityType::Job, &job_labels, &job.metrics);

    for op in &job.operators {
        let mut op_labels = job_labels.clone();
        op_labels.push(op.name.clone());
        push_series(&mut out, EntityType::Operator, &op_labels, &op.metrics);

        for (entity_type, ports) in [
            (EntityType::OperatorInputPort, &op.input_ports),
            (EntityType::OperatorOutputPort, &op.output_ports),
        ] {
            for port in ports {
                let mut port_labels = op_labels.clone();
                port_labels.push(port.index.to_string());
                push_series(&mut out, entity_type, &port_labels, &port.metrics);
            }
        }
    }
    out
}

pub fn resource_series(instance: &str, resources: &[ResourceMetrics]) -> Vec<(MetricSeries, f64)> {
    let mut out = Vec::new();
    for r in resources {
        let labels = vec![instance.to_string(), r.id.clone()];
        push_series(&mut out, EntityType::Resource, &labels, &r.metrics);
    }
    out
}
