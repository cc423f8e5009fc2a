//! Series identity: entity types, label tuples, and the child-of relation.

use std::fmt;

use serde::Serialize;

use crate::error::MetricsError;

/// The kind of entity a series describes. Fixes label arity and meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Instance,
    Resource,
    Job,
    Operator,
    OperatorInputPort,
    OperatorOutputPort,
}

impl EntityType {
    /// Exposition label names, one per label value.
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            EntityType::Instance => &["instancename"],
            EntityType::Resource => &["instancename", "resource"],
            EntityType::Job => &["instancename", "jobname"],
            EntityType::Operator => &["instancename", "jobname", "operatorname"],
            EntityType::OperatorInputPort | EntityType::OperatorOutputPort => {
                &["instancename", "jobname", "operatorname", "portindex"]
            }
        }
    }

    pub fn arity(self) -> usize {
        self.label_names().len()
    }

    /// A job or anything nested under one. Resource series share the
    /// `[instance, x]` label shape with jobs but are not part of any job.
    pub fn in_job_tree(self) -> bool {
        matches!(
            self,
            EntityType::Job
                | EntityType::Operator
                | EntityType::OperatorInputPort
                | EntityType::OperatorOutputPort
        )
    }

    /// Prefix applied to metric names reported by the remote endpoint.
    pub fn metric_prefix(self) -> &'static str {
        match self {
            EntityType::Instance => "streamwatch_instance",
            EntityType::Resource => "streamwatch_resource",
            EntityType::Job => "streamwatch_job",
            EntityType::Operator => "streamwatch_operator",
            EntityType::OperatorInputPort => "streamwatch_operator_ip",
            EntityType::OperatorOutputPort => "streamwatch_operator_op",
        }
    }

    /// Exposition name for a raw remote metric name, e.g.
    /// `nTuplesProcessed` on an input port becomes
    /// `streamwatch_operator_ip_nTuplesProcessed`.
    pub fn metric_name(self, raw: &str) -> String {
        sanitize_metric_name(&format!("{}_{}", self.metric_prefix(), raw))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Instance => "instance",
            EntityType::Resource => "resource",
            EntityType::Job => "job",
            EntityType::Operator => "operator",
            EntityType::OperatorInputPort => "operator input port",
            EntityType::OperatorOutputPort => "operator output port",
        };
        f.write_str(s)
    }
}

/// One metric series: `(name, entity type, label values)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricSeries {
    pub(crate) name: String,
    pub(crate) entity_type: EntityType,
    pub(crate) labels: Vec<String>,
}

impl MetricSeries {
    /// Build a series, checking label arity against the entity type.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        labels: Vec<String>,
    ) -> Result<Self, MetricsError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MetricsError::EmptyName);
        }
        if labels.len() != entity_type.arity() {
            return Err(MetricsError::Arity {
                entity_type,
                expected: entity_type.arity(),
                got: labels.len(),
            });
        }
        Ok(Self {
            name,
            entity_type,
            labels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_child_of(&self, prefix: &[String]) -> bool {
        label_child_of(&self.labels, prefix)
    }
}

/// True iff the first `prefix.len()` values of `labels` equal `prefix`.
/// Every tuple is a child of the empty prefix; a shorter tuple never is.
pub fn label_child_of(labels: &[String], prefix: &[String]) -> bool {
    labels.starts_with(prefix)
}

/// Replace every character outside `[a-zA-Z0-9_:]` with `_`.
pub fn sanitize_metric_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
