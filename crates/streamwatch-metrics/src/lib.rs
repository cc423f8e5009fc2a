//! streamwatch-metrics — the label-indexed metric store.
//!
//! Every series is addressed by a metric name, an [`EntityType`], and an
//! ordered tuple of label values whose arity the entity type fixes.
//! Series are kept sorted by label tuple so that a whole subtree (a job
//! and every operator and port nested under it) can be found and removed
//! in one pass.
//!
//! # Architecture
//!
//! ```text
//! MetricLabelIndex
//!   ├── add() / remove() ← one series at a time
//!   ├── remove_children(prefix) → drops a subtree atomically
//!   ├── replace_children(prefix, series) → swaps a subtree atomically
//!   └── snapshot() → (MetricSeries, value) pairs
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod error;
pub mod index;
pub mod prometheus;
pub mod series;

pub use error::MetricsError;
pub use index::MetricLabelIndex;
pub use prometheus::render_prometheus;
pub use series::{EntityType, MetricSeries, label_child_of, sanitize_metric_name};
