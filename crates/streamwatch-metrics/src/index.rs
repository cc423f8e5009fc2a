//! Label-indexed metric store.
//!
//! Series are grouped by label tuple in a `BTreeMap`. Because tuples sort
//! lexicographically, every prefix-extension of a tuple `p` sits in one
//! contiguous run starting at `p`, so subtree operations are a range scan
//! under a single write lock.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::series::{EntityType, MetricSeries};

/// Series sharing one label tuple, keyed by `(entity type, metric name)`.
type Bucket = BTreeMap<(EntityType, String), f64>;

/// Concurrent store of metric series keyed by ordered label tuples.
pub struct MetricLabelIndex {
    series: RwLock<BTreeMap<Vec<String>, Bucket>>,
}

impl Default for MetricLabelIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricLabelIndex {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a series or update its value.
    pub fn add(&self, series: MetricSeries, value: f64) {
        let mut map = self.series.write().expect("metric index lock");
        map.entry(series.labels)
            .or_default()
            .insert((series.entity_type, series.name), value);
    }

    /// Unregister one series. Returns whether it was present.
    pub fn remove(&self, series: &MetricSeries) -> bool {
        let mut map = self.series.write().expect("metric index lock");
        let Some(bucket) = map.get_mut(&series.labels) else {
            return false;
        };
        let removed = bucket
            .remove(&(series.entity_type, series.name.clone()))
            .is_some();
        if bucket.is_empty() {
            map.remove(&series.labels);
        }
        removed
    }

    pub fn get(&self, series: &MetricSeries) -> Option<f64> {
        let map = self.series.read().expect("metric index lock");
        map.get(&series.labels)?
            .get(&(series.entity_type, series.name.clone()))
            .copied()
    }

    /// Remove and return every series whose labels extend `prefix`.
    /// The empty prefix removes everything.
    pub fn remove_children(&self, prefix: &[String]) -> Vec<MetricSeries> {
        self.remove_children_of(prefix, |_| true)
    }

    /// [`remove_children`](Self::remove_children) restricted to series whose
    /// entity type satisfies `select`.
    pub fn remove_children_of(
        &self,
        prefix: &[String],
        select: impl Fn(EntityType) -> bool,
    ) -> Vec<MetricSeries> {
        let mut map = self.series.write().expect("metric index lock");
        let removed = drain_prefix(&mut map, prefix, &select);
        if !removed.is_empty() {
            debug!(prefix = ?prefix, removed = removed.len(), "removed metric subtree");
        }
        removed
    }

    /// Atomically replace the subtree under `prefix` with `series`.
    ///
    /// Series not under `prefix` are skipped. Returns the series that were
    /// present before and are not part of the replacement.
    pub fn replace_children(
        &self,
        prefix: &[String],
        series: Vec<(MetricSeries, f64)>,
    ) -> Vec<MetricSeries> {
        self.replace_children_of(prefix, |_| true, series)
    }

    /// [`replace_children`](Self::replace_children) restricted to series
    /// whose entity type satisfies `select`. Other series under `prefix`
    /// are left alone.
    pub fn replace_children_of(
        &self,
        prefix: &[String],
        select: impl Fn(EntityType) -> bool,
        series: Vec<(MetricSeries, f64)>,
    ) -> Vec<MetricSeries> {
        let mut map = self.series.write().expect("metric index lock");
        let previous = drain_prefix(&mut map, prefix, &select);

        for (s, value) in series {
            if !select(s.entity_type) || !s.is_child_of(prefix) {
                warn!(series = s.name(), prefix = ?prefix, "series outside replaced subtree skipped");
                continue;
            }
            map.entry(s.labels)
                .or_default()
                .insert((s.entity_type, s.name), value);
        }

        previous
            .into_iter()
            .filter(|s| {
                map.get(&s.labels)
                    .is_none_or(|bucket| !bucket.contains_key(&(s.entity_type, s.name.clone())))
            })
            .collect()
    }

    /// Replace every series of `entity_type` under `prefix`; everything else
    /// is left alone. Returns how many series were dropped first.
    pub fn replace_entities(
        &self,
        prefix: &[String],
        entity_type: EntityType,
        series: Vec<(MetricSeries, f64)>,
    ) -> usize {
        let mut map = self.series.write().expect("metric index lock");
        let dropped = drain_prefix(&mut map, prefix, |t| t == entity_type).len();

        for (s, value) in series {
            if s.entity_type != entity_type || !s.is_child_of(prefix) {
                warn!(series = s.name(), prefix = ?prefix, "series outside replaced set skipped");
                continue;
            }
            map.entry(s.labels)
                .or_default()
                .insert((s.entity_type, s.name), value);
        }
        dropped
    }

    /// Every series under `prefix` with its current value, in label order.
    pub fn children(&self, prefix: &[String]) -> Vec<(MetricSeries, f64)> {
        self.children_of(prefix, |_| true)
    }

    /// [`children`](Self::children) restricted to entity types matching `select`.
    pub fn children_of(
        &self,
        prefix: &[String],
        select: impl Fn(EntityType) -> bool,
    ) -> Vec<(MetricSeries, f64)> {
        let map = self.series.read().expect("metric index lock");
        map.range(prefix.to_vec()..)
            .take_while(|(labels, _)| labels.starts_with(prefix))
            .flat_map(|(labels, bucket)| {
                bucket
                    .iter()
                    .filter(|((entity_type, _), _)| select(*entity_type))
                    .map(move |((entity_type, name), value)| {
                        (
                            MetricSeries {
                                name: name.clone(),
                                entity_type: *entity_type,
                                labels: labels.clone(),
                            },
                            *value,
                        )
                    })
            })
            .collect()
    }

    /// Every series in the index.
    pub fn snapshot(&self) -> Vec<(MetricSeries, f64)> {
        self.children(&[])
    }

    pub fn len(&self) -> usize {
        let map = self.series.read().expect("metric index lock");
        map.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Label tuples extending `prefix`; one contiguous range of the map.
fn prefix_keys(map: &BTreeMap<Vec<String>, Bucket>, prefix: &[String]) -> Vec<Vec<String>> {
    map.range(prefix.to_vec()..)
        .map(|(labels, _)| labels)
        .take_while(|labels| labels.starts_with(prefix))
        .cloned()
        .collect()
}

fn drain_prefix(
    map: &mut BTreeMap<Vec<String>, Bucket>,
    prefix: &[String],
    select: impl Fn(EntityType) -> bool,
) -> Vec<MetricSeries> {
    let mut removed = Vec::new();
    for labels in prefix_keys(map, prefix) {
        let Some(bucket) = map.get_mut(&labels) else {
            continue;
        };
        let taken: Vec<(EntityType, String)> = bucket
            .keys()
            .filter(|(entity_type, _)| select(*entity_type))
            .cloned()
            .collect();
        for key in taken {
            bucket.remove(&key);
            let (entity_type, name) = key;
            removed.push(MetricSeries {
                name,
                entity_type,
                labels: labels.clone(),
            });
        }
        if bucket.is_empty() {
            map.remove(&labels);
        }
    }
    removed
}
