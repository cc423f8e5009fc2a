//! Job records and the copy-on-write job table.
//!
//! A [`JobTable`] is never mutated once published. The refresh task builds
//! the next table from the current one and swaps it in; readers holding
//! an `Arc<JobTable>` keep a consistent view of one completed refresh.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use streamwatch_core::{EntityId, Freshness, JobHealth, JobStatus};
use streamwatch_remote::JobDescriptor;

/// Last known good payload plus its freshness triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CachedPayload {
    pub freshness: Freshness,
    #[serde(skip)]
    pub payload: Option<Arc<Value>>,
}

impl CachedPayload {
    /// Replace the payload after a successful refresh.
    pub fn succeeded(&self, payload: Arc<Value>, now: u64) -> Self {
        Self {
            freshness: self.freshness.succeeded(now),
            payload: Some(payload),
        }
    }

    /// Record a failure. The cached payload is kept.
    pub fn failed(&self, now: u64) -> Self {
        Self {
            freshness: self.freshness.failed(now),
            payload: self.payload.clone(),
        }
    }
}

/// One job in the hierarchy cache. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: EntityId,
    pub name: String,
    pub status: JobStatus,
    pub health: JobHealth,
    pub metrics: CachedPayload,
    pub snapshot: CachedPayload,
}

impl JobRecord {
    pub fn new(descriptor: &JobDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            status: descriptor.status,
            health: descriptor.health,
            metrics: CachedPayload::default(),
            snapshot: CachedPayload::default(),
        }
    }

    /// Mark both payloads failed at `now`.
    pub fn failed(&self, now: u64) -> Self {
        Self {
            metrics: self.metrics.failed(now),
            snapshot: self.snapshot.failed(now),
            ..self.clone()
        }
    }
}

/// Job map keyed by id plus the name → id index.
///
/// Every id in the name index resolves to a present record.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: BTreeMap<EntityId, Arc<JobRecord>>,
    names: HashMap<String, EntityId>,
}

impl JobTable {
    pub fn get(&self, id: &EntityId) -> Option<&Arc<JobRecord>> {
        self.jobs.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<JobRecord>> {
        self.names.get(name).and_then(|id| self.jobs.get(id))
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<JobRecord>> {
        self.jobs.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.jobs.keys()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of name index entries. Equals `len()` unless two jobs share a name.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// A copy with every record transformed by `f`. Names are unchanged.
    pub(crate) fn map_records(&self, mut f: impl FnMut(&JobRecord) -> JobRecord) -> JobTable {
        JobTable {
            jobs: self
                .jobs
                .iter()
                .map(|(id, r)| (id.clone(), Arc::new(f(r))))
                .collect(),
            names: self.names.clone(),
        }
    }
}

/// Outcome of diffing a job listing against the cached table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciliation {
    pub added: Vec<EntityId>,
    /// Removed jobs with the name they were cached under.
    pub removed: Vec<(EntityId, String)>,
    /// `(id, old name, new name)`.
    pub renamed: Vec<(EntityId, String, String)>,
}

/// Build the table matching `listed`, carrying cached payloads over for
/// ids present in both.
///
/// Status and health always come from the listing. When two listed jobs
/// share a name, the one listed last owns the name index entry.
pub fn reconcile(current: &JobTable, listed: &[JobDescriptor]) -> (JobTable, Reconciliation) {
    let mut jobs = BTreeMap::new();
    let mut names = HashMap::new();
    let mut diff = Reconciliation::default();

    for d in listed {
        let record = match current.jobs.get(&d.id) {
            Some(prev) => {
                if prev.name != d.name {
                    diff.renamed
                        .push((d.id.clone(), prev.name.clone(), d.name.clone()));
                }
                JobRecord {
                    name: d.name.clone(),
                    status: d.status,
                    health: d.health,
                    ..(**prev).clone()
                }
            }
            None => {
                if !jobs.contains_key(&d.id) {
                    diff.added.push(d.id.clone());
                }
                JobRecord::new(d)
            }
        };
        names.insert(d.name.clone(), d.id.clone());
        jobs.insert(d.id.clone(), Arc::new(record));
    }

    // A duplicated id keeps only its last name; drop index entries that
    // point at a record under a different name.
    names.retain(|name, id| jobs.get(id).is_some_and(|r| &r.name == name));

    for (id, prev) in &current.jobs {
        if !jobs.contains_key(id) {
            diff.removed.push((id.clone(), prev.name.clone()));
        }
    }

    (JobTable { jobs, names }, diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(id: u64, name: &str) -> JobDescriptor {
        JobDescriptor {
            id: EntityId::from(id),
            name: name.to_string(),
            status: JobStatus::Running,
            health: JobHealth::Healthy,
        }
    }

    fn table(listed: &[JobDescriptor]) -> JobTable {
        reconcile(&JobTable::default(), listed).0
    }

    #[test]
    fn first_listing_adds_everything() {
        let (t, diff) = reconcile(&JobTable::default(), &[d(2, "B"), d(1, "A")]);
        assert_eq!(t.len(), 2);
        assert_eq!(diff.added, vec![EntityId::from(2), EntityId::from(1)]);
        let ids: Vec<_> = t.ids().cloned().collect();
        assert_eq!(ids, vec![EntityId::from(1), EntityId::from(2)]);
    }

    #[test]
    fn removed_job_purges_name_index() {
        let current = table(&[d(1, "A"), d(2, "B")]);
        let (next, diff) = reconcile(&current, &[d(1, "A"), d(3, "C")]);

        assert_eq!(diff.removed, vec![(EntityId::from(2), "B".to_string())]);
        assert_eq!(diff.added, vec![EntityId::from(3)]);
        assert!(next.get(&EntityId::from(2)).is_none());
        assert!(next.by_name("B").is_none());
        assert_eq!(next.by_name("C").unwrap().id, EntityId::from(3));
        assert_eq!(next.name_count(), 2);
    }

    #[test]
    fn rename_moves_name_mapping() {
        let current = table(&[d(1, "A")]);
        let (next, diff) = reconcile(&current, &[d(1, "A2")]);

        assert_eq!(
            diff.renamed,
            vec![(EntityId::from(1), "A".to_string(), "A2".to_string())]
        );
        assert!(next.by_name("A").is_none());
        assert_eq!(next.by_name("A2").unwrap().id, EntityId::from(1));
        assert_eq!(next.name_count(), 1);
    }

    #[test]
    fn swapped_names_resolve_correctly() {
        let current = table(&[d(1, "A"), d(2, "B")]);
        let (next, _) = reconcile(&current, &[d(1, "B"), d(2, "A")]);
        assert_eq!(next.by_name("A").unwrap().id, EntityId::from(2));
        assert_eq!(next.by_name("B").unwrap().id, EntityId::from(1));
    }

    #[test]
    fn duplicate_names_last_listed_wins() {
        let (t, _) = reconcile(&JobTable::default(), &[d(1, "X"), d(2, "X")]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.by_name("X").unwrap().id, EntityId::from(2));
        assert_eq!(t.name_count(), 1);
    }

    #[test]
    fn payloads_survive_reconcile() {
        let current = table(&[d(1, "A")]).map_records(|r| JobRecord {
            metrics: r.metrics.succeeded(Arc::new(Value::from(5)), 100),
            ..r.clone()
        });
        let mut changed = d(1, "A");
        changed.status = JobStatus::Stopping;

        let (next, diff) = reconcile(&current, &[changed]);
        let rec = next.get(&EntityId::from(1)).unwrap();
        assert_eq!(rec.status, JobStatus::Stopping);
        assert_eq!(rec.metrics.payload.as_deref(), Some(&Value::from(5)));
        assert_eq!(diff, Reconciliation::default());
    }

    #[test]
    fn failure_keeps_payload() {
        let ok = CachedPayload::default().succeeded(Arc::new(Value::from("p")), 10);
        let failed = ok.failed(20);
        assert_eq!(failed.payload, ok.payload);
        assert!(failed.freshness.failed);
        assert_eq!(failed.freshness.last_refresh, Some(10));
        assert_eq!(failed.freshness.last_failure, Some(20));
    }
}
