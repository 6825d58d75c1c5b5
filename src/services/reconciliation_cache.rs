//! In-memory reconciliation cache.
//!
//! Maps item identity to the last-seen item plus the instant the engine first
//! observed it. Has no locking of its own; the reconciler owns it behind a
//! single mutex shared with the liveness monitor.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::models::WorkItem;

/// A cached item and its process-local arrival time.
#[derive(Debug, Clone)]
pub struct CachedItem {
    pub item: WorkItem,
    pub arrived_at: Instant,
}

/// Identity-keyed cache of delivered items.
#[derive(Debug, Default)]
pub struct ReconciliationCache {
    entries: HashMap<String, CachedItem>,
}

impl ReconciliationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item, stamping it with `arrived_at`.
    pub fn upsert(&mut self, item: WorkItem, arrived_at: Instant) {
        self.entries
            .insert(item.id.clone(), CachedItem { item, arrived_at });
    }

    pub fn remove(&mut self, id: &str) -> Option<CachedItem> {
        self.entries.remove(id)
    }

    /// Drop every entry whose identity is not in `keep`. Returns the removed ids.
    pub fn remove_all_except(&mut self, keep: &HashSet<&str>) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            self.entries.remove(id);
        }
        removed
    }

    /// Entries that arrived strictly before `now - max_age`, oldest first.
    pub fn snapshot_older_than(&self, max_age: Duration, now: Instant) -> Vec<CachedItem> {
        let mut stale: Vec<CachedItem> = self
            .entries
            .values()
            .filter(|entry| now.saturating_duration_since(entry.arrived_at) > max_age)
            .cloned()
            .collect();
        stale.sort_by(|a, b| {
            a.arrived_at
                .cmp(&b.arrived_at)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        stale
    }

    /// Remove and return the entries [`snapshot_older_than`](Self::snapshot_older_than) would report.
    pub fn drain_older_than(&mut self, max_age: Duration, now: Instant) -> Vec<CachedItem> {
        let stale = self.snapshot_older_than(max_age, now);
        for entry in &stale {
            self.entries.remove(&entry.item.id);
        }
        stale
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&CachedItem> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached identities, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ItemStatus, RequestOperation, WorkKind};

    fn item(id: &str) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            external_id: None,
            kind: WorkKind::Request(RequestOperation::Test),
            payload: serde_json::Value::Null,
            status: ItemStatus::Added,
        }
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut cache = ReconciliationCache::new();
        let now = Instant::now();

        cache.upsert(item("a"), now);
        cache.upsert(item("b"), now);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));

        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert_eq!(cache.ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_remove_all_except() {
        let mut cache = ReconciliationCache::new();
        let now = Instant::now();
        for id in ["a", "b", "c"] {
            cache.upsert(item(id), now);
        }

        let keep: HashSet<&str> = ["b", "zzz"].into_iter().collect();
        let removed = cache.remove_all_except(&keep);

        assert_eq!(removed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(cache.ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_older_than_is_strict_and_ordered() {
        let mut cache = ReconciliationCache::new();
        let base = Instant::now();
        cache.upsert(item("young"), base + Duration::from_secs(50));
        cache.upsert(item("b-old"), base);
        cache.upsert(item("a-old"), base);
        cache.upsert(item("edge"), base + Duration::from_secs(30));

        let now = base + Duration::from_secs(90);
        let stale = cache.snapshot_older_than(Duration::from_secs(60), now);
        let ids: Vec<&str> = stale.iter().map(|e| e.item.id.as_str()).collect();

        // "edge" is exactly 60s old, which is not older than the timeout.
        assert_eq!(ids, vec!["a-old", "b-old"]);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_drain_older_than_removes_entries() {
        let mut cache = ReconciliationCache::new();
        let base = Instant::now();
        cache.upsert(item("a"), base);
        cache.upsert(item("b"), base + Duration::from_secs(80));

        let drained = cache.drain_older_than(Duration::from_secs(60), base + Duration::from_secs(90));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].item.id, "a");
        assert_eq!(cache.ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut cache = ReconciliationCache::new();
        cache.upsert(item("a"), Instant::now());
        cache.clear();
        assert!(cache.is_empty());
    }
}
