use std::collections::{HashMap, HashSet};

use crate::item::NormalizedItem;

/// Sweep-scoped recency sets that keep an item matched by several queries
/// from being emitted more than once.
///
/// Only active with more than one query. History lives in memory and is
/// rebuilt sweep by sweep; it is not a durable index.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    active: bool,
    recent: HashMap<usize, HashSet<String>>,
}

impl Deduplicator {
    pub fn new(query_count: usize) -> Self {
        Self {
            active: query_count > 1,
            recent: HashMap::new(),
        }
    }

    /// A query starting a new (non-paged) request forgets what it saw last sweep.
    pub fn begin_sweep(&mut self, query_index: usize, first_page: bool) {
        if self.active && first_page {
            self.recent.insert(query_index, HashSet::new());
        }
    }

    /// Drop items whose id any query has recorded, then record every id for `query_index`.
    pub fn filter(&mut self, query_index: usize, items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        if !self.active {
            return items;
        }

        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.id() else {
                kept.push(item);
                continue;
            };
            if !self.seen_by_any(&id) {
                kept.push(item);
            }
            self.recent.entry(query_index).or_default().insert(id);
        }
        kept
    }

    pub fn recent(&self, query_index: usize) -> Option<&HashSet<String>> {
        self.recent.get(&query_index)
    }

    fn seen_by_any(&self, id: &str) -> bool {
        self.recent.values().any(|ids| ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str) -> NormalizedItem {
        NormalizedItem::from_value(json!({ "id": id }))
    }

    fn ids(items: &[NormalizedItem]) -> Vec<String> {
        items.iter().filter_map(|i| i.id()).collect()
    }

    #[test]
    fn single_query_never_filters() {
        let mut dedup = Deduplicator::new(1);
        dedup.begin_sweep(0, true);
        let out = dedup.filter(0, vec![item("x"), item("x")]);
        assert_eq!(out.len(), 2);
        assert!(dedup.recent(0).is_none());
    }

    #[test]
    fn item_seen_by_another_query_is_dropped() {
        let mut dedup = Deduplicator::new(2);
        dedup.begin_sweep(0, true);
        assert_eq!(ids(&dedup.filter(0, vec![item("x"), item("y")])), vec!["x", "y"]);

        dedup.begin_sweep(1, true);
        assert_eq!(ids(&dedup.filter(1, vec![item("x"), item("z")])), vec!["z"]);
        // Recorded for query 1 even though it was not emitted there.
        assert!(dedup.recent(1).unwrap().contains("x"));
    }

    #[test]
    fn same_query_repeat_within_sweep_is_dropped() {
        let mut dedup = Deduplicator::new(2);
        dedup.begin_sweep(0, true);
        dedup.filter(0, vec![item("x")]);
        dedup.begin_sweep(0, false);
        assert!(dedup.filter(0, vec![item("x")]).is_empty());
    }

    #[test]
    fn new_sweep_clears_only_that_query() {
        let mut dedup = Deduplicator::new(2);
        dedup.begin_sweep(0, true);
        dedup.filter(0, vec![item("x")]);
        dedup.begin_sweep(1, true);
        dedup.filter(1, vec![item("y")]);

        dedup.begin_sweep(0, true);
        assert!(dedup.recent(0).unwrap().is_empty());
        assert!(dedup.recent(1).unwrap().contains("y"));
        // Still blocked: query 1 saw it.
        assert!(dedup.filter(0, vec![item("y")]).is_empty());
        // Query 0 forgot x, nobody else has it.
        assert_eq!(ids(&dedup.filter(0, vec![item("x")])), vec!["x"]);
    }

    #[test]
    fn items_without_id_always_pass() {
        let mut dedup = Deduplicator::new(3);
        let anon = NormalizedItem::from_value(json!({"caption": "anon"}));
        dedup.begin_sweep(0, true);
        assert_eq!(dedup.filter(0, vec![anon.clone()]).len(), 1);
        dedup.begin_sweep(1, true);
        assert_eq!(dedup.filter(1, vec![anon]).len(), 1);
        assert!(dedup.recent(1).unwrap().is_empty());
    }
}
