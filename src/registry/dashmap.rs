//! DashMap-based implementation of ListenerRegistry for concurrent access.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::{ListenerEntry, ListenerId, ListenerRegistry, PatternEntry};
use crate::listener::Listener;
use crate::pattern::TopicPattern;

/// A sharded registry implementation using DashMap.
///
/// Registrations under different patterns rarely contend, which suits
/// workloads with many concurrent `listen`/destroy calls. The dispatch
/// snapshot is consistent per pattern but not across patterns: a listener
/// registered under another pattern while the snapshot is being collected
/// may or may not be included.
#[derive(Debug, Clone, Default)]
pub struct DashMapRegistry {
    /// Map from pattern string to its listeners
    patterns: Arc<DashMap<Arc<str>, PatternEntry>>,
}

impl DashMapRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            patterns: Arc::new(DashMap::with_capacity(capacity)),
        }
    }
}

impl ListenerRegistry for DashMapRegistry {
    fn put(&self, pattern: TopicPattern, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId::new();
        let key = pattern.key();
        trace!(listener_id = %id, pattern = %key, "Registering listener");

        self.patterns
            .entry(key)
            .or_insert_with(|| PatternEntry::new(pattern))
            .insert(id, listener);

        id
    }

    fn remove(&self, pattern: &str, id: ListenerId) -> bool {
        let Entry::Occupied(mut occupied) = self.patterns.entry(Arc::from(pattern)) else {
            return false;
        };

        let removed = occupied.get_mut().remove(id);
        if occupied.get().is_empty() {
            occupied.remove();
            debug!(pattern, "Pattern has no listeners left");
        }
        removed
    }

    fn snapshot_for(&self, topic: &str) -> Vec<ListenerEntry> {
        let mut out = Vec::new();
        for entry in self.patterns.iter() {
            entry.value().collect_matching(topic, &mut out);
        }
        out
    }

    fn total_listeners(&self) -> usize {
        self.patterns.iter().map(|entry| entry.value().len()).sum()
    }

    fn listener_count(&self, pattern: &str) -> usize {
        self.patterns
            .get(pattern)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    fn patterns(&self) -> Vec<String> {
        self.patterns
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    fn clear(&self) {
        self.patterns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{exercise_registry, noop, pattern};

    #[test]
    fn test_shared_registry_behaviour() {
        exercise_registry(&DashMapRegistry::with_capacity(16));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = DashMapRegistry::new();
        let other = registry.clone();
        let id = registry.put(pattern("a.b"), noop());

        assert_eq!(other.listener_count("a.b"), 1);
        assert_eq!(other.snapshot_for("a.b").len(), 1);
        assert!(other.remove("a.b", id));
        assert_eq!(registry.total_listeners(), 0);
    }
}
