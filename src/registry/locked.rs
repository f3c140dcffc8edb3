//! Single-lock registry implementation, the default.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{ListenerEntry, ListenerId, ListenerRegistry, PatternEntry};
use crate::listener::Listener;
use crate::pattern::TopicPattern;

/// A registry guarded by one mutex.
///
/// Every operation, including the dispatch snapshot, runs under the same
/// lock, so a snapshot is a true point-in-time view of all patterns.
pub struct LockedRegistry {
    patterns: Mutex<HashMap<Arc<str>, PatternEntry>>,
}

impl LockedRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            patterns: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LockedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedRegistry")
            .field("patterns", &self.patterns.lock().len())
            .finish()
    }
}

impl ListenerRegistry for LockedRegistry {
    fn put(&self, pattern: TopicPattern, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId::new();
        let key = pattern.key();
        trace!(listener_id = %id, pattern = %key, "Registering listener");

        self.patterns
            .lock()
            .entry(key)
            .or_insert_with(|| PatternEntry::new(pattern))
            .insert(id, listener);

        id
    }

    fn remove(&self, pattern: &str, id: ListenerId) -> bool {
        let mut patterns = self.patterns.lock();
        let Some(entry) = patterns.get_mut(pattern) else {
            return false;
        };

        let removed = entry.remove(id);
        if entry.is_empty() {
            patterns.remove(pattern);
            debug!(pattern, "Pattern has no listeners left");
        }
        removed
    }

    fn snapshot_for(&self, topic: &str) -> Vec<ListenerEntry> {
        let patterns = self.patterns.lock();
        let mut out = Vec::new();
        for entry in patterns.values() {
            entry.collect_matching(topic, &mut out);
        }
        out
    }

    fn total_listeners(&self) -> usize {
        self.patterns.lock().values().map(PatternEntry::len).sum()
    }

    fn listener_count(&self, pattern: &str) -> usize {
        self.patterns
            .lock()
            .get(pattern)
            .map(PatternEntry::len)
            .unwrap_or(0)
    }

    fn patterns(&self) -> Vec<String> {
        self.patterns.lock().keys().map(|k| k.to_string()).collect()
    }

    fn clear(&self) {
        self.patterns.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{exercise_registry, noop, pattern};

    #[test]
    fn test_shared_registry_behaviour() {
        exercise_registry(&LockedRegistry::new());
    }

    #[test]
    fn test_concurrent_put_and_remove() {
        let registry = Arc::new(LockedRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let key = format!("t{}.*", i % 2);
                    for _ in 0..100 {
                        let id = registry.put(pattern(&key), noop());
                        let _ = registry.snapshot_for("t0.x");
                        assert!(registry.remove(&key, id));
                    }
                    registry.put(pattern(&key), noop())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.total_listeners(), 8);
        assert_eq!(registry.snapshot_for("t1.y").len(), 4);
    }
}
