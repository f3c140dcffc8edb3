//! Listener registry for mapping topic patterns to listeners.
//!
//! The registry is responsible for maintaining the mapping between
//! patterns and their listeners in a thread-safe manner, and for producing
//! the point-in-time listener snapshot the dispatch loop fans out to.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use uuid::Uuid;

use crate::listener::Listener;
use crate::pattern::TopicPattern;

mod dashmap;
mod locked;

pub use self::dashmap::DashMapRegistry;
pub use self::locked::LockedRegistry;

/// Unique identifier of one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A listener captured for one dispatch cycle
#[derive(Clone)]
pub struct ListenerEntry {
    /// Registration id
    pub id: ListenerId,

    /// Pattern the listener was registered under
    pub pattern: Arc<str>,

    /// The listener itself
    pub listener: Arc<dyn Listener>,
}

impl Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("listener", &self.listener.name())
            .finish()
    }
}

/// All listeners registered under one pattern
pub(crate) struct PatternEntry {
    pattern: TopicPattern,
    listeners: HashMap<ListenerId, Arc<dyn Listener>>,
}

impl Debug for PatternEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternEntry")
            .field("pattern", &self.pattern.as_str())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl PatternEntry {
    pub(crate) fn new(pattern: TopicPattern) -> Self {
        Self {
            pattern,
            listeners: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: ListenerId, listener: Arc<dyn Listener>) {
        self.listeners.insert(id, listener);
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Append this entry's listeners to `out` if the pattern matches `topic`
    pub(crate) fn collect_matching(&self, topic: &str, out: &mut Vec<ListenerEntry>) {
        if self.listeners.is_empty() || !self.pattern.matches(topic) {
            return;
        }
        let key = self.pattern.key();
        out.extend(self.listeners.iter().map(|(id, listener)| ListenerEntry {
            id: *id,
            pattern: key.clone(),
            listener: listener.clone(),
        }));
    }
}

/// Trait for registries that map topic patterns to listeners.
///
/// Implementations must be thread-safe as they will be accessed
/// concurrently from registration calls, destroyers and the dispatch loop.
pub trait ListenerRegistry: Send + Sync + Debug {
    /// Register a listener under a compiled pattern
    fn put(&self, pattern: TopicPattern, listener: Arc<dyn Listener>) -> ListenerId;

    /// Remove a registration. Returns `false` if it was already gone.
    fn remove(&self, pattern: &str, id: ListenerId) -> bool;

    /// Every listener whose pattern matches `topic`, as of now
    fn snapshot_for(&self, topic: &str) -> Vec<ListenerEntry>;

    /// Get total number of listeners across all patterns
    fn total_listeners(&self) -> usize;

    /// Get number of listeners registered under exactly `pattern`
    fn listener_count(&self, pattern: &str) -> usize;

    /// Get all patterns that currently have listeners
    fn patterns(&self) -> Vec<String>;

    /// Remove every registration
    fn clear(&self);
}

/// Registry statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of distinct patterns
    pub patterns: usize,

    /// Total number of listeners
    pub total_listeners: usize,
}

/// Extension trait for registries with statistics
pub trait RegistryStatistics: ListenerRegistry {
    /// Get current registry statistics
    fn stats(&self) -> RegistryStats {
        RegistryStats {
            patterns: self.patterns().len(),
            total_listeners: self.total_listeners(),
        }
    }
}

impl<T: ListenerRegistry + ?Sized> RegistryStatistics for T {}
