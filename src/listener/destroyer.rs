//! Destroyer handles returned by listener registration.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::registry::{ListenerId, ListenerRegistry};

/// Removes one specific listener registration.
///
/// Calling [`destroy`](Destroyer::destroy) any number of times is safe;
/// only the first call has an effect. Dropping a destroyer does *not*
/// remove the listener.
#[derive(Clone)]
pub struct Destroyer {
    inner: Arc<DestroyerInner>,
}

struct DestroyerInner {
    id: ListenerId,
    pattern: Arc<str>,
    registry: Weak<dyn ListenerRegistry>,
    destroyed: AtomicBool,
}

impl Destroyer {
    pub(crate) fn new(
        id: ListenerId,
        pattern: Arc<str>,
        registry: Weak<dyn ListenerRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(DestroyerInner {
                id,
                pattern,
                registry,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Remove the listener.
    ///
    /// Returns `true` for the call that actually removed it. Events already
    /// captured for dispatch are still delivered.
    pub fn destroy(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let Some(registry) = self.inner.registry.upgrade() else {
            return false;
        };

        let removed = registry.remove(&self.inner.pattern, self.inner.id);
        debug!(
            listener_id = %self.inner.id,
            pattern = %self.inner.pattern,
            removed,
            "Listener destroyed"
        );
        removed
    }

    /// Get the listener ID
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// Get the pattern the listener was registered under
    pub fn pattern(&self) -> &str {
        &self.inner.pattern
    }

    /// Whether `destroy` has not been called yet
    pub fn is_active(&self) -> bool {
        !self.inner.destroyed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Destroyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destroyer")
            .field("id", &self.inner.id)
            .field("pattern", &self.inner.pattern)
            .field("active", &self.is_active())
            .finish()
    }
}

impl fmt::Display for Destroyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener '{}' ({})", self.inner.pattern, self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FunctionListener;
    use crate::registry::LockedRegistry;
    use crate::{Event, TopicPattern};

    fn registry_with_listener() -> (Arc<dyn ListenerRegistry>, Destroyer) {
        let registry: Arc<dyn ListenerRegistry> = Arc::new(LockedRegistry::new());
        let pattern = TopicPattern::new("users.*").unwrap();
        let key = pattern.key();
        let listener = FunctionListener::new(|_event: Arc<dyn Event>| async { Ok(()) });
        let id = registry.put(pattern, Arc::new(listener));
        let destroyer = Destroyer::new(id, key, Arc::downgrade(&registry));
        (registry, destroyer)
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (registry, destroyer) = registry_with_listener();
        assert!(destroyer.is_active());
        assert_eq!(registry.total_listeners(), 1);

        assert!(destroyer.destroy());
        assert!(!destroyer.is_active());
        assert_eq!(registry.total_listeners(), 0);

        assert!(!destroyer.destroy());
        assert!(!destroyer.clone().destroy());
        assert_eq!(registry.total_listeners(), 0);
    }

    #[test]
    fn test_destroy_after_registry_dropped() {
        let (registry, destroyer) = registry_with_listener();
        drop(registry);
        assert!(!destroyer.destroy());
    }

    #[test]
    fn test_display() {
        let (_registry, destroyer) = registry_with_listener();
        assert_eq!(
            destroyer.to_string(),
            format!("Listener 'users.*' ({})", destroyer.id())
        );
        assert_eq!(destroyer.pattern(), "users.*");
    }
}
