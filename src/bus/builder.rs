//! Builder pattern for constructing EventBus instances.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::bus::config::{DrainPolicy, EventBusConfig, FailurePolicy};
use crate::registry::{ListenerRegistry, LockedRegistry};
use crate::{EventBus, ListenerError, Result};

/// Builder for creating EventBus instances
pub struct EventBusBuilder {
    config: EventBusConfig,
    registry: Option<Arc<dyn ListenerRegistry>>,
}

impl EventBusBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
            registry: None,
        }
    }

    /// Use a custom configuration
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the event bus
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(EventBusConfig) -> EventBusConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Use a custom registry implementation
    pub fn registry(mut self, registry: Arc<dyn ListenerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the error handler
    pub fn error_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&ListenerError) -> Result<()> + Send + Sync + 'static,
    {
        self.configure(|c| c.error_handler(handler))
    }

    /// Set the escalation policy
    pub fn failure_policy(self, policy: FailurePolicy) -> Self {
        self.configure(|c| c.failure_policy(policy))
    }

    /// Set the drain policy
    pub fn drain_policy(self, policy: DrainPolicy) -> Self {
        self.configure(|c| c.drain_policy(policy))
    }

    /// Cap concurrently running listener invocations
    pub fn max_concurrent_listeners(self, limit: usize) -> Self {
        self.configure(|c| c.max_concurrent_listeners(limit))
    }

    /// Build with high-throughput configuration
    pub fn high_throughput(self) -> Self {
        self.config(EventBusConfig::high_throughput())
    }

    /// Build the EventBus without starting it
    pub fn build(self) -> EventBus {
        let registry = self.registry.unwrap_or_else(|| {
            debug!("Using default LockedRegistry");
            Arc::new(LockedRegistry::new())
        });
        EventBus::from_parts(self.config, registry)
    }

    /// Build the EventBus and start its dispatch loop
    pub fn build_and_start(self) -> Result<EventBus> {
        let bus = self.build();
        bus.start()?;
        Ok(bus)
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DashMapRegistry;
    use crate::{BasicEvent, Error, Event, LifecycleState};

    #[tokio::test]
    async fn test_builder_default() {
        let bus = EventBusBuilder::new().build();
        assert_eq!(bus.state(), LifecycleState::Created);
        assert_eq!(bus.config().failure_policy, FailurePolicy::Report);
    }

    #[tokio::test]
    async fn test_builder_configurations() {
        let bus = EventBus::builder()
            .failure_policy(FailurePolicy::StopBus)
            .drain_policy(DrainPolicy::Discard)
            .max_concurrent_listeners(4)
            .error_handler(|err| Err(err.error.clone()))
            .build();
        assert_eq!(bus.config().failure_policy, FailurePolicy::StopBus);
        assert_eq!(bus.config().drain_policy, DrainPolicy::Discard);
        assert_eq!(bus.config().max_concurrent_listeners, Some(4));

        let bus = EventBus::builder().high_throughput().build();
        assert!(bus.config().max_concurrent_listeners.is_some());
    }

    #[tokio::test]
    async fn test_build_and_start_with_dashmap_registry() {
        let registry = Arc::new(DashMapRegistry::new());
        let bus = EventBus::builder()
            .configure(|c| c.shutdown_timeout(std::time::Duration::from_secs(1)))
            .registry(registry.clone())
            .build_and_start()
            .unwrap();
        assert_eq!(bus.state(), LifecycleState::Running);

        bus.listen_fn("orders.*", |_e: Arc<dyn Event>| async { Ok(()) })
            .unwrap();
        assert_eq!(registry.total_listeners(), 1);

        let report = bus.emit_and_wait(BasicEvent::new("orders.paid")).await.unwrap();
        assert_eq!(report.invoked, 1);

        bus.shutdown().await.unwrap();
        assert_eq!(bus.emit(BasicEvent::new("orders.paid")), Err(Error::ServiceClosed));
    }

    #[test]
    fn test_build_and_start_outside_runtime() {
        let err = EventBusBuilder::default().build_and_start().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
