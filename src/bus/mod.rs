//! The main EventBus implementation.
//!
//! The EventBus is the primary interface for registering listeners and
//! emitting events. It coordinates between the registry, the lifecycle
//! (queue and root context) and the dispatch loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::context::EventContext;
use crate::dispatcher::{
    DispatchCounters, DispatchLoop, DispatchReport, DispatcherStats, InvocationPool,
    ListenerFailure, QueuedEvent,
};
use crate::listener::{Destroyer, FunctionListener, Listener};
use crate::pattern::TopicPattern;
use crate::registry::{ListenerRegistry, LockedRegistry, RegistryStatistics, RegistryStats};
use crate::{Error, Event, Result};

pub mod builder;
pub mod config;
pub(crate) mod lifecycle;

pub use builder::EventBusBuilder;
pub use config::{DrainPolicy, ErrorHandler, EventBusConfig, FailurePolicy};
pub use lifecycle::LifecycleState;

use lifecycle::Lifecycle;

/// An in-process publish/subscribe event bus.
///
/// Listeners register under a topic pattern; every emitted event is
/// delivered to each listener whose pattern matches its topic, one task per
/// listener, after the bus has been [started](EventBus::start).
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_pubsub::{BasicEvent, Event, EventBus};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let bus = EventBus::new();
///     bus.start()?;
///
///     let destroyer = bus.listen_fn("users.*", |event: Arc<dyn Event>| async move {
///         println!("got {}", event.topic());
///         Ok(())
///     })?;
///
///     bus.emit(BasicEvent::new("users.created").with_payload(42u64))?;
///
///     destroyer.destroy();
///     bus.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct EventBus {
    config: EventBusConfig,
    registry: Arc<dyn ListenerRegistry>,
    lifecycle: Arc<Lifecycle>,
    pool: InvocationPool,
    counters: Arc<DispatchCounters>,
    tracker: TaskTracker,
    failures: broadcast::Sender<ListenerFailure>,
}

impl EventBus {
    /// Create a bus with the default configuration and registry
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a bus with a custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        Self::from_parts(config, Arc::new(LockedRegistry::new()))
    }

    /// Create a new EventBus builder
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    pub(crate) fn from_parts(config: EventBusConfig, registry: Arc<dyn ListenerRegistry>) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let counters = Arc::new(DispatchCounters::default());
        let tracker = TaskTracker::new();
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));

        let pool = InvocationPool::new(
            config.max_concurrent_listeners,
            config.error_handler.clone(),
            config.failure_policy,
            failures.clone(),
            counters.clone(),
            tracker.clone(),
            Arc::downgrade(&lifecycle),
        );

        debug!(config = ?config, "Event bus created");

        Self {
            config,
            registry,
            lifecycle,
            pool,
            counters,
            tracker,
            failures,
        }
    }

    /// Register a listener under `pattern`.
    ///
    /// The returned [`Destroyer`] removes exactly this registration.
    pub fn listen<L: Listener>(&self, pattern: &str, listener: L) -> Result<Destroyer> {
        self.listen_arc(pattern, Arc::new(listener))
    }

    /// Register a shared listener under `pattern`
    pub fn listen_arc(&self, pattern: &str, listener: Arc<dyn Listener>) -> Result<Destroyer> {
        if self.lifecycle.is_closed() {
            return Err(Error::ServiceClosed);
        }

        let pattern = TopicPattern::new(pattern)?;
        let key = pattern.key();
        let name = listener.name().to_string();
        let id = self.registry.put(pattern, listener);

        debug!(listener_id = %id, pattern = %key, listener = %name, "Listener registered");

        Ok(Destroyer::new(id, key, Arc::downgrade(&self.registry)))
    }

    /// Register an async closure under `pattern`
    pub fn listen_fn<F, Fut>(&self, pattern: &str, function: F) -> Result<Destroyer>
    where
        F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.listen(pattern, FunctionListener::new(function))
    }

    /// Queue an event for delivery.
    ///
    /// The bus root context is attached first. Never blocks; dispatch
    /// failures are never reported here.
    pub fn emit<E: Event>(&self, mut event: E) -> Result<()> {
        event.set_context(self.lifecycle.root().clone());
        self.enqueue(Arc::new(event), None)
    }

    /// Queue a boxed event for delivery
    pub fn emit_boxed(&self, mut event: Box<dyn Event>) -> Result<()> {
        event.set_context(self.lifecycle.root().clone());
        self.enqueue(Arc::from(event), None)
    }

    /// Queue an event and wait until every listener it reached has finished.
    ///
    /// Returns [`Error::ServiceClosed`] if the bus is closed, or if it stops
    /// before the event is dispatched and queued events are discarded.
    pub async fn emit_and_wait<E: Event>(&self, mut event: E) -> Result<DispatchReport> {
        event.set_context(self.lifecycle.root().clone());
        let (tx, rx) = oneshot::channel();
        self.enqueue(Arc::new(event), Some(tx))?;
        rx.await.map_err(|_| Error::ServiceClosed)
    }

    fn enqueue(&self, event: Arc<dyn Event>, ack: Option<oneshot::Sender<DispatchReport>>) -> Result<()> {
        let topic = event.topic().to_string();
        self.lifecycle.enqueue(QueuedEvent::new(event, ack))?;
        DispatchCounters::bump(&self.counters.emitted);
        trace!(topic = %topic, "Event queued");
        Ok(())
    }

    /// Start the dispatch loop on the current Tokio runtime.
    ///
    /// Later calls are no-ops. Fails with [`Error::ServiceClosed`] once
    /// stopped and [`Error::Internal`] outside a runtime.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|e| Error::internal(format!("no Tokio runtime available: {e}")))?;

        let Some(receiver) = self.lifecycle.begin_running()? else {
            return Ok(());
        };

        let dispatch = DispatchLoop::new(
            receiver,
            self.registry.clone(),
            self.pool.clone(),
            self.tracker.clone(),
            self.lifecycle.root().clone(),
            self.config.drain_policy,
            self.counters.clone(),
        );
        self.tracker.spawn_on(dispatch.run(), &handle);

        info!("Event bus started");
        Ok(())
    }

    /// Stop the bus. Idempotent.
    ///
    /// Closes the queue and cancels the root context with cause
    /// `"event service closed"`. In-flight listeners are not interrupted.
    pub fn stop(&self) {
        self.lifecycle.stop();
    }

    /// Stop the bus and wait for the dispatch loop and in-flight listeners
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        self.tracker.close();

        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Event bus shutdown complete");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.shutdown_timeout,
                    pending = self.tracker.len(),
                    "Event bus shutdown timed out"
                );
                Err(Error::internal("shutdown timed out waiting for listeners"))
            }
        }
    }

    /// Whether the bus has been stopped
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The context attached to every emitted event
    pub fn root_context(&self) -> &EventContext {
        self.lifecycle.root()
    }

    /// Subscribe to failures the error handler escalated
    pub fn failures(&self) -> broadcast::Receiver<ListenerFailure> {
        self.failures.subscribe()
    }

    /// The active configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Get statistics about the event bus
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            dispatcher: self.counters.snapshot(),
            registry: self.registry.stats(),
            state: self.lifecycle.state(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.lifecycle.stop();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("state", &self.lifecycle.state())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Statistics about the event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusStats {
    /// Event and invocation counters
    pub dispatcher: DispatcherStats,

    /// Registered patterns and listeners
    pub registry: RegistryStats,

    /// Lifecycle state when the snapshot was taken
    pub state: LifecycleState,
}
