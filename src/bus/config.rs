//! Configuration for the event bus.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::{ListenerError, Result};

/// Policy applied to every listener failure.
///
/// Returning `Ok(())` absorbs the failure. Returning `Err` escalates it
/// according to the bus's [`FailurePolicy`].
pub type ErrorHandler = Arc<dyn Fn(&ListenerError) -> Result<()> + Send + Sync>;

/// The default error handler: log the failure and carry on.
pub fn default_error_handler(err: &ListenerError) -> Result<()> {
    warn!(
        listener_id = %err.listener_id,
        pattern = %err.pattern,
        topic = %err.topic,
        error = %err.error,
        "Listener failed"
    );
    Ok(())
}

/// What to do when the error handler itself returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log it and publish it on the failure channel
    #[default]
    Report,
    /// Report it, then stop the bus
    StopBus,
}

/// What the dispatch loop does with events still queued when the bus stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Deliver them, then exit. Their context is already canceled.
    #[default]
    Drain,
    /// Drop them and exit as soon as the bus stops, even while an event is
    /// waiting on the concurrency cap
    Discard,
}

/// Configuration for the event bus
#[derive(Clone)]
pub struct EventBusConfig {
    /// Applied to every listener failure
    pub error_handler: ErrorHandler,

    /// Escalation policy for error handler failures
    pub failure_policy: FailurePolicy,

    /// Queue handling on stop
    pub drain_policy: DrainPolicy,

    /// Upper bound on concurrently running listener invocations
    /// (`None` = unbounded)
    pub max_concurrent_listeners: Option<usize>,

    /// Buffer size of the failure broadcast channel
    pub failure_channel_capacity: usize,

    /// How long `shutdown` waits for in-flight work
    pub shutdown_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            error_handler: Arc::new(default_error_handler),
            failure_policy: FailurePolicy::default(),
            drain_policy: DrainPolicy::default(),
            max_concurrent_listeners: None,
            failure_channel_capacity: 256,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for EventBusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusConfig")
            .field("failure_policy", &self.failure_policy)
            .field("drain_policy", &self.drain_policy)
            .field("max_concurrent_listeners", &self.max_concurrent_listeners)
            .field("failure_channel_capacity", &self.failure_channel_capacity)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl EventBusConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error handler
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ListenerError) -> Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Set the escalation policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the drain policy
    pub fn drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.drain_policy = policy;
        self
    }

    /// Cap concurrently running listener invocations, clamped to
    /// `1..=Semaphore::MAX_PERMITS`
    pub fn max_concurrent_listeners(mut self, limit: usize) -> Self {
        self.max_concurrent_listeners = Some(limit.clamp(1, Semaphore::MAX_PERMITS));
        self
    }

    /// Remove the concurrency cap
    pub fn unbounded(mut self) -> Self {
        self.max_concurrent_listeners = None;
        self
    }

    /// Set the failure channel capacity (minimum 1)
    pub fn failure_channel_capacity(mut self, capacity: usize) -> Self {
        self.failure_channel_capacity = capacity.max(1);
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Preset configurations for common use cases
impl EventBusConfig {
    /// Bounded fan-out sized to the machine
    pub fn high_throughput() -> Self {
        Self::default()
            .max_concurrent_listeners(num_cpus::get() * 64)
            .drain_policy(DrainPolicy::Discard)
    }

    /// Bounded fan-out with an explicit limit
    pub fn bounded(limit: usize) -> Self {
        Self::default().max_concurrent_listeners(limit)
    }

    /// Configuration for testing
    pub fn test() -> Self {
        Self::default()
            .failure_channel_capacity(64)
            .shutdown_timeout(Duration::from_secs(5))
    }
}
