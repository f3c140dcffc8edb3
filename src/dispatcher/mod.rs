//! Event dispatcher for routing events to listeners.
//!
//! The dispatcher drains the bus queue on one background task and fans each
//! event out to the listeners whose pattern matches its topic, one task per
//! listener.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::Event;

pub(crate) mod channel;
pub(crate) mod worker;

pub(crate) use channel::DispatchLoop;
pub(crate) use worker::InvocationPool;
pub use worker::ListenerFailure;

/// An event waiting in the queue
pub(crate) struct QueuedEvent {
    pub(crate) event: Arc<dyn Event>,
    pub(crate) ack: Option<oneshot::Sender<DispatchReport>>,
}

impl QueuedEvent {
    pub(crate) fn new(event: Arc<dyn Event>, ack: Option<oneshot::Sender<DispatchReport>>) -> Self {
        Self { event, ack }
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("topic", &self.event.topic())
            .field("awaited", &self.ack.is_some())
            .finish()
    }
}

/// Outcome of delivering one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners the event was handed to
    pub invoked: usize,

    /// Of those, how many returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    /// Whether every invoked listener succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Statistics for the event dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Events accepted by `emit`
    pub events_emitted: u64,

    /// Events taken off the queue and fanned out
    pub events_dispatched: u64,

    /// Listener invocations started
    pub listener_invocations: u64,

    /// Invocations that returned an error or panicked
    pub listener_failures: u64,

    /// Failures the error handler escalated
    pub handler_escalations: u64,
}

/// Shared counters behind [`DispatcherStats`]
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    pub(crate) emitted: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) invocations: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) escalations: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            events_emitted: self.emitted.load(Ordering::Relaxed),
            events_dispatched: self.dispatched.load(Ordering::Relaxed),
            listener_invocations: self.invocations.load(Ordering::Relaxed),
            listener_failures: self.failures.load(Ordering::Relaxed),
            handler_escalations: self.escalations.load(Ordering::Relaxed),
        }
    }
}
