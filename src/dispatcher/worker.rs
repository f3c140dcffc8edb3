//! Listener invocation: one task per matched listener.
//!
//! Each invocation runs on its own task so a slow listener never holds up
//! the dispatch loop or its siblings. When a concurrency cap is configured
//! the dispatch loop waits for a permit before spawning.
//!
//! Panics are caught with `catch_unwind` and routed through the error
//! handler like any returned error. `AssertUnwindSafe` is used, so a
//! listener that panics while holding a lock may leave shared state
//! inconsistent.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, trace};

use super::DispatchCounters;
use crate::bus::config::{ErrorHandler, FailurePolicy};
use crate::bus::lifecycle::Lifecycle;
use crate::registry::ListenerEntry;
use crate::{Error, Event, ListenerError};

/// A listener failure the error handler refused to absorb.
///
/// Published on the bus failure channel, see
/// [`EventBus::failures`](crate::EventBus::failures).
#[derive(Debug, Clone)]
pub struct ListenerFailure {
    /// The original listener failure
    pub failure: ListenerError,

    /// What the error handler returned, as [`Error::HandlerFatal`]
    pub handler_error: Error,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (while handling: {})", self.handler_error, self.failure)
    }
}

/// Spawns and supervises listener invocations
#[derive(Clone)]
pub(crate) struct InvocationPool {
    limiter: Option<Arc<Semaphore>>,
    error_handler: ErrorHandler,
    failure_policy: FailurePolicy,
    failures: broadcast::Sender<ListenerFailure>,
    counters: Arc<DispatchCounters>,
    tracker: TaskTracker,
    lifecycle: Weak<Lifecycle>,
}

impl InvocationPool {
    pub(crate) fn new(
        max_concurrent: Option<usize>,
        error_handler: ErrorHandler,
        failure_policy: FailurePolicy,
        failures: broadcast::Sender<ListenerFailure>,
        counters: Arc<DispatchCounters>,
        tracker: TaskTracker,
        lifecycle: Weak<Lifecycle>,
    ) -> Self {
        Self {
            limiter: max_concurrent
                .map(|n| Arc::new(Semaphore::new(n.clamp(1, Semaphore::MAX_PERMITS)))),
            error_handler,
            failure_policy,
            failures,
            counters,
            tracker,
            lifecycle,
        }
    }

    /// Spawn one invocation.
    ///
    /// Waits for a permit first when the pool is bounded. The handle
    /// resolves to `true` if the listener failed.
    pub(crate) async fn spawn(&self, entry: ListenerEntry, event: Arc<dyn Event>) -> JoinHandle<bool> {
        let permit = match &self.limiter {
            // The semaphore is never closed
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let pool = self.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            pool.invoke(entry, event).await
        })
    }

    async fn invoke(&self, entry: ListenerEntry, event: Arc<dyn Event>) -> bool {
        DispatchCounters::bump(&self.counters.invocations);
        trace!(
            listener_id = %entry.id,
            listener = entry.listener.name(),
            topic = event.topic(),
            "Invoking listener"
        );

        let fut = entry.listener.on_event(event.clone());
        let result = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::ListenerPanicked(panic_message(&*panic))),
        };

        let Err(error) = result else {
            return false;
        };

        DispatchCounters::bump(&self.counters.failures);
        let failure = ListenerError::new(error, entry.id, &*entry.pattern, event.topic())
            .with_event_id(event.event_id());

        let handled = std::panic::catch_unwind(AssertUnwindSafe(|| (self.error_handler)(&failure)))
            .unwrap_or_else(|panic| Err(Error::internal(panic_message(&*panic))));

        if let Err(handler_error) = handled {
            self.escalate(failure, handler_error);
        }
        true
    }

    fn escalate(&self, failure: ListenerError, handler_error: Error) {
        DispatchCounters::bump(&self.counters.escalations);
        error!(
            listener_id = %failure.listener_id,
            pattern = %failure.pattern,
            topic = %failure.topic,
            error = %failure.error,
            handler_error = %handler_error,
            "Error handler rejected listener failure"
        );

        let report = ListenerFailure {
            failure,
            handler_error: Error::HandlerFatal(handler_error.to_string()),
        };
        // No receivers is fine
        let _ = self.failures.send(report);

        if self.failure_policy == FailurePolicy::StopBus {
            if let Some(lifecycle) = self.lifecycle.upgrade() {
                lifecycle.stop();
            }
        }
    }
}

impl fmt::Debug for InvocationPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationPool")
            .field(
                "available_permits",
                &self.limiter.as_ref().map(|l| l.available_permits()),
            )
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::config::default_error_handler;
    use crate::listener::{FunctionListener, Listener};
    use crate::registry::ListenerId;
    use crate::{BasicEvent, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Exploding;

    #[async_trait]
    impl Listener for Exploding {
        async fn on_event(&self, _event: Arc<dyn Event>) -> Result<()> {
            panic!("listener exploded")
        }
    }

    fn entry(listener: impl Listener) -> ListenerEntry {
        ListenerEntry {
            id: ListenerId::new(),
            pattern: Arc::from("jobs.*"),
            listener: Arc::new(listener),
        }
    }

    fn event() -> Arc<dyn Event> {
        Arc::new(BasicEvent::new("jobs.run"))
    }

    fn pool(
        limit: Option<usize>,
        handler: ErrorHandler,
        policy: FailurePolicy,
        lifecycle: &Arc<Lifecycle>,
    ) -> (InvocationPool, broadcast::Receiver<ListenerFailure>) {
        let (tx, rx) = broadcast::channel(16);
        let pool = InvocationPool::new(
            limit,
            handler,
            policy,
            tx,
            Arc::new(DispatchCounters::default()),
            TaskTracker::new(),
            Arc::downgrade(lifecycle),
        );
        (pool, rx)
    }

    #[tokio::test]
    async fn test_success_and_failure() {
        let lifecycle = Arc::new(Lifecycle::new());
        let (pool, _rx) = pool(None, Arc::new(default_error_handler), FailurePolicy::Report, &lifecycle);

        let ok = entry(FunctionListener::new(|_e: Arc<dyn Event>| async { Ok(()) }));
        let bad = entry(FunctionListener::new(|_e: Arc<dyn Event>| async {
            Err(Error::listener("nope"))
        }));

        assert!(!pool.spawn(ok, event()).await.await.unwrap());
        assert!(pool.spawn(bad, event()).await.await.unwrap());

        let stats = pool.counters.snapshot();
        assert_eq!(stats.listener_invocations, 2);
        assert_eq!(stats.listener_failures, 1);
        assert_eq!(stats.handler_escalations, 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let lifecycle = Arc::new(Lifecycle::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: ErrorHandler = Arc::new(move |err: &ListenerError| -> Result<()> {
            sink.lock().push(err.clone());
            Ok(())
        });
        let (pool, _rx) = pool(None, handler, FailurePolicy::Report, &lifecycle);

        let failed = pool.spawn(entry(Exploding), event()).await.await.unwrap();
        assert!(failed);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_panic());
        assert_eq!(
            seen[0].error,
            Error::ListenerPanicked("listener exploded".to_string())
        );
        assert_eq!(seen[0].topic, "jobs.run");
        assert_eq!(seen[0].pattern, "jobs.*");
        assert!(seen[0].event_id.is_some());
    }

    #[tokio::test]
    async fn test_handler_error_is_reported_not_fatal() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handler: ErrorHandler =
            Arc::new(|err: &ListenerError| -> Result<()> { Err(err.error.clone()) });
        let (pool, mut rx) = pool(None, handler, FailurePolicy::Report, &lifecycle);

        let bad = entry(FunctionListener::new(|_e: Arc<dyn Event>| async {
            Err(Error::listener("bad input"))
        }));
        pool.spawn(bad, event()).await.await.unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(report.failure.error, Error::listener("bad input"));
        assert!(matches!(report.handler_error, Error::HandlerFatal(_)));
        assert!(!lifecycle.is_closed());
        assert_eq!(pool.counters.snapshot().handler_escalations, 1);
    }

    #[tokio::test]
    async fn test_stop_bus_policy_closes_lifecycle() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handler: ErrorHandler =
            Arc::new(|_err: &ListenerError| -> Result<()> { panic!("handler exploded") });
        let (pool, mut rx) = pool(None, handler, FailurePolicy::StopBus, &lifecycle);

        let bad = entry(FunctionListener::new(|_e: Arc<dyn Event>| async {
            Err(Error::listener("bad"))
        }));
        pool.spawn(bad, event()).await.await.unwrap();

        let report = rx.recv().await.unwrap();
        assert!(report.handler_error.to_string().contains("handler exploded"));
        assert!(lifecycle.is_closed());
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let lifecycle = Arc::new(Lifecycle::new());
        let (pool, _rx) = pool(Some(2), Arc::new(default_error_handler), FailurePolicy::Report, &lifecycle);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            let listener = FunctionListener::new(move |_e: Arc<dyn Event>| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            handles.push(pool.spawn(entry(listener), event()).await);
        }

        for handle in handles {
            assert!(!handle.await.unwrap());
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_cap_is_clamped() {
        let lifecycle = Arc::new(Lifecycle::new());
        let (pool, _rx) = pool(Some(usize::MAX), Arc::new(default_error_handler), FailurePolicy::Report, &lifecycle);

        let ok = entry(FunctionListener::new(|_e: Arc<dyn Event>| async { Ok(()) }));
        let handle = pool.spawn(ok, event()).await;
        assert!(!handle.await.unwrap());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
