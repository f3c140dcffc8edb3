//! Queue-draining dispatch loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use super::{DispatchCounters, DispatchReport, InvocationPool, QueuedEvent};
use crate::bus::config::DrainPolicy;
use crate::context::EventContext;
use crate::registry::ListenerRegistry;

/// Takes events off the bus queue in FIFO order and fans each one out.
///
/// Runs until the queue closes. With [`DrainPolicy::Discard`] it also exits
/// as soon as the root context is canceled, dropping whatever is still
/// queued. That includes an event parked on the concurrency cap: its
/// remaining listeners are skipped and its emitter sees `ServiceClosed`.
pub(crate) struct DispatchLoop {
    receiver: mpsc::UnboundedReceiver<QueuedEvent>,
    registry: Arc<dyn ListenerRegistry>,
    pool: InvocationPool,
    tracker: TaskTracker,
    root: EventContext,
    drain_policy: DrainPolicy,
    counters: Arc<DispatchCounters>,
}

impl DispatchLoop {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<QueuedEvent>,
        registry: Arc<dyn ListenerRegistry>,
        pool: InvocationPool,
        tracker: TaskTracker,
        root: EventContext,
        drain_policy: DrainPolicy,
        counters: Arc<DispatchCounters>,
    ) -> Self {
        Self {
            receiver,
            registry,
            pool,
            tracker,
            root,
            drain_policy,
            counters,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(drain_policy = ?self.drain_policy, "Event dispatch loop started");

        loop {
            let next = match self.drain_policy {
                DrainPolicy::Drain => self.receiver.recv().await,
                DrainPolicy::Discard => {
                    tokio::select! {
                        biased;
                        _ = self.root.cancelled() => None,
                        next = self.receiver.recv() => next,
                    }
                }
            };

            let Some(queued) = next else {
                break;
            };
            if !self.dispatch(queued).await {
                break;
            }
        }

        if self.drain_policy == DrainPolicy::Discard {
            let mut dropped = 0usize;
            while self.receiver.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "Discarded queued events on stop");
            }
        }

        info!("Event dispatch loop stopped");
    }

    /// Fan one event out. Returns `false` if the bus stopped first under
    /// [`DrainPolicy::Discard`].
    async fn dispatch(&self, queued: QueuedEvent) -> bool {
        let QueuedEvent { event, ack } = queued;
        let entries = self.registry.snapshot_for(event.topic());

        trace!(
            topic = event.topic(),
            listeners = entries.len(),
            "Dispatching event"
        );

        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            let spawn = self.pool.spawn(entry, event.clone());
            let handle = match self.drain_policy {
                DrainPolicy::Drain => spawn.await,
                DrainPolicy::Discard => {
                    tokio::select! {
                        biased;
                        handle = spawn => handle,
                        _ = self.root.cancelled() => {
                            debug!(
                                topic = event.topic(),
                                spawned = handles.len(),
                                "Abandoned dispatch waiting for a listener slot"
                            );
                            return false;
                        }
                    }
                }
            };
            handles.push(handle);
        }
        DispatchCounters::bump(&self.counters.dispatched);

        if let Some(ack) = ack {
            self.tracker.spawn(async move {
                let report = collect(handles).await;
                // The emitter may have stopped waiting
                let _ = ack.send(report);
            });
        }
        true
    }
}

async fn collect(handles: Vec<JoinHandle<bool>>) -> DispatchReport {
    let mut report = DispatchReport {
        invoked: handles.len(),
        failed: 0,
    };
    for handle in handles {
        if handle.await.unwrap_or(true) {
            report.failed += 1;
        }
    }
    report
}
