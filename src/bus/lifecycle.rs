//! Bus lifecycle state and the queue it guards.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use crate::context::{EventContext, SERVICE_CLOSED_CAUSE};
use crate::dispatcher::QueuedEvent;
use crate::{Error, Result};

/// Lifecycle of an [`EventBus`](crate::EventBus).
///
/// Transitions only move forward: `Created → Running → Closed`, or straight
/// from `Created` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, queue open, dispatch loop not running
    Created,
    /// Dispatch loop active
    Running,
    /// Queue closed, root context canceled
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Inner {
    state: LifecycleState,
    sender: Option<mpsc::UnboundedSender<QueuedEvent>>,
    receiver: Option<mpsc::UnboundedReceiver<QueuedEvent>>,
}

/// Owns the event queue and the closed flag.
///
/// Enqueue, start and stop all take the same lock, so no event can be
/// enqueued once `Closed` is observable.
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    root: EventContext,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Created,
                sender: Some(sender),
                receiver: Some(receiver),
            }),
            root: EventContext::new(),
        }
    }

    pub(crate) fn root(&self) -> &EventContext {
        &self.root
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }

    pub(crate) fn enqueue(&self, queued: QueuedEvent) -> Result<()> {
        let inner = self.inner.lock();
        if inner.state == LifecycleState::Closed {
            return Err(Error::ServiceClosed);
        }
        let sender = inner.sender.as_ref().ok_or(Error::ServiceClosed)?;
        sender.send(queued).map_err(|_| Error::ServiceClosed)
    }

    /// Move to `Running`.
    ///
    /// Yields the queue receiver on the first call only; later calls get
    /// `None`.
    pub(crate) fn begin_running(&self) -> Result<Option<mpsc::UnboundedReceiver<QueuedEvent>>> {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Closed => Err(Error::ServiceClosed),
            LifecycleState::Running => Ok(None),
            LifecycleState::Created => {
                inner.state = LifecycleState::Running;
                Ok(inner.receiver.take())
            }
        }
    }

    /// Close the queue and cancel the root context.
    ///
    /// Returns `false` if already closed.
    pub(crate) fn stop(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == LifecycleState::Closed {
                return false;
            }
            inner.state = LifecycleState::Closed;
            inner.sender = None;
            // Never started: nothing will ever read what was queued
            inner.receiver = None;
        }

        self.root.cancel(SERVICE_CLOSED_CAUSE);
        info!("Event bus closed");
        true
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
