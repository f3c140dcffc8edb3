//! Execution context carried by emitted events.
//!
//! Every [`EventBus`](crate::EventBus) owns one root [`EventContext`]. It is
//! attached to each event on emit and canceled once, with a cause, when the
//! bus stops. Listeners that run long should watch it and bail out early.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Cause recorded when a bus cancels its root context.
pub const SERVICE_CLOSED_CAUSE: &str = "event service closed";

/// A cancellation and deadline bearing signal.
///
/// Cloning is cheap and every clone observes the same cancellation.
#[derive(Debug, Clone)]
pub struct EventContext {
    token: CancellationToken,
    cause: Arc<OnceLock<String>>,
    deadline: Option<Instant>,
    parent: Option<Box<EventContext>>,
}

impl EventContext {
    /// Create a fresh root context that is only canceled explicitly
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Arc::new(OnceLock::new()),
            deadline: None,
            parent: None,
        }
    }

    /// Derive a context that is canceled whenever `self` is, and can be
    /// canceled on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(OnceLock::new()),
            deadline: self.deadline,
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Derive a child context that expires at `deadline`.
    ///
    /// A parent deadline that is earlier wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        child
    }

    /// Derive a child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and all contexts derived from it.
    ///
    /// Only the first cause is kept. Returns `false` if the context was
    /// already canceled.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let _ = self.cause.set(cause.into());
        self.token.cancel();
        true
    }

    /// Whether the context was canceled or its deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    /// Completes once the context is canceled or its deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The reason this context (or an ancestor) was canceled
    pub fn cause(&self) -> Option<String> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.cause())
    }

    /// The deadline of this context, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the context is live, otherwise the error a listener
    /// should report when giving up.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            let cause = self.cause().unwrap_or_else(|| "context canceled".to_string());
            Some(Error::Cancelled(cause))
        } else if self.deadline_passed() {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Convenience for listeners: `Err` once the context is done
    pub fn check(&self) -> crate::Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}
