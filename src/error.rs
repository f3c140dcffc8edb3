//! Error types for the tokio-pubsub library.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::registry::ListenerId;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tokio-pubsub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A topic pattern could not be compiled
    #[error("Invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// The event service has been stopped
    #[error("Event service is closed")]
    ServiceClosed,

    /// A listener reported a failure
    #[error("Listener error: {0}")]
    Listener(String),

    /// A listener panicked while handling an event
    #[error("Listener panicked: {0}")]
    ListenerPanicked(String),

    /// The configured error handler rejected a listener failure
    #[error("Error handler failed: {0}")]
    HandlerFatal(String),

    /// The execution context was canceled
    #[error("Context canceled: {0}")]
    Cancelled(String),

    /// The execution context deadline passed
    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    /// Metadata could not be serialized or parsed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a new listener error
    pub fn listener(msg: impl Into<String>) -> Self {
        Error::Listener(msg.into())
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates the service is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ServiceClosed)
    }

    /// Check if this error came from a context being canceled or timing out
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled(_) | Error::DeadlineExceeded)
    }
}

/// A listener failure together with where it happened.
///
/// This is what the configured error handler receives.
#[derive(Debug, Clone)]
pub struct ListenerError {
    /// The underlying error returned (or panic raised) by the listener
    pub error: Error,

    /// Registration that failed
    pub listener_id: ListenerId,

    /// Pattern the listener was registered under
    pub pattern: String,

    /// Topic of the event being handled
    pub topic: String,

    /// Id of the event being handled
    pub event_id: Option<Uuid>,

    /// When the failure was observed
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ListenerError {
    pub(crate) fn new(
        error: Error,
        listener_id: ListenerId,
        pattern: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            error,
            listener_id,
            pattern: pattern.into(),
            topic: topic.into(),
            event_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub(crate) fn with_event_id(mut self, id: Option<Uuid>) -> Self {
        self.event_id = id;
        self
    }

    /// Whether the failure was a panic rather than a returned error
    pub fn is_panic(&self) -> bool {
        matches!(self.error, Error::ListenerPanicked(_))
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [listener: {}] [pattern: {}] [topic: {}]",
            self.error, self.listener_id, self.pattern, self.topic
        )?;
        if let Some(id) = &self.event_id {
            write!(f, " [event_id: {}]", id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
