//! Core event traits and types.
//!
//! The bus only needs three things from an event: its topic, its payload
//! and a slot where the bus can attach its root [`EventContext`] before the
//! event is queued. Anything implementing [`Event`] can be emitted;
//! [`BasicEvent`] covers the common case.

use std::any::Any;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::EventContext;

pub mod basic;
pub mod metadata;

pub use basic::BasicEvent;
pub use metadata::EventMetadata;

/// Upcast helper so `dyn Event` can be downcast to its concrete type.
pub trait AsAny: Any {
    /// View `self` as [`Any`]
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Core trait that all emitted events implement.
///
/// # Example
///
/// ```rust
/// use tokio_pubsub::{Event, EventContext};
///
/// #[derive(Debug)]
/// struct UserCreated {
///     user_id: u64,
///     context: Option<EventContext>,
/// }
///
/// impl Event for UserCreated {
///     fn topic(&self) -> &str {
///         "users.created"
///     }
///
///     fn context(&self) -> Option<&EventContext> {
///         self.context.as_ref()
///     }
///
///     fn set_context(&mut self, context: EventContext) {
///         self.context = Some(context);
///     }
/// }
/// ```
pub trait Event: AsAny + Send + Sync + Debug + 'static {
    /// The topic listeners match their patterns against
    fn topic(&self) -> &str;

    /// Opaque payload carried by the event
    fn payload(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }

    /// Tracking metadata, if the event carries any
    fn metadata(&self) -> Option<&EventMetadata> {
        None
    }

    /// Creation time, taken from the metadata when present
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata().map(|m| m.created_at)
    }

    /// Unique id, taken from the metadata when present
    fn event_id(&self) -> Option<Uuid> {
        self.metadata().map(|m| m.event_id)
    }

    /// The execution context attached by the bus on emit
    fn context(&self) -> Option<&EventContext>;

    /// Attach an execution context, replacing any previous one.
    ///
    /// The bus calls this on every emit.
    fn set_context(&mut self, context: EventContext);

    /// Builder-style variant of [`set_context`](Event::set_context)
    fn with_context(mut self, context: EventContext) -> Self
    where
        Self: Sized,
    {
        self.set_context(context);
        self
    }
}

impl dyn Event {
    /// Check whether the event is of concrete type `T`
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Try to downcast to a concrete event type
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Try to view the payload as a specific type
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload().and_then(|p| p.downcast_ref::<T>())
    }

    /// Whether the attached context is canceled (false if none is attached)
    pub fn is_cancelled(&self) -> bool {
        self.context().map(EventContext::is_cancelled).unwrap_or(false)
    }
}
