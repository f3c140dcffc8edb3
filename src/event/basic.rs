//! A general purpose event carrying a topic and a type-erased payload.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::EventContext;
use crate::event::{Event, EventMetadata};

/// Ready-made [`Event`] implementation.
///
/// The payload is stored behind an `Arc`, so cloning a `BasicEvent` is cheap
/// and emitting the same event twice shares one payload.
#[derive(Clone)]
pub struct BasicEvent {
    topic: String,

    /// The type-erased payload
    payload: Option<Arc<dyn Any + Send + Sync>>,

    /// Human-readable payload type name for debugging
    payload_type: Option<&'static str>,

    metadata: EventMetadata,

    context: Option<EventContext>,
}

impl BasicEvent {
    /// Create an event without a payload
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: None,
            payload_type: None,
            metadata: EventMetadata::new(),
            context: None,
        }
    }

    /// Attach a payload
    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self.payload_type = Some(std::any::type_name::<T>());
        self
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the event source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Try to view the payload as a specific type
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Type name of the payload, if any
    pub fn payload_type(&self) -> Option<&'static str> {
        self.payload_type
    }

    /// Create a follow-up event caused by this one.
    ///
    /// The new event gets fresh metadata linked to this event's id.
    pub fn chain(&self, topic: impl Into<String>) -> Self {
        Self::new(topic).with_metadata(EventMetadata::caused_by(&self.metadata))
    }
}

impl Event for BasicEvent {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn payload(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.payload.as_deref()
    }

    fn metadata(&self) -> Option<&EventMetadata> {
        Some(&self.metadata)
    }

    fn context(&self) -> Option<&EventContext> {
        self.context.as_ref()
    }

    fn set_context(&mut self, context: EventContext) {
        self.context = Some(context);
    }
}

impl fmt::Debug for BasicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicEvent")
            .field("topic", &self.topic)
            .field("event_id", &self.metadata.event_id)
            .field("payload_type", &self.payload_type)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}
