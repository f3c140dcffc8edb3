//! Listener traits and implementations.

use crate::{Event, Result};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Trait for listeners that react to emitted events.
///
/// A listener is invoked once per matching event, on its own task.
/// Returning `Err` hands the failure to the bus's error handler.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Process an event
    async fn on_event(&self, event: Arc<dyn Event>) -> Result<()>;

    /// Get the listener name for debugging
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A function-based listener using closures.
pub struct FunctionListener<F, Fut>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    function: F,
    name: String,
}

impl<F, Fut> FunctionListener<F, Fut>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Create a new function listener
    pub fn new(function: F) -> Self {
        Self::with_name(function, "FunctionListener")
    }

    /// Create a new function listener with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<F, Fut> Listener for FunctionListener<F, Fut>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_event(&self, event: Arc<dyn Event>) -> Result<()> {
        (self.function)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F, Fut> fmt::Debug for FunctionListener<F, Fut>
where
    F: Fn(Arc<dyn Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionListener").field("name", &self.name).finish()
    }
}

/// A listener that only forwards events accepted by a predicate.
///
/// Rejected events count as handled successfully.
pub struct FilteredListener<L: Listener> {
    inner: L,
    filter: Box<dyn Fn(&dyn Event) -> bool + Send + Sync>,
}

impl<L: Listener> FilteredListener<L> {
    /// Create a new filtered listener
    pub fn new<F>(inner: L, filter: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            filter: Box::new(filter),
        }
    }
}

impl<L: Listener> fmt::Debug for FilteredListener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredListener")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<L: Listener> Listener for FilteredListener<L> {
    async fn on_event(&self, event: Arc<dyn Event>) -> Result<()> {
        if (self.filter)(event.as_ref()) {
            self.inner.on_event(event).await
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicEvent, Error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_function_listener() {
        let listener = FunctionListener::with_name(
            |event: Arc<dyn Event>| async move {
                match event.payload_as::<i32>() {
                    Some(42) => Ok(()),
                    _ => Err(Error::listener("unexpected payload")),
                }
            },
            "answer-checker",
        );
        assert_eq!(listener.name(), "answer-checker");

        let good: Arc<dyn Event> = Arc::new(BasicEvent::new("q").with_payload(42i32));
        let bad: Arc<dyn Event> = Arc::new(BasicEvent::new("q").with_payload(7i32));
        assert!(listener.on_event(good).await.is_ok());
        assert_eq!(
            listener.on_event(bad).await,
            Err(Error::listener("unexpected payload"))
        );
    }

    #[tokio::test]
    async fn test_filtered_listener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let base = FunctionListener::new(move |_event: Arc<dyn Event>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let filtered = FilteredListener::new(base, |event: &dyn Event| {
            event.payload_as::<u32>().map(|v| *v > 10).unwrap_or(false)
        });

        let big: Arc<dyn Event> = Arc::new(BasicEvent::new("n").with_payload(20u32));
        let small: Arc<dyn Event> = Arc::new(BasicEvent::new("n").with_payload(5u32));
        assert!(filtered.on_event(big).await.is_ok());
        assert!(filtered.on_event(small).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(filtered.name(), "FunctionListener");
    }
}
