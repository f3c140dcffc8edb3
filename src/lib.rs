//! # tokio-pubsub
//!
//! An in-process, topic-based publish/subscribe event bus built on Tokio.
//!
//! ## Features
//!
//! - **Glob topic patterns** (`users.*`, `*`, `{orders,refunds}.*`)
//! - **Concurrent fan-out** with one task per matched listener
//! - **Destroyer handles** to remove exactly one registration
//! - **Cancellation context** attached to every event, canceled on stop
//! - **Panic isolation** and a pluggable error handler
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_pubsub::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = EventBus::builder().build_and_start()?;
//!
//!     let destroyer = bus.listen_fn("users.*", |event: Arc<dyn Event>| async move {
//!         if let Some(email) = event.payload_as::<String>() {
//!             println!("New user registered: {email}");
//!         }
//!         Ok(())
//!     })?;
//!
//!     bus.emit(BasicEvent::new("users.created").with_payload("user@example.com".to_string()))?;
//!
//!     destroyer.destroy();
//!     bus.shutdown().await
//! }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Event trait, metadata and the general-purpose event type
pub mod event;

/// Error types and result aliases
pub mod error;

/// Cancellation context carried by events
pub mod context;

/// Topic pattern matching
pub mod pattern;

/// Listener registry for pattern-to-listener mapping
pub mod registry;

/// Listener traits and removal handles
pub mod listener;

/// Event dispatcher for routing events
pub mod dispatcher;

/// The main event bus implementation
pub mod bus;

// Re-export commonly used types
pub use bus::{
    DrainPolicy, ErrorHandler, EventBus, EventBusBuilder, EventBusConfig, EventBusStats,
    FailurePolicy, LifecycleState,
};
pub use context::EventContext;
pub use dispatcher::{DispatchReport, DispatcherStats, ListenerFailure};
pub use error::{Error, ListenerError, Result};
pub use event::{BasicEvent, Event, EventMetadata};
pub use listener::{Destroyer, FilteredListener, FunctionListener, Listener};
pub use pattern::TopicPattern;
pub use registry::{ListenerId, ListenerRegistry};

/// Prelude module for convenient imports
///
/// # Example
/// ```rust
/// use tokio_pubsub::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::{EventBus, EventBusBuilder, EventBusConfig};
    pub use crate::context::EventContext;
    pub use crate::error::{Error, Result};
    pub use crate::event::{BasicEvent, Event};
    pub use crate::listener::{Destroyer, Listener};
}
