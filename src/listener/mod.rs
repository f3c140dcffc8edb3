//! Listeners and their registration handles.
//!
//! A [`Listener`] reacts to events whose topic matches the pattern it was
//! registered under. Registration returns a [`Destroyer`] that removes it
//! again.

pub mod destroyer;
pub mod handler;

pub use destroyer::Destroyer;
pub use handler::{FilteredListener, FunctionListener, Listener};
