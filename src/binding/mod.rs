//! Signal bindings
//!
//! Implements:
//! - Binding a map entry to a [`SignalSource`](crate::core::SignalSource)
//! - Queued propagation of signal changes into the tree
//! - [`ValueSignal`], a ready-made source

mod overlay;
mod signal;

pub use overlay::Subscription;
pub use signal::ValueSignal;

pub(crate) use overlay::{Binding, BindingQueue};
