//! Traits implemented by collaborators outside the tree.

use std::sync::Arc;

use crate::binding::Subscription;
use crate::feature::Value;

/// Callback a [`SignalSource`] invokes after its value changed.
pub type SignalListener = Arc<dyn Fn() + Send + Sync>;

/// An externally managed reactive value that can drive a map entry.
///
/// The tree never writes to a source. It reads the current value with
/// [`peek`](SignalSource::peek) and learns about changes through the listener
/// passed to [`subscribe`](SignalSource::subscribe). Listeners may be invoked
/// from any thread and MUST NOT be called while the source holds a lock that
/// `peek` needs.
///
/// # Example
///
/// ```
/// use state_tree::prelude::*;
///
/// let signal = ValueSignal::new("draft");
/// assert_eq!(signal.peek(), Value::from("draft"));
/// ```
pub trait SignalSource: Send + Sync {
    /// Current value, without registering any dependency.
    fn peek(&self) -> Value;

    /// Register `listener` to be called after every value change.
    ///
    /// Dropping the returned [`Subscription`] unregisters it.
    fn subscribe(&self, listener: SignalListener) -> Subscription;
}
