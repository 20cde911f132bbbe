//! A minimal thread-safe signal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::Subscription;
use crate::core::{SignalListener, SignalSource};
use crate::feature::Value;

struct Inner {
    value: RwLock<Value>,
    listeners: Mutex<Vec<(u64, SignalListener)>>,
    next_listener: AtomicU64,
}

/// A shared mutable value that notifies subscribers when it changes.
///
/// Clones share the same value.
#[derive(Clone)]
pub struct ValueSignal {
    inner: Arc<Inner>,
}

impl ValueSignal {
    /// Create a signal holding `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is a node reference.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        assert!(!value.is_node(), "signals carry scalar values only");
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Replace the value. Subscribers are notified only if it changed.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        assert!(!value.is_node(), "signals carry scalar values only");
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return false;
            }
            *current = value;
        }

        // Snapshot so listeners may subscribe or unsubscribe while running.
        let listeners: Vec<SignalListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
        true
    }

    /// Number of active subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl SignalSource for ValueSignal {
    fn peek(&self) -> Value {
        self.get()
    }

    fn subscribe(&self, listener: SignalListener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.lock().retain(|(registered, _)| *registered != id);
            }
        })
    }
}

impl fmt::Debug for ValueSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSignal")
            .field("value", &*self.inner.value.read())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
