//! Binding overlay
//!
//! A bound map entry stores a [`Binding`] in place of a plain value. The
//! diff protocol only ever sees the binding's applied value, so bound keys
//! are diffed exactly like plain ones. Source notifications are queued and
//! applied through the internal write path, which is the only path allowed
//! to write a bound key.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{BindingError, SignalSource};
use crate::feature::{FeatureId, MapEntry, Value};
use crate::tree::{NodeRef, StateTree, WriteOrigin};

/// Handle to a signal listener registration. Dropping it unregisters.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Subscription that runs `dispose` when dropped.
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Subscription with nothing to release.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    /// Unregister now.
    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// A map entry driven by a signal.
pub(crate) struct Binding {
    source: Arc<dyn SignalSource>,
    _subscription: Subscription,
    applied: Option<Value>,
}

impl Binding {
    fn new(source: Arc<dyn SignalSource>, subscription: Subscription, applied: Option<Value>) -> Self {
        Self {
            source,
            _subscription: subscription,
            applied,
        }
    }

    /// Value the diff protocol has seen.
    pub(crate) fn applied(&self) -> Option<&Value> {
        self.applied.as_ref()
    }

    pub(crate) fn set_applied(&mut self, value: Option<Value>) {
        self.applied = value;
    }

    /// Current value of the source.
    pub(crate) fn current(&self) -> Value {
        self.source.peek()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

/// Identifies one bound entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
    node: NodeRef,
    feature: FeatureId,
    key: String,
}

/// Bound entries whose source reported a change since the last drain.
///
/// Shared with signal listeners, which may fire on any thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct BindingQueue {
    pending: Arc<Mutex<IndexSet<BindingKey>>>,
}

impl BindingQueue {
    fn push(&self, key: BindingKey) {
        self.pending.lock().insert(key);
    }

    fn drain(&self) -> Vec<BindingKey> {
        self.pending.lock().drain(..).collect()
    }
}

impl StateTree {
    /// Apply queued signal changes to attached nodes. Returns the number of
    /// bound entries refreshed.
    ///
    /// Called automatically at the start of every collection.
    pub fn apply_signal_updates(&mut self) -> usize {
        let mut applied = 0;
        for BindingKey { node, feature, key } in self.bindings.drain() {
            if !self.try_data(node).is_some_and(|data| data.attached) {
                continue;
            }
            if self.map_state(node, feature).is_some_and(|map| map.is_bound(&key)) {
                self.apply_binding(node, feature, &key);
                applied += 1;
            }
        }
        applied
    }

    pub(crate) fn bind_key(
        &mut self,
        node: NodeRef,
        feature: FeatureId,
        key: &str,
        source: Arc<dyn SignalSource>,
    ) -> Result<(), BindingError> {
        let name = self.registry.descriptor(feature).feature().name();
        let map = self.map_state_mut(node, feature);
        if map.is_bound(key) {
            return Err(BindingError::AlreadyBound {
                feature: name,
                key: key.to_owned(),
            });
        }
        let applied = map.stored(key).cloned();
        assert!(
            !applied.as_ref().is_some_and(Value::is_node),
            "cannot bind '{key}' in {name} while it holds a child node"
        );

        let queue = self.bindings.clone();
        let binding_key = BindingKey {
            node,
            feature,
            key: key.to_owned(),
        };
        let subscription = source.subscribe(Arc::new(move || queue.push(binding_key.clone())));
        self.map_state_mut(node, feature)
            .insert_entry(key, MapEntry::Bound(Binding::new(source, subscription, applied)));
        debug!(feature = name, key, "bound map entry");

        if self.data(node).attached {
            self.apply_binding(node, feature, key);
        }
        Ok(())
    }

    pub(crate) fn unbind_key(&mut self, node: NodeRef, feature: FeatureId, key: &str) -> bool {
        let map = self.map_state_mut(node, feature);
        let applied = match map.entry(key) {
            Some(MapEntry::Bound(binding)) => binding.applied().cloned(),
            _ => return false,
        };
        match applied {
            Some(value) => map.insert_entry(key, MapEntry::Plain(value)),
            None => {
                map.remove_entry(key);
            }
        }
        true
    }

    /// Re-read every bound entry of a node that just got attached.
    pub(crate) fn resync_bindings(&mut self, node: NodeRef) {
        let bound: Vec<(FeatureId, String)> = self
            .data(node)
            .slots
            .iter()
            .filter_map(|slot| Some((slot.id, slot.state.as_ref()?.as_map()?.bound_keys())))
            .flat_map(|(id, keys)| keys.into_iter().map(move |key| (id, key)))
            .collect();
        for (feature, key) in bound {
            self.apply_binding(node, feature, &key);
        }
    }

    fn apply_binding(&mut self, node: NodeRef, feature: FeatureId, key: &str) {
        let Some(value) = self.map_state(node, feature).and_then(|map| match map.entry(key) {
            Some(MapEntry::Bound(binding)) => Some(binding.current()),
            _ => None,
        }) else {
            return;
        };
        assert!(!value.is_node(), "signal bound to '{key}' produced a node value");
        self.store_map(node, feature, key, Some(value), WriteOrigin::Binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ValueSignal;
    use crate::core::UpdateError;
    use crate::feature::features;
    use crate::sync::{ChangeKind, WireValue};
    use crate::tree::tests_support::*;

    fn signal(value: impl Into<Value>) -> (ValueSignal, Arc<dyn SignalSource>) {
        let signal = ValueSignal::new(value);
        let source: Arc<dyn SignalSource> = Arc::new(signal.clone());
        (signal, source)
    }

    #[test]
    fn test_subscription_disposes_on_drop() {
        let flag = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&flag);
        drop(Subscription::new(move || *seen.lock() = true));
        assert!(*flag.lock());
        Subscription::noop().dispose();
    }

    #[test]
    fn test_bind_applies_immediately_when_attached() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (_signal, source) = signal("draft");

        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.bind("value", source).unwrap();
        assert!(props.is_bound("value"));
        assert_eq!(props.get("value"), Some(Value::from("draft")));
    }

    #[test]
    fn test_direct_writes_to_bound_key_are_refused() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (_signal, source) = signal("draft");
        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.bind("value", source).unwrap();

        assert!(matches!(
            props.put("value", "other"),
            Err(UpdateError::BindingActive { feature: "ElementPropertyMap", .. })
        ));
        assert!(matches!(
            props.remove("value"),
            Err(UpdateError::BindingActive { .. })
        ));
        assert_eq!(props.get("value"), Some(Value::from("draft")));
    }

    #[test]
    fn test_second_bind_is_rejected_and_keeps_first() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (first, first_source) = signal("one");
        let (second, second_source) = signal("two");

        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.bind("value", first_source).unwrap();
        assert_eq!(
            props.bind("value", second_source),
            Err(BindingError::AlreadyBound {
                feature: "ElementPropertyMap",
                key: "value".into()
            })
        );
        assert_eq!(first.listener_count(), 1);
        assert_eq!(second.listener_count(), 0);

        first.set("uno");
        tree.apply_signal_updates();
        assert_eq!(
            tree.map(node, features::ELEMENT_PROPERTIES).get("value"),
            Some(Value::from("uno"))
        );
    }

    #[test]
    fn test_signal_changes_flow_into_the_diff() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (signal, source) = signal("a");
        tree.map_mut(node, features::ELEMENT_PROPERTIES)
            .bind("value", source)
            .unwrap();
        let _ = tree.take_changes();

        signal.set("b");
        let changes = tree.take_changes();
        let puts: Vec<_> = changes
            .iter()
            .filter_map(|change| match &change.kind {
                ChangeKind::MapPut { key, value, .. } => Some((key.as_str(), value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(puts, vec![("value", WireValue::String("b".into()))]);
    }

    #[test]
    fn test_detached_binding_resyncs_on_attach() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        let (signal, source) = signal("initial");
        tree.map_mut(node, features::ELEMENT_PROPERTIES)
            .bind("value", source)
            .unwrap();
        // Nothing applied while detached.
        assert!(tree.map(node, features::ELEMENT_PROPERTIES).storage().is_some_and(|m| m.stored("value").is_none()));

        signal.set("changed");
        assert_eq!(tree.apply_signal_updates(), 0);

        append_root(&mut tree, node);
        let map = tree.map(node, features::ELEMENT_PROPERTIES).storage().unwrap();
        assert_eq!(map.stored("value"), Some(&Value::from("changed")));
    }

    #[test]
    fn test_unbind_keeps_last_applied_value() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (signal, source) = signal(5);
        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.bind("count", source).unwrap();
        assert!(props.unbind("count"));
        assert!(!props.unbind("count"));
        assert_eq!(signal.listener_count(), 0);

        props.put("count", 6).unwrap();
        assert_eq!(props.get("count"), Some(Value::Int(6)));
    }

    #[test]
    fn test_bound_key_is_listed_before_attach() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        let (_signal, source) = signal("x");
        tree.map_mut(node, features::ELEMENT_PROPERTIES)
            .bind("value", source)
            .unwrap();

        let props = tree.map(node, features::ELEMENT_PROPERTIES);
        assert_eq!(props.get("value"), Some(Value::from("x")));
        assert!(props.contains_key("value"));
        assert_eq!(props.keys(), vec!["value"]);
        assert_eq!(props.len(), 1);
        assert!(!props.is_empty());
        // Nothing has been applied for the diff yet.
        assert_eq!(props.storage().unwrap().iter().count(), 0);
    }

    #[test]
    fn test_client_update_to_bound_key_is_refused() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        append_root(&mut tree, node);
        let (_signal, source) = signal("draft");
        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.allow_client_update("value");
        props.bind("value", source).unwrap();

        assert!(matches!(
            props.update_from_client("value", "typed"),
            Err(UpdateError::BindingActive { feature: "ElementPropertyMap", .. })
        ));
        assert_eq!(props.get("value"), Some(Value::from("draft")));
    }

    #[test]
    fn test_release_disposes_bindings() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        let (signal, source) = signal("x");
        tree.map_mut(node, features::ELEMENT_PROPERTIES)
            .bind("value", source)
            .unwrap();
        assert_eq!(signal.listener_count(), 1);
        tree.release(node);
        assert_eq!(signal.listener_count(), 0);
    }
}
