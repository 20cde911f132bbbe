//! Typed access to node features.
//!
//! Handles borrow the tree for one feature of one node. Read handles never
//! instantiate a feature; mutable handles instantiate it when created.

use std::sync::Arc;

use super::arena::WriteOrigin;
use super::{NodeRef, StateTree};
use crate::core::{BindingError, SignalSource, UpdateError};
use crate::feature::{FeatureId, FeatureShape, FeatureType, NodeList, NodeMap, Value};

impl StateTree {
    /// Read access to a map feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared map feature of `node`.
    pub fn map(&self, node: NodeRef, feature: FeatureType) -> MapView<'_> {
        let id = self.feature_of_shape(feature, |s| s == FeatureShape::Map, "map");
        MapView {
            map: self.map_state(node, id),
        }
    }

    /// Write access to a map feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared map feature of `node`.
    pub fn map_mut(&mut self, node: NodeRef, feature: FeatureType) -> MapMut<'_> {
        let id = self.feature_of_shape(feature, |s| s == FeatureShape::Map, "map");
        self.state_mut(node, id);
        MapMut {
            tree: self,
            node,
            feature: id,
        }
    }

    /// Read access to a list feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared list feature of `node`.
    pub fn list(&self, node: NodeRef, feature: FeatureType) -> ListView<'_> {
        let id = self.feature_of_shape(feature, |s| matches!(s, FeatureShape::List { .. }), "list");
        ListView {
            list: self.list_state(node, id),
        }
    }

    /// Write access to a list feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared list feature of `node`.
    pub fn list_mut(&mut self, node: NodeRef, feature: FeatureType) -> ListMut<'_> {
        let id = self.feature_of_shape(feature, |s| matches!(s, FeatureShape::List { .. }), "list");
        self.state_mut(node, id);
        ListMut {
            tree: self,
            node,
            feature: id,
        }
    }

    /// Current value of a single-value feature.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared single-value feature of `node`.
    pub fn value(&self, node: NodeRef, feature: FeatureType) -> Option<&Value> {
        let id = self.feature_of_shape(feature, |s| matches!(s, FeatureShape::Value { .. }), "value");
        self.value_state(node, id).and_then(|value| value.get())
    }

    /// Set a single-value feature. Writing the current value is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not a declared single-value feature of `node`,
    /// or if a node value is written into a server-side feature.
    pub fn set_value(&mut self, node: NodeRef, feature: FeatureType, value: impl Into<Value>) {
        let id = self.feature_of_shape(feature, |s| matches!(s, FeatureShape::Value { .. }), "value");
        self.write_value(node, id, Some(value.into()));
    }
}

/// Read handle for a map feature.
#[derive(Debug, Clone, Copy)]
pub struct MapView<'a> {
    map: Option<&'a NodeMap>,
}

impl<'a> MapView<'a> {
    /// Current value of `key`. Bound keys read through to their signal.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.map?.get(key)
    }

    /// Whether `key` holds a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.is_some_and(|map| map.contains_key(key))
    }

    /// Keys holding a value, in insertion order.
    pub fn keys(&self) -> Vec<&'a str> {
        self.map.map(|map| map.keys().collect()).unwrap_or_default()
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.map.map_or(0, NodeMap::len)
    }

    /// Whether no key holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is bound to a signal.
    pub fn is_bound(&self, key: &str) -> bool {
        self.map.is_some_and(|map| map.is_bound(key))
    }

    /// Underlying storage, if the feature was ever instantiated.
    pub fn storage(&self) -> Option<&'a NodeMap> {
        self.map
    }
}

/// Write handle for a map feature.
#[derive(Debug)]
pub struct MapMut<'a> {
    tree: &'a mut StateTree,
    node: NodeRef,
    feature: FeatureId,
}

impl MapMut<'_> {
    /// Set `key` to `value`. Writing the current value is a no-op.
    ///
    /// # Errors
    ///
    /// [`UpdateError::BindingActive`] if `key` is bound to a signal.
    ///
    /// # Panics
    ///
    /// Panics if a child node value cannot be adopted (it already has a
    /// parent, is an ancestor, is the root, or the feature is server-side).
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> Result<(), UpdateError> {
        self.tree
            .write_map(self.node, self.feature, key, Some(value.into()), WriteOrigin::Application)
    }

    /// Remove `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// [`UpdateError::BindingActive`] if `key` is bound to a signal.
    pub fn remove(&mut self, key: &str) -> Result<(), UpdateError> {
        self.tree
            .write_map(self.node, self.feature, key, None, WriteOrigin::Application)
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.tree.map_state(self.node, self.feature)?.get(key)
    }

    /// Whether `key` holds a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.tree
            .map_state(self.node, self.feature)
            .is_some_and(|map| map.contains_key(key))
    }

    /// Apply a value sent by the client.
    ///
    /// The write is not recorded, since the client already has the value.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NodeDetached`] if the node is not attached
    /// - [`UpdateError::NodeInactive`] if the node is inert or inactive
    /// - [`UpdateError::NotPermitted`] if the feature's policy refuses `key`
    /// - [`UpdateError::BindingActive`] if `key` is bound to a signal
    pub fn update_from_client(&mut self, key: &str, value: impl Into<Value>) -> Result<(), UpdateError> {
        self.tree
            .update_from_client(self.node, self.feature, key, value.into())
    }

    /// Open `key` for client updates, for features whose policy consults
    /// the allow-list.
    pub fn allow_client_update(&mut self, key: &str) {
        self.tree
            .map_state_mut(self.node, self.feature)
            .allow_client_key(key);
    }

    /// Drive `key` from `source`.
    ///
    /// On an attached node the current signal value is applied right away;
    /// otherwise on the next attach.
    ///
    /// # Errors
    ///
    /// [`BindingError::AlreadyBound`] if `key` already has a binding. The
    /// existing binding is left untouched.
    pub fn bind(&mut self, key: &str, source: Arc<dyn SignalSource>) -> Result<(), BindingError> {
        self.tree.bind_key(self.node, self.feature, key, source)
    }

    /// Remove the binding of `key`, keeping the last applied value.
    /// Returns whether a binding existed.
    pub fn unbind(&mut self, key: &str) -> bool {
        self.tree.unbind_key(self.node, self.feature, key)
    }

    /// Whether `key` is bound to a signal.
    pub fn is_bound(&self, key: &str) -> bool {
        self.tree
            .map_state(self.node, self.feature)
            .is_some_and(|map| map.is_bound(key))
    }
}

/// Read handle for a list feature.
#[derive(Debug, Clone, Copy)]
pub struct ListView<'a> {
    list: Option<&'a NodeList>,
}

impl<'a> ListView<'a> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.list.map_or(0, NodeList::len)
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.list?.get(index)
    }

    /// Position of the first item equal to `item`.
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.list?.index_of(item)
    }

    /// All items in order.
    pub fn items(&self) -> &'a [Value] {
        self.list.map(NodeList::items).unwrap_or_default()
    }
}

/// Write handle for a list feature.
#[derive(Debug)]
pub struct ListMut<'a> {
    tree: &'a mut StateTree,
    node: NodeRef,
    feature: FeatureId,
}

impl ListMut<'_> {
    /// Insert `item` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`, if the item does not match the list kind
    /// (child nodes vs scalars), or if a child node cannot be adopted.
    pub fn add(&mut self, index: usize, item: impl Into<Value>) {
        self.tree
            .list_insert(self.node, self.feature, index, vec![item.into()]);
    }

    /// Append `item`.
    pub fn push(&mut self, item: impl Into<Value>) {
        let len = self.len();
        self.add(len, item);
    }

    /// Insert all `items` starting at `index`, recorded as one change.
    pub fn add_all<I>(&mut self, index: usize, items: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.tree.list_insert(self.node, self.feature, index, items);
    }

    /// Remove and return the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> Value {
        self.tree.list_remove(self.node, self.feature, index)
    }

    /// Remove the first item equal to `item`. Returns whether one was found.
    pub fn remove_item(&mut self, item: &Value) -> bool {
        match self.index_of(item) {
            Some(index) => {
                self.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove all items and return them. Clearing an empty list is a no-op.
    pub fn clear(&mut self) -> Vec<Value> {
        self.tree.list_clear(self.node, self.feature)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.tree
            .list_state(self.node, self.feature)
            .map_or(0, NodeList::len)
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.tree.list_state(self.node, self.feature)?.get(index)
    }

    /// Position of the first item equal to `item`.
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.tree.list_state(self.node, self.feature)?.index_of(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KEY_TEXT;
    use crate::feature::features;
    use crate::tree::tests_support::*;

    #[test]
    fn test_map_handles() {
        let mut tree = element_tree();
        let node = element(&mut tree, "input");
        let mut props = tree.map_mut(node, features::ELEMENT_PROPERTIES);
        props.put("value", "abc").unwrap();
        props.put("count", 2).unwrap();
        assert_eq!(props.get("value"), Some(Value::from("abc")));
        props.remove("count").unwrap();
        props.remove("missing").unwrap();
        assert!(!props.contains_key("count"));

        let view = tree.map(node, features::ELEMENT_PROPERTIES);
        assert_eq!(view.keys(), vec!["value"]);
        assert_eq!(view.len(), 1);
        assert!(tree.map(node, features::ELEMENT_STYLES).is_empty());
    }

    #[test]
    fn test_list_handles() {
        let mut tree = element_tree();
        let node = element(&mut tree, "div");
        let mut classes = tree.list_mut(node, features::ELEMENT_CLASSES);
        classes.push("a");
        classes.add_all(1, ["b", "c"]);
        classes.add(0, "z");
        assert_eq!(classes.len(), 4);
        assert_eq!(classes.index_of(&Value::from("b")), Some(2));
        assert!(classes.remove_item(&Value::from("z")));
        assert!(!classes.remove_item(&Value::from("z")));
        assert_eq!(classes.remove(0), Value::from("a"));

        let view = tree.list(node, features::ELEMENT_CLASSES);
        assert_eq!(view.items(), &[Value::from("b"), Value::from("c")]);
        assert_eq!(view.get(5), None);
    }

    #[test]
    fn test_value_handles() {
        let mut tree = StateTree::new(&[features::TEXT_NODE]);
        let root = tree.root();
        assert_eq!(tree.value(root, features::TEXT_NODE), None);
        tree.set_value(root, features::TEXT_NODE, Value::Null);
        assert_eq!(tree.value(root, features::TEXT_NODE), Some(&Value::Null));
        tree.set_value(root, features::TEXT_NODE, "hello");
        assert_eq!(
            tree.value(root, features::TEXT_NODE).and_then(Value::as_str),
            Some("hello")
        );
        assert_eq!(KEY_TEXT, "text");
    }

    #[test]
    fn test_clear_returns_items() {
        let mut tree = element_tree();
        let node = element(&mut tree, "div");
        let mut classes = tree.list_mut(node, features::ELEMENT_CLASSES);
        assert!(classes.clear().is_empty());
        classes.add_all(0, ["a", "b"]);
        assert_eq!(classes.clear(), vec![Value::from("a"), Value::from("b")]);
        assert!(classes.is_empty());
    }

    #[test]
    #[should_panic(expected = "is not a map feature")]
    fn test_wrong_shape_panics() {
        let tree = element_tree();
        tree.map(tree.root(), features::ELEMENT_CHILDREN);
    }

    #[test]
    #[should_panic(expected = "holds child nodes only")]
    fn test_scalar_in_node_list_panics() {
        let mut tree = element_tree();
        let root = tree.root();
        tree.list_mut(root, features::ELEMENT_CHILDREN).push("text");
    }

    #[test]
    #[should_panic(expected = "holds scalar values only")]
    fn test_node_in_value_list_panics() {
        let mut tree = element_tree();
        let node = element(&mut tree, "div");
        let root = tree.root();
        tree.list_mut(root, features::ELEMENT_CLASSES).push(node);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_insert_out_of_bounds_panics() {
        let mut tree = element_tree();
        let root = tree.root();
        tree.list_mut(root, features::ELEMENT_CLASSES).add(1, "x");
    }

    #[test]
    #[should_panic(expected = "cannot hold child nodes")]
    fn test_server_side_node_value_panics() {
        let mut tree = StateTree::new(&[features::COMPONENT_MAPPING]);
        let root = tree.root();
        let other = tree.create_node(&[]);
        tree.set_value(root, features::COMPONENT_MAPPING, other);
    }
}
