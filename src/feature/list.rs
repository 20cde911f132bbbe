//! Ordered list feature storage.

use super::Value;

/// List feature storage.
///
/// Depending on the feature descriptor a list holds either child nodes only
/// or scalar values only. Writes go through the owning
/// [`StateTree`](crate::tree::StateTree).
#[derive(Debug, Default)]
pub struct NodeList {
    items: Vec<Value>,
    cleared: bool,
}

impl NodeList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Position of the first item equal to `item`.
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.items.iter().position(|it| it == item)
    }

    /// All items in order.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Whether the list was cleared since the remote side last received it
    /// from scratch. A from-empty replay then starts with a clear.
    pub fn was_cleared(&self) -> bool {
        self.cleared
    }

    pub(crate) fn reset_cleared(&mut self) {
        self.cleared = false;
    }

    pub(crate) fn insert_all(&mut self, index: usize, items: Vec<Value>) {
        self.items.splice(index..index, items);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Value {
        self.items.remove(index)
    }

    pub(crate) fn take_all(&mut self) -> Vec<Value> {
        self.cleared = true;
        std::mem::take(&mut self.items)
    }
}
