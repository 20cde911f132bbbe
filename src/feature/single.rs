//! Single-value feature storage.

use super::Value;

/// One optional value exposed under a fixed key.
///
/// `None` means "never set" and is distinct from [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeValue {
    key: &'static str,
    value: Option<Value>,
}

impl NodeValue {
    /// Create an unset value published under `key`.
    pub fn new(key: &'static str) -> Self {
        Self { key, value: None }
    }

    /// Key the value is published under.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Current value.
    pub fn get(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn replace(&mut self, value: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.value, value)
    }
}
