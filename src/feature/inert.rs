//! Server-side inert bookkeeping.

use std::cell::Cell;

/// Explicit inert settings of one node plus the last resolved state.
///
/// Nodes without this feature inherit inertness from the nearest ancestor
/// that has it.
#[derive(Debug, Default)]
pub struct InertData {
    inert_self: bool,
    ignore_parent_inert: bool,
    resolved: Cell<Option<bool>>,
}

impl InertData {
    /// Create settings that neither declare inertness nor ignore the parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the node declares itself inert.
    pub fn is_inert_self(&self) -> bool {
        self.inert_self
    }

    /// Whether the node ignores the inert state of its ancestors.
    pub fn ignores_parent_inert(&self) -> bool {
        self.ignore_parent_inert
    }

    /// Whether this node's state does not depend on its ancestors.
    pub(crate) fn is_self_contained(&self) -> bool {
        self.inert_self || self.ignore_parent_inert
    }

    pub(crate) fn set_inert_self(&mut self, inert: bool) -> bool {
        let changed = self.inert_self != inert;
        self.inert_self = inert;
        changed
    }

    pub(crate) fn set_ignore_parent_inert(&mut self, ignore: bool) -> bool {
        let changed = self.ignore_parent_inert != ignore;
        self.ignore_parent_inert = ignore;
        changed
    }

    pub(crate) fn resolved(&self) -> Option<bool> {
        self.resolved.get()
    }

    pub(crate) fn store_resolved(&self, inert: bool) {
        self.resolved.set(Some(inert));
    }

    pub(crate) fn invalidate(&self) {
        self.resolved.set(None);
    }
}
