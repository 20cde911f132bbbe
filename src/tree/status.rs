//! Inert and inactive status of nodes.
//!
//! A node is *inert* when it declares itself inert, or when the nearest
//! ancestor carrying inert settings resolves to inert and the node does not
//! ignore its parent. A node is *inactive* when one of its own or its
//! ancestors' features disallows changes (a hidden element, for example).
//! Both states suppress change emission for all features except those that
//! are emitted regardless.

use super::{NodeRef, StateTree};
use crate::feature::{FeatureState, InertData, features};

impl StateTree {
    /// Declare `node` inert or not.
    pub fn set_inert(&mut self, node: NodeRef, inert: bool) {
        if self.inert_data_mut(node).set_inert_self(inert) {
            self.refresh_inert(node);
        }
    }

    /// Make `node` ignore (or respect again) the inert state of its ancestors.
    pub fn set_ignore_parent_inert(&mut self, node: NodeRef, ignore: bool) {
        if self.inert_data_mut(node).set_ignore_parent_inert(ignore) {
            self.refresh_inert(node);
        }
    }

    /// Whether `node` is inert.
    ///
    /// The walk stops at the nearest node carrying inert settings; its
    /// resolved state is cached until an ancestor or the node itself changes.
    pub fn is_inert(&self, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if let Some(inert) = self.inert_data(candidate) {
                return self.resolve_inert(candidate, inert);
            }
            current = self.data(candidate).parent;
        }
        false
    }

    /// Whether `node` or one of its ancestors disallows changes.
    pub fn is_inactive(&self, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if self.is_inactive_self(candidate) {
                return true;
            }
            current = self.data(candidate).parent;
        }
        false
    }

    /// Whether one of the node's own features disallows changes.
    pub(crate) fn is_inactive_self(&self, node: NodeRef) -> bool {
        self.data(node).slots.iter().any(|slot| {
            slot.state.as_ref().is_some_and(|state| {
                !self
                    .registry
                    .descriptor(slot.id)
                    .allows_changes_for(state)
            })
        })
    }

    /// Whether emission is suppressed by the node's own settings rather than
    /// inherited from an ancestor.
    pub(crate) fn is_suppressed_self(&self, node: NodeRef) -> bool {
        self.is_inactive_self(node) || self.inert_data(node).is_some_and(InertData::is_inert_self)
    }

    fn resolve_inert(&self, node: NodeRef, inert: &InertData) -> bool {
        if let Some(resolved) = inert.resolved() {
            return resolved;
        }
        let resolved = inert.is_inert_self()
            || (!inert.ignores_parent_inert()
                && self.data(node).parent.is_some_and(|parent| self.is_inert(parent)));
        inert.store_resolved(resolved);
        resolved
    }

    fn inert_data(&self, node: NodeRef) -> Option<&InertData> {
        let id = self.registry.lookup(features::INERT_DATA)?;
        self.data(node).state(id).and_then(FeatureState::as_inert)
    }

    fn inert_data_mut(&mut self, node: NodeRef) -> &mut InertData {
        let id = self.registry.id(features::INERT_DATA);
        match self.state_mut_or_declare(node, id).as_inert_mut() {
            Some(inert) => inert,
            None => unreachable!("inert feature with non-inert storage"),
        }
    }

    /// Drop cached inert state below `top` and mark affected attached nodes
    /// dirty. Subtrees whose state does not depend on their ancestors are
    /// skipped.
    pub(crate) fn refresh_inert(&mut self, top: NodeRef) {
        if let Some(inert) = self.inert_data(top) {
            inert.invalidate();
        }
        let mut stack = vec![top];
        while let Some(node) = stack.pop() {
            if node != top {
                if let Some(inert) = self.inert_data(node) {
                    if inert.is_self_contained() {
                        continue;
                    }
                    inert.invalidate();
                }
            }
            if self.data(node).attached {
                self.mark_dirty(node);
            }
            stack.extend(self.children(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::KEY_VISIBLE;
    use crate::feature::{Value, features};
    use crate::tree::tests_support::*;

    #[test]
    fn test_inert_is_inherited() {
        let mut tree = element_tree();
        let a = element(&mut tree, "section");
        let d = element(&mut tree, "div");
        append(&mut tree, a, d);
        append_root(&mut tree, a);

        assert!(!tree.is_inert(d));
        tree.set_inert(a, true);
        assert!(tree.is_inert(a));
        assert!(tree.is_inert(d));

        tree.set_inert(a, false);
        assert!(!tree.is_inert(d));
    }

    #[test]
    fn test_ignore_parent_inert() {
        let mut tree = element_tree();
        let a = element(&mut tree, "section");
        let d = element(&mut tree, "dialog");
        let inner = element(&mut tree, "button");
        append(&mut tree, d, inner);
        append(&mut tree, a, d);
        append_root(&mut tree, a);

        tree.set_ignore_parent_inert(d, true);
        tree.set_inert(a, true);
        assert!(tree.is_inert(a));
        assert!(!tree.is_inert(d));
        assert!(!tree.is_inert(inner));
    }

    #[test]
    fn test_cascade_skips_ignoring_sibling_subtree() {
        let mut tree = element_tree();
        let a = element(&mut tree, "main");
        let left = element(&mut tree, "div");
        let right = element(&mut tree, "div");
        let right_child = element(&mut tree, "span");
        append(&mut tree, right, right_child);
        append(&mut tree, a, left);
        append(&mut tree, a, right);
        append_root(&mut tree, a);
        tree.set_ignore_parent_inert(right, true);
        let _ = tree.take_changes();

        // Resolve once so every node carries a cached state.
        assert!(!tree.is_inert(left));
        assert!(!tree.is_inert(right_child));

        tree.set_inert(a, true);
        assert!(tree.is_inert(left));
        assert!(!tree.is_inert(right));
        assert!(!tree.is_inert(right_child));
        // The ignoring subtree was not revisited.
        assert!(!tree.dirty.contains(&right));
        assert!(!tree.dirty.contains(&right_child));
        assert!(tree.dirty.contains(&left));
    }

    #[test]
    fn test_self_inert_wins_over_parent() {
        let mut tree = element_tree();
        let a = element(&mut tree, "div");
        let d = element(&mut tree, "div");
        append(&mut tree, a, d);
        append_root(&mut tree, a);
        tree.set_inert(d, true);
        assert!(!tree.is_inert(a));
        assert!(tree.is_inert(d));
    }

    #[test]
    fn test_reparenting_refreshes_inert_state() {
        let mut tree = element_tree();
        let inert_parent = element(&mut tree, "div");
        let live_parent = element(&mut tree, "div");
        let child = element(&mut tree, "span");
        append_root(&mut tree, inert_parent);
        append_root(&mut tree, live_parent);
        tree.set_inert(inert_parent, true);
        tree.set_inert(child, false);

        append(&mut tree, inert_parent, child);
        assert!(tree.is_inert(child));

        tree.list_mut(inert_parent, features::ELEMENT_CHILDREN).remove(0);
        append(&mut tree, live_parent, child);
        assert!(!tree.is_inert(child));
    }

    #[test]
    fn test_hidden_ancestor_makes_descendants_inactive() {
        let mut tree = element_tree();
        let a = element(&mut tree, "div");
        let d = element(&mut tree, "span");
        append(&mut tree, a, d);
        append_root(&mut tree, a);
        assert!(!tree.is_inactive(d));

        tree.map_mut(a, features::ELEMENT_DATA)
            .put(KEY_VISIBLE, false)
            .unwrap();
        assert!(tree.is_inactive(a));
        assert!(tree.is_inactive(d));
        assert!(!tree.is_inactive_self(d));

        tree.map_mut(a, features::ELEMENT_DATA)
            .put(KEY_VISIBLE, Value::Bool(true))
            .unwrap();
        assert!(!tree.is_inactive(d));
    }
}
