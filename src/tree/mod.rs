//! State tree
//!
//! Implements:
//! - Arena storage of nodes with generation-checked handles
//! - Parent/child linkage through feature values, single parent per node
//! - Attach/detach lifecycle with stable wire ids and listeners
//! - Inert and inactive status propagation
//! - Typed feature access handles

mod access;
mod arena;
mod config;
mod node;
mod status;

pub use access::*;
pub use arena::StateTree;
pub use config::*;
pub use node::{Lifecycle, ListenerId, NodeId, NodeRef};

pub(crate) use arena::WriteOrigin;

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::core::KEY_TAG;
    use crate::feature::{FeatureType, features};

    /// Features of a plain element node.
    pub(crate) const ELEMENT: [FeatureType; 7] = [
        features::ELEMENT_DATA,
        features::ELEMENT_PROPERTIES,
        features::ELEMENT_CHILDREN,
        features::ELEMENT_ATTRIBUTES,
        features::ELEMENT_CLASSES,
        features::ELEMENT_STYLES,
        features::VIRTUAL_CHILDREN,
    ];

    pub(crate) fn element_tree() -> StateTree {
        StateTree::new(&ELEMENT)
    }

    pub(crate) fn element(tree: &mut StateTree, tag: &str) -> NodeRef {
        let node = tree.create_node(&ELEMENT);
        tree.map_mut(node, features::ELEMENT_DATA)
            .put(KEY_TAG, tag)
            .unwrap();
        node
    }

    pub(crate) fn append(tree: &mut StateTree, parent: NodeRef, child: NodeRef) {
        tree.list_mut(parent, features::ELEMENT_CHILDREN).push(child);
    }

    pub(crate) fn append_root(tree: &mut StateTree, child: NodeRef) {
        let root = tree.root();
        append(tree, root, child);
    }
}
