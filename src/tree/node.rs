//! Node handles and per-node data.

use std::fmt;

use crate::feature::{FeatureId, FeatureSet, FeatureState};
use crate::sync::FeatureTracker;

/// Handle to a node in a [`StateTree`](super::StateTree).
///
/// Handles are cheap to copy. A handle stays valid until the node is
/// released; using a released handle or a handle from another tree panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) tree: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node[{}:{}v{}]", self.tree, self.index, self.generation)
    }
}

/// Id of a node on the wire.
///
/// Assigned the first time the node is attached and kept for the node's
/// lifetime, including across detach and re-attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Wrap a raw id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle transition reported to node listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The node became attached. `initial` is true on the very first attach.
    Attach {
        /// Whether the node got its id with this attach.
        initial: bool,
    },
    /// The node became detached.
    Detach,
}

/// Handle of a registered lifecycle listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

pub(crate) type LifecycleListener = Box<dyn FnMut(NodeRef, Lifecycle) + Send>;

/// One declared feature of a node.
#[derive(Debug)]
pub(crate) struct FeatureSlot {
    pub(crate) id: FeatureId,
    /// Instantiated on first mutable access.
    pub(crate) state: Option<FeatureState>,
    /// Present while changes are pending.
    pub(crate) tracker: Option<FeatureTracker>,
}

impl FeatureSlot {
    pub(crate) fn new(id: FeatureId) -> Self {
        Self {
            id,
            state: None,
            tracker: None,
        }
    }
}

/// Everything a tree stores about one node.
pub(crate) struct NodeData {
    pub(crate) id: Option<NodeId>,
    pub(crate) parent: Option<NodeRef>,
    /// Declared features, sorted by id.
    pub(crate) slots: Vec<FeatureSlot>,
    pub(crate) reported: FeatureSet,
    /// Features that produced output during the current attach cycle.
    pub(crate) announced: FeatureSet,
    pub(crate) attached: bool,
    /// Attachment state the remote side knows about.
    pub(crate) was_attached: bool,
    /// No collection has run since the node was (re)attached.
    pub(crate) initial_changes: bool,
    pub(crate) listeners: Vec<(ListenerId, LifecycleListener)>,
}

impl NodeData {
    pub(crate) fn new(slots: Vec<FeatureSlot>, reported: FeatureSet) -> Self {
        Self {
            id: None,
            parent: None,
            slots,
            reported,
            announced: FeatureSet::default(),
            attached: false,
            was_attached: false,
            initial_changes: true,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn slot_position(&self, feature: FeatureId) -> Option<usize> {
        self.slots
            .binary_search_by_key(&feature, |slot| slot.id)
            .ok()
    }

    pub(crate) fn slot(&self, feature: FeatureId) -> Option<&FeatureSlot> {
        self.slot_position(feature).map(|pos| &self.slots[pos])
    }

    pub(crate) fn slot_mut(&mut self, feature: FeatureId) -> Option<&mut FeatureSlot> {
        self.slot_position(feature).map(|pos| &mut self.slots[pos])
    }

    pub(crate) fn state(&self, feature: FeatureId) -> Option<&FeatureState> {
        self.slot(feature)?.state.as_ref()
    }

    pub(crate) fn fire(&mut self, node: NodeRef, event: Lifecycle) {
        for (_, listener) in &mut self.listeners {
            listener(node, event);
        }
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("slots", &self.slots)
            .field("attached", &self.attached)
            .field("was_attached", &self.was_attached)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Arena slot.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) generation: u32,
    pub(crate) node: Option<NodeData>,
}
