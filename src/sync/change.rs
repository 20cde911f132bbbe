//! Change records
//!
//! The vocabulary of the diff stream. Records are plain data; encoding them
//! to bytes belongs to the transport layer.

use std::fmt;

use crate::feature::FeatureId;
use crate::tree::NodeId;

/// A value as the remote side sees it: child nodes are referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Double(f64),
    /// String.
    String(String),
    /// Reference to another node.
    Node(NodeId),
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Node(id) => write!(f, "node {id}"),
        }
    }
}

/// One atomic change of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeChange {
    /// Node the change applies to.
    pub node: NodeId,
    /// What changed.
    pub kind: ChangeKind,
}

impl NodeChange {
    /// Create a change record.
    pub fn new(node: NodeId, kind: ChangeKind) -> Self {
        Self { node, kind }
    }

    /// Feature the change applies to, if it is feature specific.
    pub fn feature(&self) -> Option<FeatureId> {
        self.kind.feature()
    }
}

impl fmt::Display for NodeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}: {}", self.node, self.kind)
    }
}

/// Kind of change.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// The node became known to the remote side. Its full state follows as
    /// regular records.
    Attach,
    /// The node is no longer part of the tree.
    Detach,
    /// `key` now holds `value`.
    MapPut {
        /// Map or single-value feature.
        feature: FeatureId,
        /// Key.
        key: String,
        /// New value.
        value: WireValue,
    },
    /// `key` no longer exists.
    MapRemove {
        /// Map or single-value feature.
        feature: FeatureId,
        /// Key.
        key: String,
    },
    /// `items` were inserted starting at `index`.
    ListAdd {
        /// List feature.
        feature: FeatureId,
        /// Insert position.
        index: usize,
        /// Inserted items.
        items: Vec<WireValue>,
    },
    /// The item at `index` was removed.
    ListRemove {
        /// List feature.
        feature: FeatureId,
        /// Removal position.
        index: usize,
        /// Removed item.
        removed: WireValue,
    },
    /// Every item was removed.
    ListClear {
        /// List feature.
        feature: FeatureId,
    },
    /// The feature exists but has nothing to report.
    Empty {
        /// Feature.
        feature: FeatureId,
    },
}

impl ChangeKind {
    /// Feature the change applies to, if it is feature specific.
    pub fn feature(&self) -> Option<FeatureId> {
        match self {
            Self::Attach | Self::Detach => None,
            Self::MapPut { feature, .. }
            | Self::MapRemove { feature, .. }
            | Self::ListAdd { feature, .. }
            | Self::ListRemove { feature, .. }
            | Self::ListClear { feature }
            | Self::Empty { feature } => Some(*feature),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach => f.write_str("attach"),
            Self::Detach => f.write_str("detach"),
            Self::MapPut {
                feature,
                key,
                value,
            } => write!(f, "{feature} put {key} = {value}"),
            Self::MapRemove { feature, key } => write!(f, "{feature} remove {key}"),
            Self::ListAdd {
                feature,
                index,
                items,
            } => write!(f, "{feature} add {} at {index}", items.len()),
            Self::ListRemove { feature, index, .. } => write!(f, "{feature} remove at {index}"),
            Self::ListClear { feature } => write!(f, "{feature} clear"),
            Self::Empty { feature } => write!(f, "{feature} empty"),
        }
    }
}

/// Summary of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Nodes that produced at least one record.
    pub nodes: usize,
    /// Records emitted.
    pub changes: usize,
}

impl FlushStats {
    /// Whether the pass emitted nothing.
    pub fn is_empty(&self) -> bool {
        self.changes == 0
    }
}
