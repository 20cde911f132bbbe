//! Client-side model rebuilt from change records, for round-trip tests.

use std::collections::{BTreeMap, HashMap};

use super::change::{ChangeKind, NodeChange, WireValue};
use crate::feature::{FeatureId, FeatureState};
use crate::tree::{NodeId, NodeRef, StateTree};

/// What the remote side knows about one node. Empty features are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MirrorNode {
    maps: BTreeMap<FeatureId, BTreeMap<String, WireValue>>,
    lists: BTreeMap<FeatureId, Vec<WireValue>>,
}

impl MirrorNode {
    fn normalized(mut self) -> Self {
        self.maps.retain(|_, map| !map.is_empty());
        self.lists.retain(|_, list| !list.is_empty());
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct Mirror {
    nodes: HashMap<NodeId, MirrorNode>,
}

impl Mirror {
    pub(crate) fn apply_all(&mut self, changes: &[NodeChange]) {
        for change in changes {
            self.apply(change);
        }
    }

    pub(crate) fn apply(&mut self, change: &NodeChange) {
        if change.kind == ChangeKind::Detach {
            self.nodes.remove(&change.node);
            return;
        }
        let node = self.nodes.entry(change.node).or_default();
        match &change.kind {
            ChangeKind::Attach | ChangeKind::Detach | ChangeKind::Empty { .. } => {}
            ChangeKind::MapPut {
                feature,
                key,
                value,
            } => {
                node.maps
                    .entry(*feature)
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            ChangeKind::MapRemove { feature, key } => {
                let removed = node.maps.entry(*feature).or_default().remove(key);
                assert!(removed.is_some(), "{change} removes an unknown key");
            }
            ChangeKind::ListAdd {
                feature,
                index,
                items,
            } => {
                let list = node.lists.entry(*feature).or_default();
                assert!(*index <= list.len(), "{change} is out of bounds");
                list.splice(*index..*index, items.iter().cloned());
            }
            ChangeKind::ListRemove {
                feature,
                index,
                removed,
            } => {
                let list = node.lists.entry(*feature).or_default();
                assert!(*index < list.len(), "{change} is out of bounds");
                let item = list.remove(*index);
                if *removed != WireValue::Null {
                    assert_eq!(&item, removed, "{change} removed the wrong item");
                }
            }
            ChangeKind::ListClear { feature } => {
                node.lists.remove(feature);
            }
        }
    }

    /// Mirrored state of `id`, if the node is known.
    pub(crate) fn node(&self, id: NodeId) -> Option<MirrorNode> {
        self.nodes.get(&id).cloned().map(MirrorNode::normalized)
    }

    /// The state the remote side should hold for `node`, read from the tree.
    pub(crate) fn snapshot(tree: &StateTree, node: NodeRef) -> MirrorNode {
        let mut snapshot = MirrorNode::default();
        for slot in &tree.data(node).slots {
            if tree.registry.descriptor(slot.id).is_server_side() {
                continue;
            }
            match &slot.state {
                Some(FeatureState::Map(map)) => {
                    let entries = map
                        .iter()
                        .map(|(key, value)| (key.to_owned(), tree.wire_value(value)));
                    snapshot.maps.entry(slot.id).or_default().extend(entries);
                }
                Some(FeatureState::List(list)) => {
                    let items = list.items().iter().map(|item| tree.wire_value(item));
                    snapshot.lists.entry(slot.id).or_default().extend(items);
                }
                Some(FeatureState::Value(value)) => {
                    if let Some(current) = value.get() {
                        snapshot
                            .maps
                            .entry(slot.id)
                            .or_default()
                            .insert(value.key().to_owned(), tree.wire_value(current));
                    }
                }
                Some(FeatureState::Inert(_)) | None => {}
            }
        }
        snapshot.normalized()
    }
}
