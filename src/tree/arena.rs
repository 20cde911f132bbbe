//! Arena-backed state tree.
//!
//! Nodes live in a slot arena owned by the tree and are addressed through
//! generation-checked [`NodeRef`] handles. Parent links are plain handles;
//! ownership of a child is expressed only by the feature value holding it,
//! and the single-parent rule is enforced where a child is adopted.
//!
//! The tree is not internally synchronized. Callers serialize access with
//! whatever lock guards the owning session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::TreeConfig;
use super::node::*;
use crate::binding::BindingQueue;
use crate::core::UpdateError;
use crate::feature::{
    FeatureDescriptor, FeatureId, FeatureRegistry, FeatureSet, FeatureShape, FeatureState,
    FeatureType, NodeList, NodeMap, NodeValue, Value,
};
use crate::sync::FeatureTracker;

static NEXT_TREE_ID: AtomicU32 = AtomicU32::new(1);

/// Who is writing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOrigin {
    /// Server-side application code. Recorded, refused on bound keys.
    Application,
    /// Inbound client update. Not recorded.
    Client,
    /// Signal propagation. Recorded, allowed on bound keys.
    Binding,
}

/// A tree of state nodes with change tracking.
///
/// # Example
///
/// ```
/// use state_tree::prelude::*;
///
/// let mut tree = StateTree::new(&[features::ELEMENT_DATA, features::ELEMENT_CHILDREN]);
/// let root = tree.root();
///
/// let child = tree.create_node(&[features::ELEMENT_DATA]);
/// tree.map_mut(child, features::ELEMENT_DATA).put("tag", "span").unwrap();
/// tree.list_mut(root, features::ELEMENT_CHILDREN).push(child);
///
/// let changes = tree.take_changes();
/// assert!(changes.iter().any(|c| c.kind == ChangeKind::Attach));
/// ```
#[derive(Debug)]
pub struct StateTree {
    pub(crate) tree_id: u32,
    pub(crate) config: TreeConfig,
    pub(crate) registry: Arc<FeatureRegistry>,
    pub(crate) entries: Vec<Entry>,
    free: Vec<u32>,
    root: NodeRef,
    next_id: u32,
    next_listener: u64,
    pub(crate) by_id: HashMap<NodeId, NodeRef>,
    pub(crate) dirty: IndexSet<NodeRef>,
    /// Ids of released nodes the remote side still knows about.
    pub(crate) pending_detach: Vec<NodeId>,
    pub(crate) bindings: BindingQueue,
}

impl StateTree {
    /// Create a tree whose root declares `root_features`, using the default
    /// configuration.
    pub fn new(root_features: &[FeatureType]) -> Self {
        Self::with_config(root_features, TreeConfig::default())
    }

    /// Create a tree with an explicit configuration.
    ///
    /// The root is attached from the start and gets
    /// [`TreeConfig::first_node_id`].
    pub fn with_config(root_features: &[FeatureType], config: TreeConfig) -> Self {
        let registry = config.resolve_registry();
        let tree_id = NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed);
        let mut tree = Self {
            tree_id,
            registry,
            entries: Vec::with_capacity(config.node_capacity),
            free: Vec::new(),
            root: NodeRef {
                tree: tree_id,
                index: 0,
                generation: 0,
            },
            next_id: config.first_node_id,
            next_listener: 0,
            by_id: HashMap::new(),
            dirty: IndexSet::new(),
            pending_detach: Vec::new(),
            bindings: BindingQueue::default(),
            config,
        };
        tree.root = tree.alloc(root_features, &[]);
        tree.attach_subtree(tree.root);
        debug!(tree = tree_id, "created state tree");
        tree
    }

    /// The root node.
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Feature registry used by this tree.
    pub fn registry(&self) -> &Arc<FeatureRegistry> {
        &self.registry
    }

    /// Configuration the tree was created with.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Create a detached node declaring `features`.
    ///
    /// Features are instantiated on first mutable access.
    pub fn create_node(&mut self, features: &[FeatureType]) -> NodeRef {
        self.alloc(&[], features)
    }

    /// Create a detached node whose `reported` features are instantiated
    /// right away and always sent on its first collection, even while the
    /// node is inactive.
    pub fn create_node_reporting(
        &mut self,
        reported: &[FeatureType],
        others: &[FeatureType],
    ) -> NodeRef {
        self.alloc(reported, others)
    }

    /// Free a detached, parentless node together with its subtree.
    ///
    /// Active bindings in the subtree are disposed. If the remote side still
    /// knows a released node, the next collection reports it detached.
    ///
    /// # Panics
    ///
    /// Panics for the root and for nodes that still have a parent.
    pub fn release(&mut self, node: NodeRef) {
        assert!(node != self.root, "the root node cannot be released");
        assert!(
            self.data(node).parent.is_none(),
            "{node} still has a parent; remove it before releasing"
        );
        for released in self.bottom_up(node) {
            self.dirty.shift_remove(&released);
            let entry = &mut self.entries[released.index as usize];
            if let Some(data) = entry.node.take() {
                if let (true, Some(id)) = (data.was_attached, data.id) {
                    self.pending_detach.push(id);
                }
            }
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(released.index);
        }
    }

    /// Whether `node` is a live node of this tree.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.try_data(node).is_some()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.entries.iter().filter(|e| e.node.is_some()).count()
    }

    /// Parent of `node`.
    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.data(node).parent
    }

    /// Wire id of `node`, if it was ever attached.
    pub fn id(&self, node: NodeRef) -> Option<NodeId> {
        self.data(node).id
    }

    /// Attached node with wire id `id`.
    pub fn node_by_id(&self, id: NodeId) -> Option<NodeRef> {
        self.by_id.get(&id).copied()
    }

    /// Whether `node` has a path to the root.
    pub fn is_attached(&self, node: NodeRef) -> bool {
        self.data(node).attached
    }

    /// Whether `node` declares `feature`.
    pub fn has_feature(&self, node: NodeRef, feature: FeatureType) -> bool {
        self.registry
            .lookup(feature)
            .is_some_and(|id| self.data(node).slot(id).is_some())
    }

    /// Child nodes of `node`, in feature order then storage order.
    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut children = Vec::new();
        for slot in &self.data(node).slots {
            if let Some(state) = &slot.state {
                state.for_each_child(|child| children.push(child));
            }
        }
        children
    }

    /// Visit `node` and all its descendants, parents before children.
    pub fn visit_node_tree(&self, node: NodeRef, mut visitor: impl FnMut(NodeRef)) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            visitor(current);
            stack.extend(self.children(current).into_iter().rev());
        }
    }

    /// Register a listener for attach and detach of `node`.
    pub fn add_lifecycle_listener(
        &mut self,
        node: NodeRef,
        listener: impl FnMut(NodeRef, Lifecycle) + Send + 'static,
    ) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId::new(self.next_listener);
        self.data_mut(node).listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a lifecycle listener. Returns whether it was registered.
    pub fn remove_lifecycle_listener(&mut self, node: NodeRef, id: ListenerId) -> bool {
        let listeners = &mut self.data_mut(node).listeners;
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Whether any node has changes waiting for collection.
    pub fn has_dirty_nodes(&self) -> bool {
        !self.dirty.is_empty() || !self.pending_detach.is_empty()
    }

    // =========================================================================
    // Node storage
    // =========================================================================

    fn alloc(&mut self, reported: &[FeatureType], others: &[FeatureType]) -> NodeRef {
        let mut reported_set = FeatureSet::default();
        let mut ids = Vec::with_capacity(reported.len() + others.len());
        for feature in reported {
            let id = self.registry.id(*feature);
            reported_set.insert(id);
            ids.push(id);
        }
        ids.extend(others.iter().map(|feature| self.registry.id(*feature)));
        ids.sort_unstable();
        ids.dedup();

        let slots = ids
            .into_iter()
            .map(|id| {
                let mut slot = FeatureSlot::new(id);
                if reported_set.contains(id) {
                    slot.state = Some(self.registry.descriptor(id).create());
                }
                slot
            })
            .collect();
        let data = NodeData::new(slots, reported_set);

        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.node = Some(data);
                NodeRef {
                    tree: self.tree_id,
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    node: Some(data),
                });
                NodeRef {
                    tree: self.tree_id,
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub(crate) fn try_data(&self, node: NodeRef) -> Option<&NodeData> {
        if node.tree != self.tree_id {
            return None;
        }
        let entry = self.entries.get(node.index as usize)?;
        if entry.generation != node.generation {
            return None;
        }
        entry.node.as_ref()
    }

    pub(crate) fn data(&self, node: NodeRef) -> &NodeData {
        self.check_owner(node);
        match self.try_data(node) {
            Some(data) => data,
            None => panic!("{node} has been released"),
        }
    }

    pub(crate) fn data_mut(&mut self, node: NodeRef) -> &mut NodeData {
        self.check_owner(node);
        match self.entries.get_mut(node.index as usize) {
            Some(Entry {
                generation,
                node: Some(data),
            }) if *generation == node.generation => data,
            _ => panic!("{node} has been released"),
        }
    }

    fn check_owner(&self, node: NodeRef) {
        assert_eq!(node.tree, self.tree_id, "{node} belongs to another tree");
    }

    /// Nodes of the subtree under `top`, every node after its descendants.
    pub(crate) fn bottom_up(&self, top: NodeRef) -> Vec<NodeRef> {
        let mut nodes = Vec::new();
        self.visit_node_tree(top, |node| nodes.push(node));
        nodes.reverse();
        nodes
    }

    pub(crate) fn mark_dirty(&mut self, node: NodeRef) {
        self.dirty.insert(node);
    }

    // =========================================================================
    // Feature slots
    // =========================================================================

    pub(crate) fn descriptor(&self, id: FeatureId) -> FeatureDescriptor {
        *self.registry.descriptor(id)
    }

    /// Id of `feature` after checking it has the expected shape.
    pub(crate) fn feature_of_shape(
        &self,
        feature: FeatureType,
        matches: impl FnOnce(FeatureShape) -> bool,
        expected: &str,
    ) -> FeatureId {
        let id = self.registry.id(feature);
        assert!(
            matches(self.registry.descriptor(id).shape()),
            "feature {feature} is not a {expected} feature"
        );
        id
    }

    fn slot(&self, node: NodeRef, id: FeatureId) -> &FeatureSlot {
        match self.data(node).slot(id) {
            Some(slot) => slot,
            None => panic!(
                "feature {} is not declared on {node}",
                self.registry.descriptor(id).feature()
            ),
        }
    }

    fn slot_mut(&mut self, node: NodeRef, id: FeatureId) -> &mut FeatureSlot {
        let feature = self.registry.descriptor(id).feature();
        match self.data_mut(node).slot_mut(id) {
            Some(slot) => slot,
            None => panic!("feature {feature} is not declared on {node}"),
        }
    }

    pub(crate) fn state(&self, node: NodeRef, id: FeatureId) -> Option<&FeatureState> {
        self.slot(node, id).state.as_ref()
    }

    pub(crate) fn state_mut(&mut self, node: NodeRef, id: FeatureId) -> &mut FeatureState {
        let descriptor = self.descriptor(id);
        self.slot_mut(node, id)
            .state
            .get_or_insert_with(|| descriptor.create())
    }

    /// Like [`state_mut`](Self::state_mut), declaring the feature on the fly.
    pub(crate) fn state_mut_or_declare(&mut self, node: NodeRef, id: FeatureId) -> &mut FeatureState {
        let descriptor = self.descriptor(id);
        let data = self.data_mut(node);
        let pos = match data.slots.binary_search_by_key(&id, |slot| slot.id) {
            Ok(pos) => pos,
            Err(pos) => {
                data.slots.insert(pos, FeatureSlot::new(id));
                pos
            }
        };
        data.slots[pos]
            .state
            .get_or_insert_with(|| descriptor.create())
    }

    pub(crate) fn map_state(&self, node: NodeRef, id: FeatureId) -> Option<&NodeMap> {
        self.state(node, id).and_then(FeatureState::as_map)
    }

    pub(crate) fn map_state_mut(&mut self, node: NodeRef, id: FeatureId) -> &mut NodeMap {
        match self.state_mut(node, id).as_map_mut() {
            Some(map) => map,
            None => unreachable!("map feature with non-map storage"),
        }
    }

    pub(crate) fn list_state(&self, node: NodeRef, id: FeatureId) -> Option<&NodeList> {
        self.state(node, id).and_then(FeatureState::as_list)
    }

    fn list_state_mut(&mut self, node: NodeRef, id: FeatureId) -> &mut NodeList {
        match self.state_mut(node, id).as_list_mut() {
            Some(list) => list,
            None => unreachable!("list feature with non-list storage"),
        }
    }

    fn tracker_mut(&mut self, node: NodeRef, id: FeatureId) -> &mut FeatureTracker {
        let slot = self.slot_mut(node, id);
        if slot.tracker.is_none() {
            slot.tracker = slot.state.as_ref().and_then(FeatureTracker::for_state);
        }
        match slot.tracker.as_mut() {
            Some(tracker) => tracker,
            None => unreachable!("recording into a feature without a tracker"),
        }
    }

    /// Whether a write must be recorded for the next collection.
    ///
    /// Only nodes the remote side knows about record; a node attached in the
    /// current batch is described by its from-empty replay instead.
    fn is_recording(&self, node: NodeRef, descriptor: &FeatureDescriptor, origin: WriteOrigin) -> bool {
        !descriptor.is_server_side()
            && origin != WriteOrigin::Client
            && self.data(node).was_attached
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write or remove a map entry, refusing bound keys.
    pub(crate) fn write_map(
        &mut self,
        node: NodeRef,
        id: FeatureId,
        key: &str,
        value: Option<Value>,
        origin: WriteOrigin,
    ) -> Result<(), UpdateError> {
        if origin != WriteOrigin::Binding && self.map_state(node, id).is_some_and(|map| map.is_bound(key)) {
            return Err(UpdateError::BindingActive {
                feature: self.registry.descriptor(id).feature().name(),
                key: key.to_owned(),
            });
        }
        self.store_map(node, id, key, value, origin);
        Ok(())
    }

    /// Write or remove a map entry without the binding check.
    pub(crate) fn store_map(
        &mut self,
        node: NodeRef,
        id: FeatureId,
        key: &str,
        value: Option<Value>,
        origin: WriteOrigin,
    ) {
        let descriptor = self.descriptor(id);
        let old = self.map_state_mut(node, id).stored(key).cloned();
        if old == value {
            return;
        }
        if let Some(Value::Node(child)) = &value {
            self.check_adoptable(node, *child, &descriptor);
        }

        let record = self.is_recording(node, &descriptor, origin);
        self.map_state_mut(node, id).set_stored(key, value.clone());
        if record {
            self.tracker_mut(node, id).as_map_mut().record(key, old.as_ref());
        }
        if !descriptor.is_server_side() && origin != WriteOrigin::Client {
            self.mark_dirty(node);
        }

        if let Some(Value::Node(child)) = old {
            self.disown(child);
        }
        if let Some(Value::Node(child)) = value {
            self.adopt(node, child);
        }
    }

    /// Client write: checks node status and the feature's client policy,
    /// then writes without recording.
    pub(crate) fn update_from_client(
        &mut self,
        node: NodeRef,
        id: FeatureId,
        key: &str,
        value: Value,
    ) -> Result<(), UpdateError> {
        if !self.data(node).attached {
            return Err(UpdateError::NodeDetached { node });
        }
        if self.is_inert(node) || self.is_inactive(node) {
            return Err(UpdateError::NodeInactive { node });
        }
        let descriptor = self.descriptor(id);
        if !descriptor.may_update_from_client(self.map_state_mut(node, id), key, &value) {
            warn!(
                feature = %descriptor.feature(),
                key,
                "refused client update"
            );
            return Err(UpdateError::NotPermitted {
                feature: descriptor.feature().name(),
                key: key.to_owned(),
            });
        }
        self.write_map(node, id, key, Some(value), WriteOrigin::Client)
    }

    pub(crate) fn write_value(&mut self, node: NodeRef, id: FeatureId, value: Option<Value>) {
        let descriptor = self.descriptor(id);
        let old = self.value_state(node, id).and_then(|v| v.get().cloned());
        if old == value {
            return;
        }
        if let Some(Value::Node(child)) = &value {
            self.check_adoptable(node, *child, &descriptor);
        }

        let record = self.is_recording(node, &descriptor, WriteOrigin::Application);
        match self.state_mut(node, id).as_value_mut() {
            Some(slot) => slot.replace(value.clone()),
            None => unreachable!("value feature with non-value storage"),
        };
        if record {
            self.tracker_mut(node, id).as_value_mut().record(old.as_ref());
        }
        if !descriptor.is_server_side() {
            self.mark_dirty(node);
        }

        if let Some(Value::Node(child)) = old {
            self.disown(child);
        }
        if let Some(Value::Node(child)) = value {
            self.adopt(node, child);
        }
    }

    pub(crate) fn value_state(&self, node: NodeRef, id: FeatureId) -> Option<&NodeValue> {
        self.state(node, id).and_then(FeatureState::as_value)
    }

    pub(crate) fn list_insert(&mut self, node: NodeRef, id: FeatureId, index: usize, items: Vec<Value>) {
        let descriptor = self.descriptor(id);
        let FeatureShape::List { nodes } = descriptor.shape() else {
            unreachable!("list write on a non-list feature");
        };
        let len = self.list_state(node, id).map_or(0, NodeList::len);
        assert!(
            index <= len,
            "insert index {index} out of bounds for {} of length {len}",
            descriptor.feature()
        );
        let mut incoming = IndexSet::new();
        for item in &items {
            self.check_list_item(node, &descriptor, nodes, item);
            if let Value::Node(child) = item {
                assert!(incoming.insert(*child), "{child} appears twice in one insert");
            }
        }
        if items.is_empty() {
            return;
        }

        let record = self.is_recording(node, &descriptor, WriteOrigin::Application);
        self.list_state_mut(node, id).insert_all(index, items.clone());
        if record {
            self.tracker_mut(node, id).as_list_mut().record_add(index, items.clone());
        }
        if !descriptor.is_server_side() {
            self.mark_dirty(node);
        }
        for item in items {
            if let Value::Node(child) = item {
                self.adopt(node, child);
            }
        }
    }

    pub(crate) fn list_remove(&mut self, node: NodeRef, id: FeatureId, index: usize) -> Value {
        let descriptor = self.descriptor(id);
        let len = self.list_state(node, id).map_or(0, NodeList::len);
        assert!(
            index < len,
            "remove index {index} out of bounds for {} of length {len}",
            descriptor.feature()
        );

        let record = self.is_recording(node, &descriptor, WriteOrigin::Application);
        let item = self.list_state_mut(node, id).remove(index);
        if record {
            self.tracker_mut(node, id)
                .as_list_mut()
                .record_remove(index, item.clone());
        }
        if !descriptor.is_server_side() {
            self.mark_dirty(node);
        }
        if let Value::Node(child) = item {
            self.disown(child);
        }
        item
    }

    pub(crate) fn list_clear(&mut self, node: NodeRef, id: FeatureId) -> Vec<Value> {
        let descriptor = self.descriptor(id);
        let removed = self.list_state_mut(node, id).take_all();
        if removed.is_empty() {
            return removed;
        }

        if self.is_recording(node, &descriptor, WriteOrigin::Application) {
            self.tracker_mut(node, id).as_list_mut().record_clear();
        }
        if !descriptor.is_server_side() {
            self.mark_dirty(node);
        }
        for item in &removed {
            if let Value::Node(child) = item {
                self.disown(*child);
            }
        }
        removed
    }

    fn check_list_item(&self, parent: NodeRef, descriptor: &FeatureDescriptor, nodes: bool, item: &Value) {
        match (nodes, item) {
            (true, Value::Node(child)) => self.check_adoptable(parent, *child, descriptor),
            (true, other) => panic!(
                "{} holds child nodes only, got a {} value",
                descriptor.feature(),
                other.type_name()
            ),
            (false, Value::Node(_)) => {
                panic!("{} holds scalar values only, got a node", descriptor.feature())
            }
            (false, _) => {}
        }
    }

    // =========================================================================
    // Parent links and attach/detach
    // =========================================================================

    fn check_adoptable(&self, parent: NodeRef, child: NodeRef, descriptor: &FeatureDescriptor) {
        assert!(
            !descriptor.is_server_side(),
            "server-side feature {} cannot hold child nodes",
            descriptor.feature()
        );
        assert!(child != self.root, "the root node cannot become a child");
        assert!(
            self.data(child).parent.is_none(),
            "{child} already has a parent; remove it from there first"
        );
        let mut current = Some(parent);
        while let Some(ancestor) = current {
            assert!(ancestor != child, "Can't set own child as parent");
            current = self.data(ancestor).parent;
        }
    }

    fn adopt(&mut self, parent: NodeRef, child: NodeRef) {
        let data = self.data_mut(child);
        assert!(data.parent.is_none(), "{child} already has a parent");
        data.parent = Some(parent);
        self.refresh_inert(child);
        if self.data(parent).attached {
            self.attach_subtree(child);
        }
    }

    fn disown(&mut self, child: NodeRef) {
        let data = self.data_mut(child);
        data.parent = None;
        let attached = data.attached;
        self.refresh_inert(child);
        if attached {
            self.detach_subtree(child);
        }
    }

    fn attach_subtree(&mut self, top: NodeRef) {
        let nodes = self.bottom_up(top);
        for &node in &nodes {
            let initial = self.data(node).id.is_none();
            if initial {
                let id = NodeId::new(self.next_id);
                self.next_id += 1;
                self.data_mut(node).id = Some(id);
            }
            let data = self.data_mut(node);
            data.attached = true;
            let id = data.id;
            data.fire(node, Lifecycle::Attach { initial });
            if let Some(id) = id {
                self.by_id.insert(id, node);
                debug!(node = %id, initial, "attached node");
            }
            self.mark_dirty(node);
        }
        for node in nodes {
            self.resync_bindings(node);
        }
    }

    fn detach_subtree(&mut self, top: NodeRef) {
        for node in self.bottom_up(top) {
            let data = self.data_mut(node);
            data.attached = false;
            let id = data.id;
            data.fire(node, Lifecycle::Detach);
            if let Some(id) = id {
                self.by_id.remove(&id);
                debug!(node = %id, "detached node");
            }
            self.mark_dirty(node);
        }
    }
}
