//! Diff collection
//!
//! One pass over the dirty nodes turns pending tracker state into
//! [`NodeChange`] records:
//!
//! 1. queued signal changes are applied,
//! 2. released nodes the remote side still knows are reported detached,
//! 3. every dirty node reports attach/detach transitions and, while
//!    attached, the changes of each feature in registration order.
//!
//! The dirty set is swapped out before the pass starts, so writes made while
//! collecting land in the next pass.

use std::mem;
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use super::change::{ChangeKind, FlushStats, NodeChange, WireValue};
use super::tracker::{FeatureTracker, ListChange, Prior};
use crate::feature::{FeatureId, FeatureState, Value};
use crate::tree::{NodeId, NodeRef, StateTree};

impl StateTree {
    /// Collect every pending change, passing each record to `collector`.
    ///
    /// Features are visited once per node per pass; trackers consulted are
    /// reset afterwards.
    #[instrument(skip_all, fields(tree = self.tree_id))]
    pub fn collect_changes(&mut self, mut collector: impl FnMut(NodeChange)) -> FlushStats {
        let signals = self.apply_signal_updates();
        let log_changes = self.config.log_changes;
        let mut stats = FlushStats::default();
        let mut batch = Vec::new();

        let mut deliver = |batch: &mut Vec<NodeChange>, stats: &mut FlushStats| {
            if batch.is_empty() {
                return;
            }
            stats.nodes += 1;
            stats.changes += batch.len();
            for change in batch.drain(..) {
                if log_changes {
                    trace!(%change, "collected change");
                }
                collector(change);
            }
        };

        for id in mem::take(&mut self.pending_detach) {
            batch.push(NodeChange::new(id, ChangeKind::Detach));
            deliver(&mut batch, &mut stats);
        }

        let dirty = mem::take(&mut self.dirty);
        let mut still_dirty = Vec::new();
        for node in dirty {
            if self.collect_node(node, &mut batch) {
                still_dirty.push(node);
            }
            deliver(&mut batch, &mut stats);
        }
        for node in still_dirty {
            self.mark_dirty(node);
        }

        debug!(
            nodes = stats.nodes,
            changes = stats.changes,
            signals,
            "collected changes"
        );
        stats
    }

    /// Collect every pending change into a vector.
    pub fn take_changes(&mut self) -> Vec<NodeChange> {
        let mut changes = Vec::new();
        self.collect_changes(|change| changes.push(change));
        changes
    }

    /// Wire form of `value`.
    ///
    /// A child node without a wire id cannot be referenced; it is logged and
    /// sent as null.
    pub(crate) fn wire_value(&self, value: &Value) -> WireValue {
        self.try_wire_value(value).unwrap_or_else(|node| {
            warn!(%node, "child node has no wire id");
            WireValue::Null
        })
    }

    fn try_wire_value(&self, value: &Value) -> Result<WireValue, NodeRef> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int(i) => WireValue::Int(*i),
            Value::Double(d) => WireValue::Double(*d),
            Value::String(s) => WireValue::String(s.clone()),
            Value::Node(node) => match self.try_data(*node).and_then(|data| data.id) {
                Some(id) => WireValue::Node(id),
                None => return Err(*node),
            },
        })
    }

    /// Collect one node into `out`. Returns whether the node must stay dirty
    /// because suppressed changes are waiting on an ancestor.
    fn collect_node(&mut self, node: NodeRef, out: &mut Vec<NodeChange>) -> bool {
        let Some(data) = self.try_data(node) else {
            return false;
        };
        let Some(id) = data.id else {
            return false;
        };
        match (data.attached, data.was_attached) {
            (false, false) => return false,
            (false, true) => {
                self.forget(node);
                out.push(NodeChange::new(id, ChangeKind::Detach));
                return false;
            }
            (true, false) => {
                self.announce(node);
                out.push(NodeChange::new(id, ChangeKind::Attach));
            }
            (true, true) => {}
        }

        let suppressed = self.is_inactive(node) || self.is_inert(node);
        let registry = Arc::clone(&self.registry);
        let data = self.data_mut(node);
        let initial = data.initial_changes;
        let reported = data.reported;
        data.initial_changes = false;

        let mut skipped = false;
        let mut pending = Vec::new();
        for slot in &mut data.slots {
            let descriptor = registry.descriptor(slot.id);
            if descriptor.is_server_side() || slot.state.is_none() {
                continue;
            }
            let forced = initial && reported.contains(slot.id);
            if suppressed && !descriptor.is_emitted_when_inactive() && !forced {
                skipped = true;
                continue;
            }
            pending.push((slot.id, slot.tracker.take()));
        }

        for (feature, tracker) in pending {
            let before = out.len();
            if let Some(tracker) = tracker {
                self.tracker_changes(node, id, feature, tracker, out);
            }
            let data = self.data_mut(node);
            if out.len() == before && !data.announced.contains(feature) {
                out.push(NodeChange::new(id, ChangeKind::Empty { feature }));
            }
            data.announced.insert(feature);
        }

        skipped && !self.is_suppressed_self(node)
    }

    /// The remote side is about to learn about `node`: describe every
    /// feature from empty.
    fn announce(&mut self, node: NodeRef) {
        let registry = Arc::clone(&self.registry);
        let data = self.data_mut(node);
        data.was_attached = true;
        data.initial_changes = true;
        data.announced.clear();
        for slot in &mut data.slots {
            if registry.descriptor(slot.id).is_server_side() {
                continue;
            }
            slot.tracker = slot.state.as_ref().and_then(FeatureTracker::from_empty);
            if let Some(list) = slot.state.as_mut().and_then(FeatureState::as_list_mut) {
                list.reset_cleared();
            }
        }
    }

    /// The remote side is about to drop `node`: pending history goes with it.
    fn forget(&mut self, node: NodeRef) {
        let data = self.data_mut(node);
        data.was_attached = false;
        data.initial_changes = true;
        data.announced.clear();
        for slot in &mut data.slots {
            slot.tracker = None;
            if let Some(list) = slot.state.as_mut().and_then(FeatureState::as_list_mut) {
                list.reset_cleared();
            }
        }
    }

    fn tracker_changes(
        &self,
        node: NodeRef,
        id: NodeId,
        feature: FeatureId,
        tracker: FeatureTracker,
        out: &mut Vec<NodeChange>,
    ) {
        let Some(state) = self.data(node).state(feature) else {
            return;
        };
        match (tracker, state) {
            (FeatureTracker::Map(tracker), FeatureState::Map(map)) => {
                for (key, prior) in tracker.into_priors() {
                    let current = map.stored(&key);
                    if let Some(kind) = self.map_change(feature, key, prior, current) {
                        out.push(NodeChange::new(id, kind));
                    }
                }
            }
            (FeatureTracker::Value(tracker), FeatureState::Value(value)) => {
                if let Some(prior) = tracker.into_prior() {
                    let key = value.key().to_owned();
                    if let Some(kind) = self.map_change(feature, key, prior, value.get()) {
                        out.push(NodeChange::new(id, kind));
                    }
                }
            }
            (FeatureTracker::List(tracker), FeatureState::List(_)) => {
                for change in tracker.into_changes() {
                    let kind = match change {
                        ListChange::Add { index, items } => ChangeKind::ListAdd {
                            feature,
                            index,
                            items: items.iter().map(|item| self.wire_value(item)).collect(),
                        },
                        // A removed child may already be released.
                        ListChange::Remove { index, item } => ChangeKind::ListRemove {
                            feature,
                            index,
                            removed: self.try_wire_value(&item).unwrap_or(WireValue::Null),
                        },
                        ListChange::Clear => ChangeKind::ListClear { feature },
                    };
                    out.push(NodeChange::new(id, kind));
                }
            }
            _ => unreachable!("tracker shape does not match feature storage"),
        }
    }

    fn map_change(
        &self,
        feature: FeatureId,
        key: String,
        prior: Prior,
        current: Option<&Value>,
    ) -> Option<ChangeKind> {
        match (prior, current) {
            (Prior::Missing, None) => None,
            (Prior::Present(_), None) => Some(ChangeKind::MapRemove { feature, key }),
            (Prior::Present(old), Some(value)) if old == *value => None,
            (_, Some(value)) => Some(ChangeKind::MapPut {
                feature,
                key,
                value: self.wire_value(value),
            }),
        }
    }
}
