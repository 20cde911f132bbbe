//! Change trackers
//!
//! Per (node, feature) scratch buffers holding what changed since the last
//! flush. Trackers never fail; they only exist while the remote side knows
//! the node and are consumed by the collection pass.

use indexmap::IndexMap;

use crate::feature::{FeatureState, Value};

/// State of a key before the current batch touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Prior {
    /// The key did not exist.
    Missing,
    /// The key held this value.
    Present(Value),
}

impl Prior {
    fn of(value: Option<&Value>) -> Self {
        value.map_or(Self::Missing, |value| Self::Present(value.clone()))
    }
}

/// Map tracker: key to its pre-batch state, in first-touch order.
#[derive(Debug, Default)]
pub(crate) struct MapTracker {
    priors: IndexMap<String, Prior>,
}

impl MapTracker {
    /// Tracker that describes every key of a map as newly added.
    pub(crate) fn from_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            priors: keys
                .into_iter()
                .map(|key| (key.to_owned(), Prior::Missing))
                .collect(),
        }
    }

    /// Remember `old` as the pre-batch state of `key` unless already known.
    pub(crate) fn record(&mut self, key: &str, old: Option<&Value>) {
        if !self.priors.contains_key(key) {
            self.priors.insert(key.to_owned(), Prior::of(old));
        }
    }

    pub(crate) fn into_priors(self) -> impl Iterator<Item = (String, Prior)> {
        self.priors.into_iter()
    }
}

/// Single value tracker.
#[derive(Debug, Default)]
pub(crate) struct ValueTracker {
    prior: Option<Prior>,
}

impl ValueTracker {
    pub(crate) fn from_empty(is_set: bool) -> Self {
        Self {
            prior: is_set.then_some(Prior::Missing),
        }
    }

    pub(crate) fn record(&mut self, old: Option<&Value>) {
        if self.prior.is_none() {
            self.prior = Some(Prior::of(old));
        }
    }

    pub(crate) fn into_prior(self) -> Option<Prior> {
        self.prior
    }
}

/// One pending list operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListChange {
    /// `items` inserted starting at `index`.
    Add {
        /// Insert position.
        index: usize,
        /// Inserted items.
        items: Vec<Value>,
    },
    /// `item` removed from `index`.
    Remove {
        /// Removal position.
        index: usize,
        /// Removed item.
        item: Value,
    },
    /// Every item removed.
    Clear,
}

/// List tracker: pending operations in call order.
#[derive(Debug, Default)]
pub(crate) struct ListTracker {
    changes: Vec<ListChange>,
}

impl ListTracker {
    /// Tracker replaying a list from nothing: one clear if the list was ever
    /// cleared, then one bulk add.
    pub(crate) fn from_contents(cleared: bool, items: &[Value]) -> Self {
        let mut changes = Vec::with_capacity(2);
        if cleared {
            changes.push(ListChange::Clear);
        }
        if !items.is_empty() {
            changes.push(ListChange::Add {
                index: 0,
                items: items.to_vec(),
            });
        }
        Self { changes }
    }

    pub(crate) fn record_add(&mut self, index: usize, items: Vec<Value>) {
        if !items.is_empty() {
            self.changes.push(ListChange::Add { index, items });
        }
    }

    /// Earlier records are superseded by a clear.
    pub(crate) fn record_clear(&mut self) {
        self.changes.clear();
        self.changes.push(ListChange::Clear);
    }

    /// Record removal of `item` from `index`.
    ///
    /// If the item was inserted by a pending add record, that record is
    /// shrunk instead, and every later record is re-indexed as if the item
    /// had never existed.
    pub(crate) fn record_remove(&mut self, index: usize, item: Value) {
        match self.find_pending_add(index) {
            Some((at, offset)) => self.retract(at, offset),
            None => self.changes.push(ListChange::Remove { index, item }),
        }
    }

    /// Walk back from the current list state to the record that inserted
    /// the item now at `index`, if any. Returns the record position and the
    /// item offset within it.
    fn find_pending_add(&self, index: usize) -> Option<(usize, usize)> {
        let mut pos = index;
        for (at, change) in self.changes.iter().enumerate().rev() {
            match change {
                ListChange::Add { index, items } => {
                    let end = index + items.len();
                    if (*index..end).contains(&pos) {
                        return Some((at, pos - index));
                    }
                    if pos >= end {
                        pos -= items.len();
                    }
                }
                ListChange::Remove { index, .. } => {
                    if pos >= *index {
                        pos += 1;
                    }
                }
                // Anything before a clear is gone already.
                ListChange::Clear => return None,
            }
        }
        None
    }

    fn retract(&mut self, at: usize, offset: usize) {
        let mut pos = match &mut self.changes[at] {
            ListChange::Add { index, items } => {
                items.remove(offset);
                *index + offset
            }
            _ => unreachable!("retract target must be an add record"),
        };

        for change in &mut self.changes[at + 1..] {
            match change {
                ListChange::Add { index, items } => {
                    if *index > pos {
                        *index -= 1;
                    } else {
                        pos += items.len();
                    }
                }
                ListChange::Remove { index, .. } => {
                    if *index > pos {
                        *index -= 1;
                    } else {
                        pos -= 1;
                    }
                }
                ListChange::Clear => break,
            }
        }

        if matches!(&self.changes[at], ListChange::Add { items, .. } if items.is_empty()) {
            self.changes.remove(at);
        }
    }

    pub(crate) fn into_changes(self) -> Vec<ListChange> {
        self.changes
    }

    #[cfg(test)]
    pub(crate) fn changes(&self) -> &[ListChange] {
        &self.changes
    }
}

/// Tracker of one feature, matching its storage shape.
#[derive(Debug)]
pub(crate) enum FeatureTracker {
    Map(MapTracker),
    List(ListTracker),
    Value(ValueTracker),
}

impl FeatureTracker {
    /// Empty tracker for `state`. Server-side state has none.
    pub(crate) fn for_state(state: &FeatureState) -> Option<Self> {
        match state {
            FeatureState::Map(_) => Some(Self::Map(MapTracker::default())),
            FeatureState::List(_) => Some(Self::List(ListTracker::default())),
            FeatureState::Value(_) => Some(Self::Value(ValueTracker::default())),
            FeatureState::Inert(_) => None,
        }
    }

    /// Tracker describing `state` as built up from nothing.
    pub(crate) fn from_empty(state: &FeatureState) -> Option<Self> {
        match state {
            FeatureState::Map(map) => {
                Some(Self::Map(MapTracker::from_keys(map.iter().map(|(key, _)| key))))
            }
            FeatureState::List(list) => Some(Self::List(ListTracker::from_contents(
                list.was_cleared(),
                list.items(),
            ))),
            FeatureState::Value(value) => {
                Some(Self::Value(ValueTracker::from_empty(value.get().is_some())))
            }
            FeatureState::Inert(_) => None,
        }
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut MapTracker {
        match self {
            Self::Map(tracker) => tracker,
            _ => unreachable!("map feature with a non-map tracker"),
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> &mut ListTracker {
        match self {
            Self::List(tracker) => tracker,
            _ => unreachable!("list feature with a non-list tracker"),
        }
    }

    pub(crate) fn as_value_mut(&mut self) -> &mut ValueTracker {
        match self {
            Self::Value(tracker) => tracker,
            _ => unreachable!("value feature with a non-value tracker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn add(index: usize, items: &[&str]) -> ListChange {
        ListChange::Add {
            index,
            items: items.iter().map(|i| s(i)).collect(),
        }
    }

    fn remove(index: usize, item: &str) -> ListChange {
        ListChange::Remove {
            index,
            item: s(item),
        }
    }

    /// Applies `ops` to `list`, recording them, and returns the tracker.
    fn run(list: &mut Vec<Value>, ops: &[Op]) -> ListTracker {
        let mut tracker = ListTracker::default();
        for op in ops {
            match op {
                Op::Add(index, item) => {
                    list.insert(*index, s(item));
                    tracker.record_add(*index, vec![s(item)]);
                }
                Op::Remove(index) => {
                    let item = list.remove(*index);
                    tracker.record_remove(*index, item);
                }
            }
        }
        tracker
    }

    enum Op {
        Add(usize, &'static str),
        Remove(usize),
    }

    #[test]
    fn test_map_tracker_keeps_first_prior() {
        let mut tracker = MapTracker::default();
        tracker.record("a", None);
        tracker.record("a", Some(&Value::Int(1)));
        tracker.record("b", Some(&Value::Int(2)));
        let priors: Vec<_> = tracker.into_priors().collect();
        assert_eq!(
            priors,
            vec![
                ("a".to_owned(), Prior::Missing),
                ("b".to_owned(), Prior::Present(Value::Int(2))),
            ]
        );
    }

    #[test]
    fn test_value_tracker_keeps_first_prior() {
        let mut tracker = ValueTracker::default();
        tracker.record(Some(&Value::Null));
        tracker.record(Some(&Value::Int(3)));
        assert_eq!(tracker.into_prior(), Some(Prior::Present(Value::Null)));
        assert_eq!(ValueTracker::from_empty(false).into_prior(), None);
    }

    #[test]
    fn test_remove_of_added_item_collapses() {
        let mut list = Vec::new();
        let tracker = run(&mut list, &[Op::Add(0, "a"), Op::Add(1, "b"), Op::Remove(0)]);
        assert_eq!(tracker.changes(), &[add(0, &["b"])]);
    }

    #[test]
    fn test_remove_of_committed_item_is_recorded() {
        let mut list = vec![s("x"), s("y")];
        let tracker = run(&mut list, &[Op::Add(2, "a"), Op::Remove(0)]);
        assert_eq!(tracker.changes(), &[add(2, &["a"]), remove(0, "x")]);
    }

    #[test]
    fn test_collapse_reindexes_later_records() {
        // [] -> a -> a b -> a b c -> b c (a retracted) -> b (c removed) ...
        let mut list = Vec::new();
        let tracker = run(
            &mut list,
            &[
                Op::Add(0, "a"),
                Op::Add(1, "b"),
                Op::Add(2, "c"),
                Op::Remove(0),
            ],
        );
        assert_eq!(tracker.changes(), &[add(0, &["b"]), add(1, &["c"])]);
    }

    #[test]
    fn test_collapse_inside_bulk_add() {
        let mut tracker = ListTracker::default();
        tracker.record_add(0, vec![s("a"), s("b"), s("c")]);
        tracker.record_remove(1, s("b"));
        assert_eq!(tracker.changes(), &[add(0, &["a", "c"])]);
    }

    #[test]
    fn test_collapse_skips_over_committed_removal() {
        let mut list = vec![s("x"), s("y")];
        let tracker = run(
            &mut list,
            &[Op::Add(1, "a"), Op::Remove(0), Op::Add(0, "b"), Op::Remove(1)],
        );
        // x a y -> a y -> b a y -> b y
        assert_eq!(list, vec![s("b"), s("y")]);
        assert_eq!(tracker.changes(), &[remove(0, "x"), add(0, &["b"])]);
    }

    #[test]
    fn test_clear_supersedes_history() {
        let mut tracker = ListTracker::default();
        tracker.record_add(0, vec![s("a")]);
        tracker.record_remove(0, s("a"));
        tracker.record_clear();
        tracker.record_add(0, vec![s("b")]);
        tracker.record_remove(0, s("b"));
        assert_eq!(tracker.changes(), &[ListChange::Clear]);
    }

    #[test]
    fn test_from_contents() {
        let tracker = ListTracker::from_contents(true, &[s("a"), s("b")]);
        assert_eq!(tracker.changes(), &[ListChange::Clear, add(0, &["a", "b"])]);
        assert!(ListTracker::from_contents(false, &[]).changes().is_empty());
    }
}
