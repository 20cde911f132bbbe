//! String-keyed map feature storage.
//!
//! A map starts without any backing storage, holds its first key in a flat
//! single slot and only promotes to an [`IndexMap`] when a second distinct
//! key is written. Promotion is one way. Every public read behaves the same
//! in all three representations.

use indexmap::{IndexMap, IndexSet};

use super::Value;
use crate::binding::Binding;

/// One stored map entry.
#[derive(Debug)]
pub(crate) enum MapEntry {
    /// Value written by the application or the client.
    Plain(Value),
    /// Value driven by a signal. `applied` is what the diff protocol has seen.
    Bound(Binding),
}

impl MapEntry {
    /// Value visible to the diff protocol.
    pub(crate) fn stored(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Bound(binding) => binding.applied(),
        }
    }
}

#[derive(Debug, Default)]
enum Storage {
    #[default]
    Empty,
    Single(String, MapEntry),
    Many(IndexMap<String, MapEntry>),
}

/// Map feature storage.
///
/// Keys keep their first insertion order. Writes go through the owning
/// [`StateTree`](crate::tree::StateTree) so they can be tracked; this type
/// only exposes reads.
#[derive(Debug, Default)]
pub struct NodeMap {
    storage: Storage,
    client_keys: Option<IndexSet<String>>,
}

impl NodeMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`.
    ///
    /// A bound key reads through to its signal, which may be ahead of the
    /// value the diff protocol has seen so far.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.entry(key)? {
            MapEntry::Plain(value) => Some(value.clone()),
            MapEntry::Bound(binding) => Some(binding.current()),
        }
    }

    /// Value of `key` as last written into the map.
    pub fn stored(&self, key: &str) -> Option<&Value> {
        self.entry(key)?.stored()
    }

    /// Whether `key` currently holds a value. Bound keys always do.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Keys holding a value, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries().map(|(key, _)| key)
    }

    /// Key/value pairs as last written into the map, in insertion order.
    ///
    /// A bound key shows up here only once its signal value has been applied.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries()
            .filter_map(|(key, entry)| entry.stored().map(|value| (key, value)))
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Whether no key holds a value.
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Whether `key` is driven by a signal binding.
    pub fn is_bound(&self, key: &str) -> bool {
        matches!(self.entry(key), Some(MapEntry::Bound(_)))
    }

    /// Whether `key` was explicitly opened for client updates.
    pub fn allows_client_key(&self, key: &str) -> bool {
        self.client_keys
            .as_ref()
            .is_some_and(|keys| keys.contains(key))
    }

    /// Whether storage has been promoted to the general representation.
    pub(crate) fn is_promoted(&self) -> bool {
        matches!(self.storage, Storage::Many(_))
    }

    pub(crate) fn allow_client_key(&mut self, key: &str) {
        self.client_keys
            .get_or_insert_with(IndexSet::new)
            .insert(key.to_owned());
    }

    pub(crate) fn entry(&self, key: &str) -> Option<&MapEntry> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Single(k, entry) => (k == key).then_some(entry),
            Storage::Many(map) => map.get(key),
        }
    }

    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut MapEntry> {
        match &mut self.storage {
            Storage::Empty => None,
            Storage::Single(k, entry) => (k == key).then_some(entry),
            Storage::Many(map) => map.get_mut(key),
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &MapEntry)> {
        let (single, many) = match &self.storage {
            Storage::Empty => (None, None),
            Storage::Single(key, entry) => (Some((key.as_str(), entry)), None),
            Storage::Many(map) => (None, Some(map.iter().map(|(k, e)| (k.as_str(), e)))),
        };
        single.into_iter().chain(many.into_iter().flatten())
    }

    /// Keys with an active binding.
    pub(crate) fn bound_keys(&self) -> Vec<String> {
        self.entries()
            .filter(|(_, entry)| matches!(entry, MapEntry::Bound(_)))
            .map(|(key, _)| key.to_owned())
            .collect()
    }

    /// Write the diff-visible value of `key`, keeping any binding in place.
    pub(crate) fn set_stored(&mut self, key: &str, value: Option<Value>) {
        if let Some(MapEntry::Bound(binding)) = self.entry_mut(key) {
            binding.set_applied(value);
            return;
        }
        match value {
            Some(value) => self.insert_entry(key, MapEntry::Plain(value)),
            None => {
                self.remove_entry(key);
            }
        }
    }

    pub(crate) fn insert_entry(&mut self, key: &str, entry: MapEntry) {
        match std::mem::take(&mut self.storage) {
            Storage::Empty => self.storage = Storage::Single(key.to_owned(), entry),
            Storage::Single(k, _) if k == key => self.storage = Storage::Single(k, entry),
            Storage::Single(k, existing) => {
                let mut map = IndexMap::with_capacity(2);
                map.insert(k, existing);
                map.insert(key.to_owned(), entry);
                self.storage = Storage::Many(map);
            }
            Storage::Many(mut map) => {
                map.insert(key.to_owned(), entry);
                self.storage = Storage::Many(map);
            }
        }
    }

    pub(crate) fn remove_entry(&mut self, key: &str) -> Option<MapEntry> {
        if let Storage::Many(map) = &mut self.storage {
            return map.shift_remove(key);
        }
        if !matches!(&self.storage, Storage::Single(k, _) if k == key) {
            return None;
        }
        match std::mem::take(&mut self.storage) {
            Storage::Single(_, entry) => Some(entry),
            _ => None,
        }
    }
}
