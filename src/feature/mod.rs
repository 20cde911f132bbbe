//! Node features.
//!
//! A feature is a named slice of a node's state with one of three shapes:
//! - [`NodeMap`]: string keys to values, compact for zero or one entry
//! - [`NodeList`]: ordered items, either child nodes or scalars
//! - [`NodeValue`]: one optional value under a fixed key
//!
//! Server-side features ([`InertData`] and any feature registered with
//! [`FeatureDescriptor::server_side`]) never reach the diff stream.

mod builtin;
mod inert;
mod list;
mod map;
mod registry;
mod single;
mod value;

pub use builtin::features;
pub use inert::*;
pub use list::*;
pub use map::NodeMap;
pub use registry::*;
pub use single::*;
pub use value::*;

pub(crate) use map::MapEntry;

use crate::tree::NodeRef;

/// Storage of one instantiated feature.
#[derive(Debug)]
pub enum FeatureState {
    /// Map storage.
    Map(NodeMap),
    /// List storage.
    List(NodeList),
    /// Single value storage.
    Value(NodeValue),
    /// Inert settings.
    Inert(InertData),
}

impl FeatureState {
    /// Map storage, if this is a map.
    pub fn as_map(&self) -> Option<&NodeMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// List storage, if this is a list.
    pub fn as_list(&self) -> Option<&NodeList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Single value storage, if this is a single value.
    pub fn as_value(&self) -> Option<&NodeValue> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Inert settings, if this is inert data.
    pub fn as_inert(&self) -> Option<&InertData> {
        match self {
            Self::Inert(inert) => Some(inert),
            _ => None,
        }
    }

    pub(crate) fn as_map_mut(&mut self) -> Option<&mut NodeMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut NodeList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn as_value_mut(&mut self) -> Option<&mut NodeValue> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn as_inert_mut(&mut self) -> Option<&mut InertData> {
        match self {
            Self::Inert(inert) => Some(inert),
            _ => None,
        }
    }

    /// Call `f` for every child node held by this feature, in storage order.
    pub fn for_each_child(&self, mut f: impl FnMut(NodeRef)) {
        let mut visit = |value: &Value| {
            if let Value::Node(node) = value {
                f(*node);
            }
        };
        match self {
            Self::Map(map) => map.iter().for_each(|(_, value)| visit(value)),
            Self::List(list) => list.items().iter().for_each(visit),
            Self::Value(value) => value.get().into_iter().for_each(visit),
            Self::Inert(_) => {}
        }
    }
}
