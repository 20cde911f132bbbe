//! # state-tree
//!
//! Server-side state tree with change tracking.
//!
//! A [`StateTree`](tree::StateTree) holds nodes whose state is split into
//! *features*: small maps, lists and single values declared per node. Every
//! mutation is recorded, and one collection pass turns the accumulated
//! history into a minimal stream of [`NodeChange`](sync::NodeChange) records
//! that a transport layer can ship to a remote mirror.
//!
//! - **Minimal diffs**: equal writes are no-ops, map keys report their net
//!   change, list inserts removed within the same batch never reach the wire
//! - **Lifecycle**: nodes attached to the tree are replayed from empty, and
//!   detached nodes drop their pending history
//! - **Status**: inert and inactive subtrees hold back their changes
//! - **Bindings**: map entries can follow an external signal
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and collaborator traits
//! - [`feature`]: values, feature storage and the feature registry
//! - [`tree`]: the node arena, lifecycle and accessors
//! - [`sync`]: change records, trackers and the collection pass
//! - [`binding`]: signal bindings
//!
//! ## Example Usage
//!
//! ```rust
//! use state_tree::prelude::*;
//!
//! let mut tree = StateTree::new(&[features::ELEMENT_DATA, features::ELEMENT_CHILDREN]);
//! let root = tree.root();
//! tree.take_changes();
//!
//! let item = tree.create_node(&[features::ELEMENT_DATA, features::ELEMENT_CLASSES]);
//! tree.map_mut(item, features::ELEMENT_DATA).put("tag", "li")?;
//! tree.list_mut(root, features::ELEMENT_CHILDREN).push(item);
//!
//! let mut classes = tree.list_mut(item, features::ELEMENT_CLASSES);
//! classes.push("selected");
//!
//! for change in tree.take_changes() {
//!     println!("{change}");
//! }
//! assert!(!tree.has_dirty_nodes());
//! # Ok::<(), UpdateError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod binding;
pub mod core;
pub mod feature;
pub mod sync;
pub mod tree;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    // Feature model
    pub use crate::feature::{
        FeatureDescriptor, FeatureId, FeatureRegistry, FeatureRegistryBuilder, FeatureShape,
        FeatureState, FeatureType, InertData, NodeList, NodeMap, NodeValue, Value, features,
    };

    // Tree
    pub use crate::tree::{
        Lifecycle, ListMut, ListView, ListenerId, MapMut, MapView, NodeId, NodeRef, StateTree,
        TreeConfig, TreeConfigBuilder,
    };

    // Diff stream
    pub use crate::sync::{ChangeKind, FlushStats, NodeChange, WireValue};

    // Bindings
    pub use crate::binding::{Subscription, ValueSignal};
}

pub use crate::core::{BindingError, RegistryError, TreeError, UpdateError};
pub use crate::feature::{FeatureRegistry, FeatureType, Value};
pub use crate::sync::{ChangeKind, NodeChange, WireValue};
pub use crate::tree::{NodeId, NodeRef, StateTree, TreeConfig};
