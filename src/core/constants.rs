//! Fixed names and defaults shared by the tree, the features and the
//! collection pass.
//!
//! Feature names double as the registry identity of the built-in features,
//! so they MUST NOT change between releases.

// =============================================================================
// BUILT-IN FEATURE NAMES
// =============================================================================

/// Element tag, payload and visibility.
pub const FEATURE_ELEMENT_DATA: &str = "ElementData";

/// Element properties (client-writable for allowed keys).
pub const FEATURE_ELEMENT_PROPERTIES: &str = "ElementPropertyMap";

/// Ordered element children.
pub const FEATURE_ELEMENT_CHILDREN: &str = "ElementChildrenList";

/// Element attributes.
pub const FEATURE_ELEMENT_ATTRIBUTES: &str = "ElementAttributeMap";

/// Registered DOM event listeners.
pub const FEATURE_ELEMENT_LISTENERS: &str = "ElementListenerMap";

/// Element class names.
pub const FEATURE_ELEMENT_CLASSES: &str = "ElementClassList";

/// Inline style properties.
pub const FEATURE_ELEMENT_STYLES: &str = "ElementStylePropertyMap";

/// Text content of a text node.
pub const FEATURE_TEXT_NODE: &str = "TextNodeMap";

/// Children that are attached but not rendered in place.
pub const FEATURE_VIRTUAL_CHILDREN: &str = "VirtualChildrenList";

/// Server-side inert bookkeeping.
pub const FEATURE_INERT_DATA: &str = "InertData";

/// Server-side link from a node to the component that owns it.
pub const FEATURE_COMPONENT_MAPPING: &str = "ComponentMapping";

// =============================================================================
// WELL-KNOWN KEYS
// =============================================================================

/// Element tag name key in [`FEATURE_ELEMENT_DATA`].
pub const KEY_TAG: &str = "tag";

/// Opaque payload key in [`FEATURE_ELEMENT_DATA`].
pub const KEY_PAYLOAD: &str = "payload";

/// Visibility key in [`FEATURE_ELEMENT_DATA`]. `false` makes the node inactive.
pub const KEY_VISIBLE: &str = "visible";

/// Single-value key of [`FEATURE_TEXT_NODE`].
pub const KEY_TEXT: &str = "text";

/// Single-value key of [`FEATURE_COMPONENT_MAPPING`].
pub const KEY_COMPONENT: &str = "component";

// =============================================================================
// LIMITS AND DEFAULTS
// =============================================================================

/// Maximum number of feature types a registry can hold.
///
/// Per-node feature sets are a 64-bit mask.
pub const MAX_FEATURES: usize = 64;

/// Default number of node slots reserved when a tree is created.
pub const DEFAULT_NODE_CAPACITY: usize = 64;

/// Id handed to the root node of a new tree.
pub const DEFAULT_FIRST_NODE_ID: u32 = 1;
