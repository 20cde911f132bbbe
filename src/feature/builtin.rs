//! Built-in element and text features.

use super::{FeatureDescriptor, FeatureState, NodeMap, Value};
use crate::core::*;

/// Built-in feature types.
pub mod features {
    use crate::core::*;
    use crate::feature::FeatureType;

    /// Element tag, payload and visibility. Always emitted.
    pub const ELEMENT_DATA: FeatureType = FeatureType::new(FEATURE_ELEMENT_DATA);
    /// Element properties.
    pub const ELEMENT_PROPERTIES: FeatureType = FeatureType::new(FEATURE_ELEMENT_PROPERTIES);
    /// Element children.
    pub const ELEMENT_CHILDREN: FeatureType = FeatureType::new(FEATURE_ELEMENT_CHILDREN);
    /// Element attributes.
    pub const ELEMENT_ATTRIBUTES: FeatureType = FeatureType::new(FEATURE_ELEMENT_ATTRIBUTES);
    /// Event listeners.
    pub const ELEMENT_LISTENERS: FeatureType = FeatureType::new(FEATURE_ELEMENT_LISTENERS);
    /// Class names.
    pub const ELEMENT_CLASSES: FeatureType = FeatureType::new(FEATURE_ELEMENT_CLASSES);
    /// Inline styles.
    pub const ELEMENT_STYLES: FeatureType = FeatureType::new(FEATURE_ELEMENT_STYLES);
    /// Text content.
    pub const TEXT_NODE: FeatureType = FeatureType::new(FEATURE_TEXT_NODE);
    /// Virtual children.
    pub const VIRTUAL_CHILDREN: FeatureType = FeatureType::new(FEATURE_VIRTUAL_CHILDREN);
    /// Inert settings.
    pub const INERT_DATA: FeatureType = FeatureType::new(FEATURE_INERT_DATA);
    /// Owning component.
    pub const COMPONENT_MAPPING: FeatureType = FeatureType::new(FEATURE_COMPONENT_MAPPING);
}

/// An element is inactive while it is explicitly hidden.
fn element_visible(state: &FeatureState) -> bool {
    state
        .as_map()
        .is_none_or(|map| map.stored(KEY_VISIBLE) != Some(&Value::Bool(false)))
}

/// Properties are client writable only for keys the application opened.
fn opened_property(map: &NodeMap, key: &str, _value: &Value) -> bool {
    map.allows_client_key(key)
}

pub(crate) fn descriptors() -> [FeatureDescriptor; 11] {
    [
        FeatureDescriptor::map(features::ELEMENT_DATA)
            .emits_when_inactive()
            .allows_changes(element_visible),
        FeatureDescriptor::map(features::ELEMENT_PROPERTIES).client_policy(opened_property),
        FeatureDescriptor::node_list(features::ELEMENT_CHILDREN),
        FeatureDescriptor::map(features::ELEMENT_ATTRIBUTES),
        FeatureDescriptor::map(features::ELEMENT_LISTENERS),
        FeatureDescriptor::list(features::ELEMENT_CLASSES),
        FeatureDescriptor::map(features::ELEMENT_STYLES),
        FeatureDescriptor::value(features::TEXT_NODE, KEY_TEXT),
        FeatureDescriptor::node_list(features::VIRTUAL_CHILDREN),
        FeatureDescriptor::inert(features::INERT_DATA),
        FeatureDescriptor::value(features::COMPONENT_MAPPING, KEY_COMPONENT).server_side(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_element_disallows_changes() {
        let mut state = FeatureState::Map(NodeMap::new());
        assert!(element_visible(&state));

        let map = state.as_map_mut().unwrap();
        map.set_stored(KEY_VISIBLE, Some(Value::Bool(false)));
        assert!(!element_visible(&state));
    }

    #[test]
    fn test_server_side_builtins() {
        let server_side: Vec<_> = descriptors()
            .iter()
            .filter(|d| d.is_server_side())
            .map(|d| d.feature())
            .collect();
        assert_eq!(server_side, vec![features::INERT_DATA, features::COMPONENT_MAPPING]);
    }
}
