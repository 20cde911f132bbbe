//! Process-wide feature registry.
//!
//! Every feature type is registered exactly once. Registration order assigns
//! the small integer [`FeatureId`] used in change records and fixes the order
//! in which features of one node are emitted.
//!
//! The registry is built once at startup, optionally installed with
//! [`FeatureRegistry::install`], and read-only afterwards. Trees that are not
//! given an explicit registry use [`FeatureRegistry::global`], which falls
//! back to the built-in feature set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{FeatureState, InertData, NodeList, NodeMap, NodeValue, Value, builtin};
use crate::core::{MAX_FEATURES, RegistryError};

static GLOBAL: OnceCell<Arc<FeatureRegistry>> = OnceCell::new();

/// Name of a feature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureType(&'static str);

impl FeatureType {
    /// Declare a feature type. Names must be unique within a registry.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Feature name.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Compact feature id, equal to the registration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u8);

impl FeatureId {
    /// Id as a number.
    pub const fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set of feature ids as a bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FeatureSet(u64);

impl FeatureSet {
    pub(crate) fn insert(&mut self, id: FeatureId) {
        self.0 |= 1 << id.0;
    }

    pub(crate) fn contains(self, id: FeatureId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    pub(crate) fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Storage shape of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    /// String-keyed map ([`NodeMap`]).
    Map,
    /// Ordered list ([`NodeList`]). `nodes` lists hold child nodes only,
    /// other lists hold scalars only.
    List {
        /// Whether items are child nodes.
        nodes: bool,
    },
    /// Single value ([`NodeValue`]) published under `key`.
    Value {
        /// Key the value is published under.
        key: &'static str,
    },
    /// Inert settings ([`InertData`]). Always server-side.
    Inert,
}

/// Predicate deciding whether a feature lets its node be active.
pub type AllowsChanges = fn(&FeatureState) -> bool;

/// Predicate deciding whether the client may write `key` with `value`.
pub type ClientUpdatePolicy = fn(&NodeMap, &str, &Value) -> bool;

fn always_allows_changes(_: &FeatureState) -> bool {
    true
}

fn deny_client_updates(_: &NodeMap, _: &str, _: &Value) -> bool {
    false
}

/// Everything the tree needs to know about one feature type.
#[derive(Clone, Copy)]
pub struct FeatureDescriptor {
    feature: FeatureType,
    shape: FeatureShape,
    server_side: bool,
    emits_when_inactive: bool,
    allows_changes: AllowsChanges,
    client_policy: ClientUpdatePolicy,
}

impl FeatureDescriptor {
    const fn with_shape(feature: FeatureType, shape: FeatureShape) -> Self {
        Self {
            feature,
            shape,
            server_side: false,
            emits_when_inactive: false,
            allows_changes: always_allows_changes,
            client_policy: deny_client_updates,
        }
    }

    /// Map feature.
    pub const fn map(feature: FeatureType) -> Self {
        Self::with_shape(feature, FeatureShape::Map)
    }

    /// List of scalar values.
    pub const fn list(feature: FeatureType) -> Self {
        Self::with_shape(feature, FeatureShape::List { nodes: false })
    }

    /// List of child nodes.
    pub const fn node_list(feature: FeatureType) -> Self {
        Self::with_shape(feature, FeatureShape::List { nodes: true })
    }

    /// Single value published under `key`.
    pub const fn value(feature: FeatureType, key: &'static str) -> Self {
        Self::with_shape(feature, FeatureShape::Value { key })
    }

    /// Inert settings. Implies server-side.
    pub const fn inert(feature: FeatureType) -> Self {
        Self::with_shape(feature, FeatureShape::Inert).server_side()
    }

    /// Never emitted, never recorded, never holds child nodes.
    pub const fn server_side(mut self) -> Self {
        self.server_side = true;
        self
    }

    /// Keep emitting this feature while the node is inert or inactive.
    pub const fn emits_when_inactive(mut self) -> Self {
        self.emits_when_inactive = true;
        self
    }

    /// Predicate that turns the node inactive when it returns `false`.
    pub const fn allows_changes(mut self, predicate: AllowsChanges) -> Self {
        self.allows_changes = predicate;
        self
    }

    /// Predicate gating client updates. The default refuses everything.
    pub const fn client_policy(mut self, policy: ClientUpdatePolicy) -> Self {
        self.client_policy = policy;
        self
    }

    /// Feature type.
    pub fn feature(&self) -> FeatureType {
        self.feature
    }

    /// Storage shape.
    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    /// Whether the feature is invisible to the diff protocol.
    pub fn is_server_side(&self) -> bool {
        self.server_side
    }

    /// Whether the feature is emitted regardless of the node's activity.
    pub fn is_emitted_when_inactive(&self) -> bool {
        self.emits_when_inactive
    }

    /// Whether `state` lets its node be active.
    pub fn allows_changes_for(&self, state: &FeatureState) -> bool {
        (self.allows_changes)(state)
    }

    /// Whether the client may write `key` with `value` into `map`.
    pub fn may_update_from_client(&self, map: &NodeMap, key: &str, value: &Value) -> bool {
        (self.client_policy)(map, key, value)
    }

    /// Fresh, empty feature storage.
    pub fn create(&self) -> FeatureState {
        match self.shape {
            FeatureShape::Map => FeatureState::Map(NodeMap::new()),
            FeatureShape::List { .. } => FeatureState::List(NodeList::new()),
            FeatureShape::Value { key } => FeatureState::Value(NodeValue::new(key)),
            FeatureShape::Inert => FeatureState::Inert(InertData::new()),
        }
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("feature", &self.feature)
            .field("shape", &self.shape)
            .field("server_side", &self.server_side)
            .field("emits_when_inactive", &self.emits_when_inactive)
            .finish_non_exhaustive()
    }
}

/// Feature type table.
#[derive(Debug)]
pub struct FeatureRegistry {
    descriptors: Vec<FeatureDescriptor>,
    index: HashMap<FeatureType, FeatureId>,
}

impl FeatureRegistry {
    /// Start an empty registry.
    pub fn builder() -> FeatureRegistryBuilder {
        FeatureRegistryBuilder::default()
    }

    /// Registry holding only the built-in features.
    pub fn builtin() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Install this registry as the process-wide one.
    ///
    /// Fails if a registry was installed before, or if
    /// [`global`](Self::global) already fell back to the built-in set.
    pub fn install(self) -> Result<Arc<Self>, RegistryError> {
        let registry = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        debug!(features = registry.len(), "installed feature registry");
        Ok(registry)
    }

    /// The process-wide registry, installing the built-in set on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            debug!("installing built-in feature registry");
            Arc::new(Self::builtin())
        }))
    }

    /// Id of `feature`.
    ///
    /// # Panics
    ///
    /// Panics if `feature` is not registered.
    pub fn id(&self, feature: FeatureType) -> FeatureId {
        match self.lookup(feature) {
            Some(id) => id,
            None => panic!("feature {feature} is not registered"),
        }
    }

    /// Id of `feature`, if registered.
    pub fn lookup(&self, feature: FeatureType) -> Option<FeatureId> {
        self.index.get(&feature).copied()
    }

    /// Descriptor registered under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this registry.
    pub fn descriptor(&self, id: FeatureId) -> &FeatureDescriptor {
        &self.descriptors[id.index()]
    }

    /// Fresh storage for `feature`.
    pub fn create(&self, feature: FeatureType) -> FeatureState {
        self.descriptor(self.id(feature)).create()
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered features in id order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &FeatureDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(i, descriptor)| (FeatureId(i as u8), descriptor))
    }
}

/// Builder for [`FeatureRegistry`].
#[derive(Debug, Default)]
pub struct FeatureRegistryBuilder {
    descriptors: Vec<FeatureDescriptor>,
}

impl FeatureRegistryBuilder {
    /// Register the built-in features, in their fixed order.
    pub fn with_builtins(mut self) -> Self {
        for descriptor in builtin::descriptors() {
            self = self.register(descriptor);
        }
        self
    }

    /// Register one more feature.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate name, on more than
    /// [`MAX_FEATURES`](crate::core::MAX_FEATURES) features, or on a
    /// non-server-side inert feature.
    pub fn register(mut self, descriptor: FeatureDescriptor) -> Self {
        assert!(
            self.descriptors
                .iter()
                .all(|d| d.feature != descriptor.feature),
            "feature {} registered twice",
            descriptor.feature
        );
        assert!(
            self.descriptors.len() < MAX_FEATURES,
            "at most {MAX_FEATURES} features can be registered"
        );
        assert!(
            descriptor.shape != FeatureShape::Inert || descriptor.server_side,
            "inert feature {} must be server-side",
            descriptor.feature
        );
        self.descriptors.push(descriptor);
        self
    }

    /// Finish the registry.
    pub fn build(self) -> FeatureRegistry {
        let index = self
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, descriptor)| (descriptor.feature, FeatureId(i as u8)))
            .collect();
        FeatureRegistry {
            descriptors: self.descriptors,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::features;

    const CUSTOM: FeatureType = FeatureType::new("CustomMap");

    #[test]
    fn test_builtin_ids_follow_registration_order() {
        let registry = FeatureRegistry::builtin();
        assert_eq!(registry.id(features::ELEMENT_DATA).get(), 0);
        assert_eq!(registry.id(features::ELEMENT_PROPERTIES).get(), 1);
        assert_eq!(registry.id(features::ELEMENT_CHILDREN).get(), 2);
        assert_eq!(registry.id(features::COMPONENT_MAPPING).get(), 10);
        assert_eq!(registry.len(), 11);
    }

    #[test]
    fn test_custom_features_append() {
        let registry = FeatureRegistry::builder()
            .with_builtins()
            .register(FeatureDescriptor::map(CUSTOM))
            .build();
        let id = registry.id(CUSTOM);
        assert_eq!(id.get(), 11);
        assert_eq!(registry.descriptor(id).shape(), FeatureShape::Map);
        assert!(matches!(registry.create(CUSTOM), FeatureState::Map(_)));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let _ = FeatureRegistry::builder()
            .register(FeatureDescriptor::map(CUSTOM))
            .register(FeatureDescriptor::list(CUSTOM));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_unregistered_lookup_panics() {
        FeatureRegistry::builder().build().id(CUSTOM);
    }

    #[test]
    fn test_global_is_installed_once() {
        let global = FeatureRegistry::global();
        assert!(global.lookup(features::ELEMENT_DATA).is_some());
        assert_eq!(
            FeatureRegistry::builtin().install().err(),
            Some(RegistryError::AlreadyInstalled)
        );
        assert!(Arc::ptr_eq(&global, &FeatureRegistry::global()));
    }

    #[test]
    fn test_default_client_policy_denies() {
        let descriptor = FeatureDescriptor::map(CUSTOM);
        assert!(!descriptor.may_update_from_client(&NodeMap::new(), "key", &Value::Null));
        assert!(descriptor.allows_changes_for(&descriptor.create()));
    }

    #[test]
    fn test_feature_set() {
        let mut set = FeatureSet::default();
        set.insert(FeatureId(0));
        set.insert(FeatureId(63));
        assert!(set.contains(FeatureId(63)));
        assert!(!set.contains(FeatureId(1)));
        set.clear();
        assert!(!set.contains(FeatureId(0)));
    }
}
