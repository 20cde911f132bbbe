//! Tree configuration.

use std::sync::Arc;

use crate::core::{DEFAULT_FIRST_NODE_ID, DEFAULT_NODE_CAPACITY};
use crate::feature::FeatureRegistry;

/// State tree configuration.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Node slots reserved up front.
    pub node_capacity: usize,

    /// Id given to the root node. Later nodes count up from here.
    pub first_node_id: u32,

    /// Emit a `trace!` event for every collected change.
    pub log_changes: bool,

    /// Feature registry. `None` uses [`FeatureRegistry::global`].
    pub registry: Option<Arc<FeatureRegistry>>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_capacity: DEFAULT_NODE_CAPACITY,
            first_node_id: DEFAULT_FIRST_NODE_ID,
            log_changes: false,
            registry: None,
        }
    }
}

impl TreeConfig {
    /// Start building a configuration.
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::new()
    }

    pub(crate) fn resolve_registry(&self) -> Arc<FeatureRegistry> {
        self.registry.clone().unwrap_or_else(FeatureRegistry::global)
    }
}

/// Builder for [`TreeConfig`].
#[derive(Debug)]
pub struct TreeConfigBuilder {
    config: TreeConfig,
}

impl TreeConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TreeConfig::default(),
        }
    }

    /// Set the number of node slots reserved up front.
    pub fn node_capacity(mut self, capacity: usize) -> Self {
        self.config.node_capacity = capacity;
        self
    }

    /// Set the id of the root node.
    pub fn first_node_id(mut self, id: u32) -> Self {
        self.config.first_node_id = id;
        self
    }

    /// Enable or disable per-change tracing.
    pub fn log_changes(mut self, enabled: bool) -> Self {
        self.config.log_changes = enabled;
        self
    }

    /// Use `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<FeatureRegistry>) -> Self {
        self.config.registry = Some(registry);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TreeConfig {
        self.config
    }
}

impl Default for TreeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
