//! Error types for the state tree.
//!
//! Only recoverable conditions live here. Broken calling contracts (wrong
//! feature shape, second parent, foreign node handles, ...) panic instead,
//! because they point at a bug in the caller rather than at runtime input.

use thiserror::Error;

use crate::tree::NodeRef;

/// Errors raised when a write to a map entry is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The feature does not accept this key from the client.
    #[error("update of '{key}' in {feature} is not permitted")]
    NotPermitted {
        /// Name of the feature that refused the update.
        feature: &'static str,
        /// Refused key.
        key: String,
    },

    /// The key is driven by an active signal binding.
    #[error("'{key}' in {feature} is bound to a signal and cannot be written directly")]
    BindingActive {
        /// Name of the feature holding the binding.
        feature: &'static str,
        /// Bound key.
        key: String,
    },

    /// The node is not attached, so the client cannot know about it.
    #[error("node {node:?} is not attached")]
    NodeDetached {
        /// Target node.
        node: NodeRef,
    },

    /// The node is inert or inactive and does not accept client input.
    #[error("node {node:?} is inert or inactive")]
    NodeInactive {
        /// Target node.
        node: NodeRef,
    },
}

impl UpdateError {
    /// Key the refused update was aimed at, if the error is key specific.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NotPermitted { key, .. } | Self::BindingActive { key, .. } => Some(key),
            Self::NodeDetached { .. } | Self::NodeInactive { .. } => None,
        }
    }
}

/// Errors raised when binding a map entry to a signal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The key already has an active binding.
    #[error("'{key}' in {feature} is already bound to a signal")]
    AlreadyBound {
        /// Name of the feature holding the binding.
        feature: &'static str,
        /// Bound key.
        key: String,
    },
}

/// Errors raised by the process-wide feature registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A registry is already installed (explicitly or by first use).
    #[error("feature registry already installed")]
    AlreadyInstalled,
}

/// Top-level state tree errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Refused write.
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// Refused binding.
    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    /// Registry misuse.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_feature_and_key() {
        let err = UpdateError::NotPermitted {
            feature: "ElementPropertyMap",
            key: "value".into(),
        };
        assert_eq!(
            err.to_string(),
            "update of 'value' in ElementPropertyMap is not permitted"
        );
        assert_eq!(err.key(), Some("value"));

        let err = BindingError::AlreadyBound {
            feature: "ElementAttributeMap",
            key: "title".into(),
        };
        assert!(err.to_string().contains("ElementAttributeMap"));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_tree_error_from() {
        let err: TreeError = UpdateError::BindingActive {
            feature: "ElementPropertyMap",
            key: "value".into(),
        }
        .into();
        assert!(matches!(err, TreeError::Update(UpdateError::BindingActive { .. })));

        let err: TreeError = RegistryError::AlreadyInstalled.into();
        assert_eq!(err.to_string(), "registry error: feature registry already installed");
    }
}
