//! Error types for prefab composition

use thiserror::Error;
use void_patch::PatchError;

/// Prefab composition errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrefabError {
    /// Malformed or empty input; nothing was mutated
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation would make a template nest itself
    #[error("Cyclical dependency detected ({candidate} depends on {ancestor})")]
    Cycle {
        /// Source path of the template being placed
        candidate: String,
        /// Source path of the ancestor it would end up containing
        ancestor: String,
    },

    /// An alias, entity, instance or link that should exist does not
    #[error("Reference error: {0}")]
    Reference(String),

    /// A template document could not be patched or rebuilt
    #[error("Propagation failure in template '{template}': {reason}")]
    Propagation { template: String, reason: String },

    /// Configuration could not be parsed or serialized
    #[error("Invalid prefab configuration: {0}")]
    Config(String),
}

impl PrefabError {
    /// Build a reference error and report it. These signal a broken invariant.
    pub(crate) fn reference(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("{}", message);
        PrefabError::Reference(message)
    }

    pub(crate) fn propagation(template: impl Into<String>, err: &PatchError) -> Self {
        PrefabError::Propagation {
            template: template.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for prefab operations
pub type Result<T> = std::result::Result<T, PrefabError>;
