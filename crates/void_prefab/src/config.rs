//! Prefab system configuration

use crate::error::{PrefabError, Result};
use serde::{Deserialize, Serialize};

/// Composition world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefabConfig {
    /// Prefix for generated entity aliases (`Entity_[...]`)
    pub entity_alias_prefix: String,

    /// Prefix for generated nested instance aliases (`Instance_[...]`)
    pub instance_alias_prefix: String,

    /// Name given to entities created without one
    pub default_entity_name: String,

    /// Maximum number of undoable batches kept
    pub history_limit: usize,

    /// Fail propagation on link patch ops that no longer resolve,
    /// instead of skipping them with a warning
    pub strict_link_patches: bool,
}

impl Default for PrefabConfig {
    fn default() -> Self {
        Self {
            entity_alias_prefix: "Entity".to_string(),
            instance_alias_prefix: "Instance".to_string(),
            default_entity_name: "Entity".to_string(),
            history_limit: 100,
            strict_link_patches: false,
        }
    }
}

impl PrefabConfig {
    /// Configuration that treats stale link patches as errors
    pub fn strict() -> Self {
        Self {
            strict_link_patches: true,
            ..Default::default()
        }
    }

    /// Set the undo history limit
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Parse from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PrefabError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| PrefabError::Config(e.to_string()))
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.entity_alias_prefix.is_empty() || self.instance_alias_prefix.is_empty() {
            return Err(PrefabError::Config("alias prefixes must not be empty".to_string()));
        }
        if self.entity_alias_prefix == self.instance_alias_prefix {
            return Err(PrefabError::Config(format!(
                "entity and instance alias prefixes are both '{}'",
                self.entity_alias_prefix
            )));
        }
        if self.history_limit == 0 {
            return Err(PrefabError::Config("history_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}
