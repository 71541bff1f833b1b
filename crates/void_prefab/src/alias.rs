//! Aliases - stable names for entities and nested instances
//!
//! An alias identifies an entity or a nested instance within its immediate
//! owning instance. Aliases are generated from random 64-bit values so that
//! documents merged or duplicated later never collide in practice.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Alias of a container entity inside its own instance document
pub const CONTAINER_ALIAS: &str = "ContainerEntity";

/// An entity or instance alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alias(String);

impl Alias {
    pub fn new(alias: impl Into<String>) -> Self {
        Self(alias.into())
    }

    /// The alias every container entity has within its own instance
    pub fn container() -> Self {
        Self(CONTAINER_ALIAS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_container(&self) -> bool {
        self.0 == CONTAINER_ALIAS
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Alias {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Alias {
    fn from(alias: &str) -> Self {
        Self(alias.to_string())
    }
}

impl From<String> for Alias {
    fn from(alias: String) -> Self {
        Self(alias)
    }
}

/// Produces fresh aliases with configured prefixes
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    entity_prefix: String,
    instance_prefix: String,
}

impl AliasGenerator {
    pub fn new(entity_prefix: impl Into<String>, instance_prefix: impl Into<String>) -> Self {
        Self {
            entity_prefix: entity_prefix.into(),
            instance_prefix: instance_prefix.into(),
        }
    }

    /// A new entity alias, e.g. `Entity_[9270131748265]`
    pub fn entity_alias(&self) -> Alias {
        Self::generate(&self.entity_prefix)
    }

    /// A new nested instance alias, e.g. `Instance_[1200495813]`
    pub fn instance_alias(&self) -> Alias {
        Self::generate(&self.instance_prefix)
    }

    fn generate(prefix: &str) -> Alias {
        let bits = Uuid::new_v4().as_u128();
        let value = (bits >> 64) as u64 ^ bits as u64;
        Alias(format!("{}_[{}]", prefix, value))
    }
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new("Entity", "Instance")
    }
}

/// Ordered aliases from the composition root down to an instance
///
/// The root instance contributes no segment, so the root's path is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AliasPath(Vec<Alias>);

impl AliasPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, alias: Alias) {
        self.0.push(alias);
    }

    /// Return a copy with one more alias
    pub fn join(&self, alias: impl Into<Alias>) -> Self {
        let mut path = self.clone();
        path.push(alias.into());
        path
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Alias> {
        self.0.iter()
    }
}

impl fmt::Display for AliasPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alias) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(alias.as_str())?;
        }
        Ok(())
    }
}

impl FromIterator<Alias> for AliasPath {
    fn from_iter<T: IntoIterator<Item = Alias>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_aliases_are_distinct() {
        let aliases = AliasGenerator::default();
        let generated: HashSet<Alias> = (0..1000).map(|_| aliases.entity_alias()).collect();
        assert_eq!(generated.len(), 1000);
    }

    #[test]
    fn test_alias_format() {
        let aliases = AliasGenerator::new("Ent", "Inst");
        let entity = aliases.entity_alias();
        let instance = aliases.instance_alias();
        assert!(entity.as_str().starts_with("Ent_["));
        assert!(instance.as_str().starts_with("Inst_["));
        assert!(entity.as_str().ends_with(']'));
        assert!(!entity.as_str().contains('/'));
    }

    #[test]
    fn test_alias_path_display() {
        let path = AliasPath::new().join("Instance_[1]").join("Entity_[2]");
        assert_eq!(path.to_string(), "Instance_[1]/Entity_[2]");
        assert_eq!(AliasPath::new().to_string(), "");
    }
}
