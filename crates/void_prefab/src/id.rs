//! Identifiers
//!
//! Entity ids are derived from alias paths, so the same logical entity gets
//! the same id on every load. Template and link ids are handed out by their
//! owning stores.

use crate::alias::AliasPath;
use serde::{Deserialize, Serialize};
use std::fmt;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;
const SEGMENT_SEPARATOR: u8 = 0x1f;

/// Runtime id of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Derive the id from the full alias path of the entity
    ///
    /// Segments are separated so `a/bc` and `ab/c` hash differently.
    pub fn from_alias_path(path: &AliasPath) -> Self {
        let mut hash = FNV_OFFSET;
        for (i, alias) in path.iter().enumerate() {
            if i > 0 {
                hash ^= SEGMENT_SEPARATOR as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            for byte in alias.as_str().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        Self(hash)
    }

    /// Create from a raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({:016x})", self.0)
    }
}

/// Identifier of a template in the template store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(u64);

impl TemplateId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({})", self.0)
    }
}

/// Identifier of a link in the link table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(u64);

impl LinkId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.0)
    }
}
