//! Links - how a nested instance hangs off its parent template
//!
//! A link records the source template of a nested instance, the template it is
//! nested in, its alias there, and the override patch that sets it apart from
//! its source. Patch paths are relative to the nested instance's document.

use crate::alias::Alias;
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::{LinkId, TemplateId};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use void_patch::Patch;

/// An edge from a parent template to a nested instance
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    /// Template the nested instance is built from
    pub source_template: TemplateId,
    /// Template that contains the nested instance
    pub target_template: TemplateId,
    /// Alias of the nested instance inside the target template
    pub instance_alias: Alias,
    /// Overrides applied on top of the source template
    pub patch: Patch,
}

impl Link {
    /// Document form: `{"Source": .., "Patches": [..]}`
    pub fn to_dom(&self, source_path: &str) -> Value {
        json!({
            (dom::SOURCE): source_path,
            (dom::PATCHES): self.patch.to_value().unwrap_or_else(|_| json!([])),
        })
    }
}

/// Owner of every link
#[derive(Debug, Default)]
pub struct LinkTable {
    links: BTreeMap<LinkId, Link>,
    next_id: u64,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a link that will be inserted later
    pub fn allocate_id(&mut self) -> LinkId {
        self.next_id += 1;
        LinkId::new(self.next_id)
    }

    /// Register a link under its preallocated id
    pub fn insert(&mut self, link: Link) -> Result<()> {
        if self.links.contains_key(&link.id) {
            return Err(PrefabError::reference(format!("{} is already registered", link.id)));
        }
        if let Some(existing) = self.find(link.target_template, &link.instance_alias) {
            return Err(PrefabError::Validation(format!(
                "alias '{}' already has {} in {}",
                link.instance_alias, existing.id, link.target_template
            )));
        }
        self.links.insert(link.id, link);
        Ok(())
    }

    pub fn remove(&mut self, id: LinkId) -> Option<Link> {
        self.links.remove(&id)
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn contains(&self, id: LinkId) -> bool {
        self.links.contains_key(&id)
    }

    /// The link nesting `alias` inside `target`
    pub fn find(&self, target: TemplateId, alias: &Alias) -> Option<&Link> {
        self.links
            .values()
            .find(|link| link.target_template == target && &link.instance_alias == alias)
    }

    /// Links whose nested instance lives inside `target`
    pub fn targeting(&self, target: TemplateId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |link| link.target_template == target)
    }

    /// Links whose nested instance is built from `source`
    pub fn sourced_from(&self, source: TemplateId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |link| link.source_template == source)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }
}
