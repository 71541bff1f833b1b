//! Instances - live nodes of the composition tree
//!
//! An [`Instance`] owns its container entity, its entities (keyed by alias) and
//! the handles of its nested instances. The [`InstanceTree`] owns every
//! instance in an arena; parent links are plain optional handles.

use crate::alias::{Alias, AliasPath};
use crate::entity::Entity;
use crate::error::{PrefabError, Result};
use crate::handle::{Arena, Handle};
use crate::id::{EntityId, LinkId, TemplateId};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Handle to an instance in the composition tree
pub type InstanceHandle = Handle<Instance>;

/// A live instance of a template
#[derive(Debug, Clone)]
pub struct Instance {
    template_id: TemplateId,
    alias: Option<Alias>,
    parent: Option<InstanceHandle>,
    link_id: Option<LinkId>,
    container: Entity,
    entities: BTreeMap<Alias, Entity>,
    entity_aliases: HashMap<EntityId, Alias>,
    nested: BTreeMap<Alias, InstanceHandle>,
    document: Value,
}

impl Instance {
    /// Create a detached instance with the given container
    pub fn new(template_id: TemplateId, alias: Option<Alias>, container: Entity) -> Self {
        Self {
            template_id,
            alias,
            parent: None,
            link_id: None,
            container,
            entities: BTreeMap::new(),
            entity_aliases: HashMap::new(),
            nested: BTreeMap::new(),
            document: Value::Null,
        }
    }

    pub fn with_link(mut self, link_id: Option<LinkId>) -> Self {
        self.link_id = link_id;
        self
    }

    pub fn template_id(&self) -> TemplateId {
        self.template_id
    }

    /// Alias within the parent instance; `None` for the root
    pub fn alias(&self) -> Option<&Alias> {
        self.alias.as_ref()
    }

    pub fn parent(&self) -> Option<InstanceHandle> {
        self.parent
    }

    pub fn link_id(&self) -> Option<LinkId> {
        self.link_id
    }

    pub(crate) fn set_link_id(&mut self, link_id: Option<LinkId>) {
        self.link_id = link_id;
    }

    pub fn container(&self) -> &Entity {
        &self.container
    }

    pub(crate) fn container_mut(&mut self) -> &mut Entity {
        &mut self.container
    }

    pub fn container_entity_id(&self) -> EntityId {
        self.container.id()
    }

    /// The document this instance was last built from
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub(crate) fn set_document(&mut self, document: Value) {
        self.document = document;
    }

    pub(crate) fn set_container(&mut self, container: Entity) {
        self.container = container;
    }

    /// Entities keyed by alias, in alias order
    pub fn entities(&self) -> &BTreeMap<Alias, Entity> {
        &self.entities
    }

    pub fn entity(&self, alias: &Alias) -> Option<&Entity> {
        self.entities.get(alias)
    }

    pub(crate) fn entity_mut_by_id(&mut self, id: EntityId) -> Option<&mut Entity> {
        let alias = self.entity_aliases.get(&id)?;
        self.entities.get_mut(alias)
    }

    /// Alias of an owned entity; the container maps to `ContainerEntity`
    pub fn entity_alias(&self, id: EntityId) -> Option<Alias> {
        if id == self.container.id() {
            return Some(Alias::container());
        }
        self.entity_aliases.get(&id).cloned()
    }

    pub fn owns_entity(&self, id: EntityId) -> bool {
        id == self.container.id() || self.entity_aliases.contains_key(&id)
    }

    /// Take ownership of an entity under `alias`
    pub fn add_entity(&mut self, alias: Alias, entity: Entity) -> Result<()> {
        if alias.is_container() || self.entities.contains_key(&alias) {
            return Err(PrefabError::Validation(format!(
                "alias '{}' is already used in this instance",
                alias
            )));
        }
        self.entity_aliases.insert(entity.id(), alias.clone());
        self.entities.insert(alias, entity);
        Ok(())
    }

    /// Give up ownership of an entity. The caller decides what happens to it.
    pub fn detach_entity(&mut self, id: EntityId) -> Option<(Alias, Entity)> {
        let alias = self.entity_aliases.remove(&id)?;
        let entity = self.entities.remove(&alias)?;
        Some((alias, entity))
    }

    /// Remove every owned entity
    pub(crate) fn take_entities(&mut self) -> BTreeMap<Alias, Entity> {
        self.entity_aliases.clear();
        std::mem::take(&mut self.entities)
    }

    /// Nested instance handles keyed by alias
    pub fn nested(&self) -> &BTreeMap<Alias, InstanceHandle> {
        &self.nested
    }

    pub fn nested_instance(&self, alias: &Alias) -> Option<InstanceHandle> {
        self.nested.get(alias).copied()
    }
}

/// Owner of every live instance
pub struct InstanceTree {
    arena: Arena<Instance>,
    root: InstanceHandle,
}

impl InstanceTree {
    /// Create a tree with `root` as its root instance
    pub fn new(root: Instance) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(root);
        Self { arena, root }
    }

    pub fn root(&self) -> InstanceHandle {
        self.root
    }

    pub fn get(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.arena.get(handle)
    }

    pub(crate) fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        self.arena.get_mut(handle)
    }

    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.arena.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceHandle, &Instance)> {
        self.arena.iter()
    }

    pub fn parent_of(&self, handle: InstanceHandle) -> Option<InstanceHandle> {
        self.get(handle)?.parent
    }

    /// `handle` followed by each of its ancestors up to the root
    pub fn ancestors(&self, handle: InstanceHandle) -> Vec<InstanceHandle> {
        let mut chain = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            if !self.contains(h) {
                break;
            }
            chain.push(h);
            current = self.parent_of(h);
        }
        chain
    }

    /// True if `handle` is `ancestor` or lies below it
    pub fn is_descendant_of(&self, handle: InstanceHandle, ancestor: InstanceHandle) -> bool {
        self.ancestors(handle).contains(&ancestor)
    }

    /// The child of `ancestor` on the path down to `handle`
    pub fn child_towards(&self, ancestor: InstanceHandle, handle: InstanceHandle) -> Option<InstanceHandle> {
        let mut current = handle;
        loop {
            let parent = self.parent_of(current)?;
            if parent == ancestor {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Aliases from the root down to `handle`
    pub fn absolute_alias_path(&self, handle: InstanceHandle) -> AliasPath {
        self.relative_alias_path(self.root, handle).unwrap_or_default()
    }

    /// Aliases from below `from` down to `to`. `None` if `to` is not under `from`.
    pub fn relative_alias_path(&self, from: InstanceHandle, to: InstanceHandle) -> Option<AliasPath> {
        let mut aliases = Vec::new();
        for handle in self.ancestors(to) {
            if handle == from {
                aliases.reverse();
                return Some(aliases.into_iter().collect());
            }
            aliases.push(self.get(handle)?.alias.clone()?);
        }
        None
    }

    /// Store a detached instance and return its handle
    pub fn insert_detached(&mut self, instance: Instance) -> InstanceHandle {
        self.arena.insert(instance)
    }

    /// Nest `child` under `parent` using the child's alias
    pub fn add_instance(&mut self, parent: InstanceHandle, child: InstanceHandle) -> Result<()> {
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(PrefabError::Validation(
                "an instance cannot be nested under itself".to_string(),
            ));
        }
        let alias = {
            let instance = self
                .get(child)
                .ok_or_else(|| PrefabError::reference(format!("instance {:?} does not exist", child)))?;
            if instance.parent.is_some() {
                return Err(PrefabError::Validation(format!(
                    "instance '{}' is already nested",
                    instance.alias.as_ref().map(Alias::as_str).unwrap_or("<root>")
                )));
            }
            instance
                .alias
                .clone()
                .ok_or_else(|| PrefabError::Validation("nested instances need an alias".to_string()))?
        };

        let parent_instance = self
            .get_mut(parent)
            .ok_or_else(|| PrefabError::reference(format!("instance {:?} does not exist", parent)))?;
        if parent_instance.nested.contains_key(&alias) {
            return Err(PrefabError::Validation(format!(
                "alias '{}' is already used in this instance",
                alias
            )));
        }
        parent_instance.nested.insert(alias, child);

        if let Some(instance) = self.get_mut(child) {
            instance.parent = Some(parent);
        }
        Ok(())
    }

    /// Unhook a nested instance from `parent`. It stays in the arena.
    pub fn detach_nested_instance(&mut self, parent: InstanceHandle, alias: &Alias) -> Option<InstanceHandle> {
        let child = self.get_mut(parent)?.nested.remove(alias)?;
        if let Some(instance) = self.get_mut(child) {
            instance.parent = None;
        }
        Some(child)
    }

    /// Remove `handle` and everything below it, children first
    pub fn destroy(&mut self, handle: InstanceHandle) -> Vec<Instance> {
        let mut removed = Vec::new();
        for descendant in self.descendants(handle).into_iter().rev() {
            if let Some(instance) = self.arena.remove(descendant) {
                removed.push(instance);
            }
        }
        removed
    }

    /// `handle` and every instance below it, parents before children
    pub fn descendants(&self, handle: InstanceHandle) -> Vec<InstanceHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(instance) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(instance.nested.values().rev().copied());
        }
        out
    }

    /// Every live instance of `template`
    pub fn instances_of(&self, template: TemplateId) -> Vec<InstanceHandle> {
        self.arena
            .iter()
            .filter(|(_, instance)| instance.template_id == template)
            .map(|(handle, _)| handle)
            .collect()
    }
}
