//! The composition world
//!
//! [`PrefabWorld`] owns everything the prefab system mutates: the template
//! store, the link table, the instance tree, the entity index and the undo
//! log. All operations take it by reference; there is no global state.
//!
//! ```text
//! live edit ──► diff ──► qualify ──┬──► template patch (source edit)
//!                                  └──► link patch     (override edit)
//!                                            │
//!                                            ▼
//!                               propagate_template_changes
//! ```

mod create_prefab;
mod delete;
mod detach;
mod duplicate;
mod edit;
mod history;
mod instantiate;
mod load;
mod propagate;
mod reparent;
mod selection;

pub use edit::PatchScope;

use crate::alias::{Alias, AliasGenerator, AliasPath};
use crate::config::PrefabConfig;
use crate::dom;
use crate::entity::{Entity, Transform};
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use crate::instance::{Instance, InstanceHandle, InstanceTree};
use crate::link::LinkTable;
use crate::template::{Template, TemplateStore};
use crate::transaction::TransactionLog;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Which instance owns an entity, and under which alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOwner {
    pub instance: InstanceHandle,
    /// `ContainerEntity` for the instance's own container
    pub alias: Alias,
}

impl EntityOwner {
    pub fn is_container(&self) -> bool {
        self.alias.is_container()
    }
}

/// Owner of templates, links, live instances and undo history
pub struct PrefabWorld {
    config: PrefabConfig,
    aliases: AliasGenerator,
    templates: TemplateStore,
    links: LinkTable,
    tree: InstanceTree,
    entity_index: HashMap<EntityId, EntityOwner>,
    /// Entity documents as of the last rebuild; the "before" side of edits
    dom_cache: HashMap<EntityId, Value>,
    focus: InstanceHandle,
    history: TransactionLog,
    /// Link patches read from documents whose source template is not loaded yet
    pending_links: Vec<load::PendingLink>,
    created_entities: u64,
}

impl PrefabWorld {
    /// Create a world whose root is an empty template at `root_source_path`
    pub fn new(config: PrefabConfig, root_source_path: &str) -> Result<Self> {
        let document = dom::empty_template(&dom::name_from_source(root_source_path));
        Self::with_root_document(config, root_source_path, document)
    }

    /// Create a world whose root is built from `document`
    ///
    /// Nested instances whose templates are not loaded yet are skipped until
    /// [`load_template`](Self::load_template) brings them in.
    pub fn with_root_document(config: PrefabConfig, root_source_path: &str, document: Value) -> Result<Self> {
        config.validate()?;
        let mut templates = TemplateStore::new();
        let root_template = templates.insert(root_source_path, document, false)?;

        let container_id = EntityId::from_alias_path(&AliasPath::new().join(Alias::container()));
        let tree = InstanceTree::new(Instance::new(root_template, None, Entity::new(container_id, "")));
        let root = tree.root();

        let mut world = Self {
            aliases: AliasGenerator::new(&config.entity_alias_prefix, &config.instance_alias_prefix),
            history: TransactionLog::new(config.history_limit),
            config,
            templates,
            links: LinkTable::new(),
            tree,
            entity_index: HashMap::new(),
            dom_cache: HashMap::new(),
            focus: root,
            pending_links: Vec::new(),
            created_entities: 0,
        };
        world.import_links(root_template)?;
        world.rebuild_instance(root)?;
        log::debug!("Composition world created with root '{}'", root_source_path);
        Ok(world)
    }

    pub fn config(&self) -> &PrefabConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn instances(&self) -> &InstanceTree {
        &self.tree
    }

    pub fn history(&self) -> &TransactionLog {
        &self.history
    }

    pub fn aliases(&self) -> &AliasGenerator {
        &self.aliases
    }

    /// The composition root
    pub fn root(&self) -> InstanceHandle {
        self.tree.root()
    }

    pub fn root_template(&self) -> Result<TemplateId> {
        Ok(self.instance_ref(self.tree.root())?.template_id())
    }

    pub fn instance(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.tree.get(handle)
    }

    /// The instance whose template receives source edits
    pub fn focused_instance(&self) -> InstanceHandle {
        self.focus
    }

    pub fn set_focus(&mut self, handle: InstanceHandle) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(PrefabError::Validation(format!("cannot focus missing instance {:?}", handle)));
        }
        self.focus = handle;
        Ok(())
    }

    /// True if the template changed since it was loaded or saved
    pub fn has_unsaved_changes(&self, id: TemplateId) -> bool {
        self.templates.get(id).map_or(false, Template::is_dirty)
    }

    /// Clear the dirty flag once the caller has written the template out
    pub fn mark_saved(&mut self, id: TemplateId) -> Result<()> {
        self.templates.mark_saved(id)
    }

    // ----- entities ----------------------------------------------------------

    pub fn entity_owner(&self, id: EntityId) -> Result<&EntityOwner> {
        self.entity_index
            .get(&id)
            .ok_or_else(|| PrefabError::reference(format!("{} is not owned by any instance", id)))
    }

    pub fn owning_instance(&self, id: EntityId) -> Option<InstanceHandle> {
        self.entity_index.get(&id).map(|owner| owner.instance)
    }

    /// Source path of the template that owns `id`
    pub fn owning_instance_prefab_path(&self, id: EntityId) -> Option<&str> {
        let instance = self.tree.get(self.owning_instance(id)?)?;
        self.templates.get(instance.template_id()).map(Template::source_path)
    }

    /// True if `id` is the container entity of some instance
    pub fn is_instance_container_entity(&self, id: EntityId) -> bool {
        self.entity_index.get(&id).map_or(false, EntityOwner::is_container)
    }

    /// True if `id` belongs to an instance of a procedural template
    pub fn is_owned_by_procedural_prefab_instance(&self, id: EntityId) -> bool {
        self.owning_instance(id)
            .and_then(|handle| self.tree.get(handle))
            .and_then(|instance| self.templates.get(instance.template_id()))
            .map_or(false, Template::is_procedural)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        let owner = self.entity_index.get(&id)?;
        let instance = self.tree.get(owner.instance)?;
        if owner.is_container() {
            Some(instance.container())
        } else {
            instance.entity(&owner.alias)
        }
    }

    /// Mutate live entity state. Call [`update_entity`](Self::update_entity)
    /// to record the change in the templates.
    pub fn edit_entity<F>(&mut self, id: EntityId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Entity),
    {
        let owner = self.entity_owner(id)?.clone();
        let instance = self
            .tree
            .get_mut(owner.instance)
            .ok_or_else(|| PrefabError::reference(format!("owner of {} is gone", id)))?;
        let entity = if owner.is_container() {
            Some(instance.container_mut())
        } else {
            instance.entity_mut_by_id(id)
        };
        let entity = entity.ok_or_else(|| PrefabError::reference(format!("{} is indexed but missing", id)))?;
        f(entity);
        Ok(())
    }

    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) -> Result<()> {
        self.edit_entity(id, |e| e.set_parent(parent))
    }

    pub fn set_local_transform(&mut self, id: EntityId, translation: [f32; 3], rotation: [f32; 4]) -> Result<()> {
        self.edit_entity(id, |e| {
            e.set_local_translation(translation);
            e.set_local_rotation(rotation);
        })
    }

    pub fn parent_id(&self, id: EntityId) -> Option<EntityId> {
        self.entity(id)?.parent_id()
    }

    /// Live entities whose parent is `id`, in id order
    pub fn children_of(&self, id: EntityId) -> Vec<EntityId> {
        let mut children: Vec<EntityId> = self
            .tree
            .iter()
            .flat_map(|(_, instance)| {
                std::iter::once(instance.container()).chain(instance.entities().values())
            })
            .filter(|entity| entity.parent_id() == Some(id))
            .map(Entity::id)
            .collect();
        children.sort();
        children
    }

    /// Container entity of an instance
    pub fn container_entity_id(&self, handle: InstanceHandle) -> Result<EntityId> {
        Ok(self.instance_ref(handle)?.container_entity_id())
    }

    // ----- documents ---------------------------------------------------------

    /// Generate the document of a live entity
    pub fn entity_document(&self, id: EntityId) -> Result<Value> {
        let owner = self.entity_owner(id)?;
        let entity = self
            .entity(id)
            .ok_or_else(|| PrefabError::reference(format!("{} is indexed but missing", id)))?;
        let frame = self.entity_frame(owner);
        let parent_ref = entity.parent_id().and_then(|parent| self.reference_for(frame, parent));
        Ok(entity.to_document(owner.alias.as_str(), parent_ref))
    }

    /// Generate the document of a live instance
    pub fn instance_document(&self, handle: InstanceHandle) -> Result<Value> {
        let instance = self.instance_ref(handle)?;
        let container = self.entity_document(instance.container_entity_id())?;

        let mut entities = Map::new();
        for (alias, entity) in instance.entities() {
            entities.insert(alias.to_string(), self.entity_document(entity.id())?);
        }
        let mut nested = Map::new();
        for (alias, child) in instance.nested() {
            let template = self.instance_ref(*child)?.template_id();
            nested.insert(alias.to_string(), dom::instance_entry(&self.templates.describe(template)));
        }

        let mut document = Map::new();
        document.insert(crate::alias::CONTAINER_ALIAS.to_string(), container);
        document.insert(dom::ENTITIES.to_string(), Value::Object(entities));
        document.insert(dom::INSTANCES.to_string(), Value::Object(nested));
        Ok(Value::Object(document))
    }

    /// The whole live tree, for comparisons and debugging
    pub fn snapshot(&self) -> Result<Value> {
        self.snapshot_instance(self.tree.root())
    }

    fn snapshot_instance(&self, handle: InstanceHandle) -> Result<Value> {
        let instance = self.instance_ref(handle)?;
        let mut ids = Map::new();
        ids.insert(
            crate::alias::CONTAINER_ALIAS.to_string(),
            json!(instance.container_entity_id().raw()),
        );
        for (alias, entity) in instance.entities() {
            ids.insert(alias.to_string(), json!(entity.id().raw()));
        }
        let mut nested = Map::new();
        for (alias, child) in instance.nested() {
            nested.insert(alias.to_string(), self.snapshot_instance(*child)?);
        }
        Ok(json!({
            "template": self.templates.describe(instance.template_id()),
            "document": self.instance_document(handle)?,
            "ids": ids,
            "nested": nested,
        }))
    }

    // ----- internal helpers --------------------------------------------------

    pub(crate) fn instance_ref(&self, handle: InstanceHandle) -> Result<&Instance> {
        self.tree
            .get(handle)
            .ok_or_else(|| PrefabError::reference(format!("instance {:?} does not exist", handle)))
    }

    pub(crate) fn instance_template(&self, handle: InstanceHandle) -> Result<TemplateId> {
        Ok(self.instance_ref(handle)?.template_id())
    }

    pub(crate) fn cached_document(&self, id: EntityId) -> Result<Value> {
        self.dom_cache
            .get(&id)
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("no document cached for {}", id)))
    }

    /// Instance that parent references of this entity are relative to
    pub(crate) fn entity_frame(&self, owner: &EntityOwner) -> Option<InstanceHandle> {
        if owner.is_container() {
            self.tree.parent_of(owner.instance)
        } else {
            Some(owner.instance)
        }
    }

    /// Reference to `target` as seen from `frame`; `None` if it lies outside
    pub(crate) fn reference_for(&self, frame: Option<InstanceHandle>, target: EntityId) -> Option<String> {
        let frame = frame?;
        let owner = self.entity_index.get(&target)?;
        let path = self.tree.relative_alias_path(frame, owner.instance)?;
        Some(path.join(owner.alias.clone()).to_string())
    }

    /// Live parents of `id`, nearest first
    pub(crate) fn entity_ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            if parent == id || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.parent_id(parent);
        }
        chain
    }

    /// Absolute id of `alias` inside `instance`
    pub(crate) fn entity_id_in(&self, instance: InstanceHandle, alias: &Alias) -> EntityId {
        EntityId::from_alias_path(&self.tree.absolute_alias_path(instance).join(alias.clone()))
    }

    /// Id of the container of nested instance `alias` inside `instance`
    pub(crate) fn nested_container_id(&self, instance: InstanceHandle, alias: &Alias) -> EntityId {
        EntityId::from_alias_path(
            &self
                .tree
                .absolute_alias_path(instance)
                .join(alias.clone())
                .join(Alias::container()),
        )
    }

    pub(crate) fn next_entity_name(&mut self) -> String {
        self.created_entities += 1;
        format!("{}{}", self.config.default_entity_name, self.created_entities)
    }

    pub(crate) fn transform_of(&self, id: EntityId) -> Result<Transform> {
        self.entity(id)
            .map(|e| *e.transform())
            .ok_or_else(|| PrefabError::reference(format!("{} is not owned by any instance", id)))
    }
}

/// Resolve a parent reference relative to the instance at `frame_path`
pub(crate) fn resolve_reference(frame_path: Option<&AliasPath>, reference: &str) -> Option<EntityId> {
    let mut path = frame_path?.clone();
    for segment in reference.split('/') {
        if segment.is_empty() {
            return None;
        }
        path.push(Alias::from(segment));
    }
    Some(EntityId::from_alias_path(&path))
}
