//! Turning live edits into template or link patches

use super::PrefabWorld;
use crate::alias::{Alias, CONTAINER_ALIAS};
use crate::dom;
use crate::entity::{Entity, Transform};
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, LinkId, TemplateId};
use crate::instance::InstanceHandle;
use crate::transaction::Batch;
use serde_json::{json, Map, Value};
use void_patch::{diff, DocPath, Patch, PatchOp};

/// What a patch is relative to before qualification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchScope {
    /// The entity's own document
    Entity(EntityId),
    /// A nested instance's document
    Instance(InstanceHandle),
}

/// Where an edit of an instance's content is recorded
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EditTarget {
    /// Straight into the instance's template
    Source(TemplateId),
    /// Into the override patch of a link, below `prefix`
    Override { link: LinkId, prefix: DocPath },
}

/// `/Instances/a1/Instances/a2/...` for a chain of nested aliases
pub(crate) fn instances_prefix<'a>(aliases: impl IntoIterator<Item = &'a Alias>) -> DocPath {
    let mut path = DocPath::root();
    for alias in aliases {
        path.push(dom::INSTANCES);
        path.push(alias.as_str());
    }
    path
}

/// Write parent and placement into an entity document's transform
pub(crate) fn set_document_transform(document: &mut Value, parent_ref: Option<&str>, translation: [f32; 3], rotation: [f32; 4]) {
    let Value::Object(entity) = document else {
        return;
    };
    let components = entity
        .entry(dom::COMPONENTS)
        .or_insert_with(|| Value::Object(Map::new()));
    if !components.is_object() {
        *components = Value::Object(Map::new());
    }
    if let Value::Object(components) = components {
        components.insert(
            dom::TRANSFORM.to_string(),
            json!({
                (dom::PARENT_ENTITY): parent_ref,
                (dom::TRANSLATE): translation,
                (dom::ROTATE): rotation,
            }),
        );
    }
}

impl PrefabWorld {
    /// Prefix every path of `patch` so it addresses the owning instance's
    /// document. `patch` is untouched on failure.
    pub fn qualify_paths(&self, patch: &mut Patch, scope: PatchScope) -> Result<()> {
        let prefix = self.scope_prefix(scope, None)?;
        patch.prefix_paths(&prefix);
        Ok(())
    }

    /// Like [`qualify_paths`](Self::qualify_paths), relative to the document of
    /// the ancestor instance `from`
    pub fn qualify_paths_from(&self, patch: &mut Patch, scope: PatchScope, from: InstanceHandle) -> Result<()> {
        let prefix = self.scope_prefix(scope, Some(from))?;
        patch.prefix_paths(&prefix);
        Ok(())
    }

    fn scope_prefix(&self, scope: PatchScope, from: Option<InstanceHandle>) -> Result<DocPath> {
        let (owner, local) = match scope {
            PatchScope::Entity(id) => {
                let owner = self.entity_owner(id)?;
                (owner.instance, dom::entity_path(&owner.alias))
            }
            PatchScope::Instance(handle) => {
                let parent = self
                    .tree
                    .parent_of(handle)
                    .ok_or_else(|| PrefabError::reference("the root instance has no enclosing document"))?;
                let alias = self
                    .instance_ref(handle)?
                    .alias()
                    .cloned()
                    .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", handle)))?;
                (parent, dom::instance_path(&alias))
            }
        };

        let Some(from) = from else {
            return Ok(local);
        };
        let between = self.tree.relative_alias_path(from, owner).ok_or_else(|| {
            PrefabError::reference(format!(
                "'{}' is not below '{}'",
                self.tree.absolute_alias_path(owner),
                self.tree.absolute_alias_path(from)
            ))
        })?;
        Ok(instances_prefix(between.iter()).concat(&local))
    }

    /// Where edits of `owner`'s content go, given the current focus
    pub(crate) fn edit_target(&self, owner: InstanceHandle) -> Result<EditTarget> {
        if owner == self.focus || !self.tree.is_descendant_of(owner, self.focus) {
            return Ok(EditTarget::Source(self.instance_template(owner)?));
        }
        let child = self
            .tree
            .child_towards(self.focus, owner)
            .ok_or_else(|| PrefabError::reference(format!("instance {:?} is not below the focus", owner)))?;
        let link = self.instance_ref(child)?.link_id().ok_or_else(|| {
            PrefabError::Validation(format!(
                "'{}' was added by an override and cannot hold overrides of its own",
                self.tree.absolute_alias_path(child)
            ))
        })?;
        let between = self
            .tree
            .relative_alias_path(child, owner)
            .ok_or_else(|| PrefabError::reference(format!("instance {:?} is not below {:?}", owner, child)))?;
        Ok(EditTarget::Override {
            link,
            prefix: instances_prefix(between.iter()),
        })
    }

    /// Record a patch relative to `owner`'s document as a source or override edit
    pub(crate) fn commit_edit(&mut self, batch: &mut Batch, owner: InstanceHandle, patch: Patch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        match self.edit_target(owner)? {
            EditTarget::Source(template) => self.record_template_patch(batch, template, patch),
            EditTarget::Override { link, prefix } => self.record_link_update(batch, link, patch.prefixed(&prefix)),
        }
    }

    /// Patch that places `template`'s container as described, relative to the
    /// nested instance document
    pub(crate) fn container_override(&self, template: TemplateId, parent_ref: Option<&str>, transform: &Transform) -> Result<Patch> {
        let mut desired = self.template_container(template)?;
        set_document_transform(&mut desired, parent_ref, transform.translation, transform.rotation);
        self.container_patch(template, &desired)
    }

    /// Patch turning `template`'s container document into `desired`
    pub(crate) fn container_patch(&self, template: TemplateId, desired: &Value) -> Result<Patch> {
        let current = self.template_container(template)?;
        Ok(diff(&current, desired).prefixed(&DocPath::from_segments([CONTAINER_ALIAS])))
    }

    fn template_container(&self, template: TemplateId) -> Result<Value> {
        self.templates
            .document(template)
            .and_then(|doc| doc.get(CONTAINER_ALIAS))
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("{} has no container", template)))
    }

    /// Swap the container ops of a link patch for ones that produce `desired`
    pub(crate) fn rebase_container_ops(&self, patch: &mut Patch, template: TemplateId, desired: &Value) -> Result<()> {
        let placed = self.container_patch(template, desired)?;
        patch.remove_under(&DocPath::from_segments([CONTAINER_ALIAS]));
        patch.extend(placed);
        Ok(())
    }

    /// Record the live state of an entity in its template or in an override
    ///
    /// Moving the entity under a parent that belongs to another instance turns
    /// this into a reparent.
    pub fn update_entity(&mut self, id: EntityId) -> Result<()> {
        let owner = self.entity_owner(id)?.clone();
        if let Some(parent) = self.parent_id(id) {
            let parent_owner = self.entity_owner(parent)?.instance;
            if self.entity_frame(&owner) != Some(parent_owner) {
                // The live parent is already set; restore it from the document first
                self.rebuild_instance(owner.instance)?;
                return self.reparent_entity(id, Some(parent)).map(|_| ());
            }
        }
        self.commit_entity_change(id, "Update Entity")
    }

    /// Diff the cached document of `id` against its live state and commit it
    pub(crate) fn commit_entity_change(&mut self, id: EntityId, label: &str) -> Result<()> {
        let owner = self.entity_owner(id)?.clone();
        let before = self.cached_document(id)?;
        let after = self.entity_document(id)?;
        let mut patch = diff(&before, &after);
        if patch.is_empty() {
            return Ok(());
        }
        self.qualify_paths(&mut patch, PatchScope::Entity(id))?;

        let result = self.transact(label, |world, batch| world.commit_edit(batch, owner.instance, patch));
        if let Err(err) = &result {
            log::warn!("Restoring {} after failed edit: {}", id, err);
            if let Err(restore) = self.rebuild_instance(owner.instance) {
                log::error!("Could not restore {}: {}", id, restore);
            }
        }
        result
    }

    /// Create an entity under `parent` (the focused container by default)
    pub fn create_entity(&mut self, parent: Option<EntityId>, translation: [f32; 3]) -> Result<EntityId> {
        let parent = match parent {
            Some(parent) => parent,
            None => self.container_entity_id(self.focus)?,
        };
        let owner = self.entity_owner(parent)?.instance;
        let parent_ref = self
            .reference_for(Some(owner), parent)
            .ok_or_else(|| PrefabError::reference(format!("{} cannot be referenced from its own instance", parent)))?;

        let alias = self.aliases.entity_alias();
        let id = self.entity_id_in(owner, &alias);
        let name = self.next_entity_name();
        let document = Entity::new(id, name)
            .with_transform(Transform::default().with_translation(translation))
            .to_document(alias.as_str(), Some(parent_ref));
        let patch = Patch::new().with_op(PatchOp::add(dom::entity_path(&alias), document));

        self.transact("Create Entity", |world, batch| {
            world.commit_edit(batch, owner, patch)?;
            match world.entity(id) {
                Some(_) => Ok(()),
                None => Err(PrefabError::reference(format!("created entity '{}' did not appear", alias))),
            }
        })?;
        log::debug!("Created {} as '{}'", id, alias);
        Ok(id)
    }
}
