//! Reparenting entities, within an instance or across instances

use super::edit::set_document_transform;
use super::PrefabWorld;
use crate::alias::Alias;
use crate::cycle::CycleDetector;
use crate::dom;
use crate::entity::{document_rotation, document_translation, IDENTITY_ROTATION};
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use crate::instance::{Instance, InstanceHandle};
use void_patch::{AliasRemap, DocPath, Patch, PatchOp};

impl PrefabWorld {
    /// Move `id` under `new_parent` (the focused container by default)
    ///
    /// When the new parent belongs to another instance the entity, its
    /// descendants and the nested instances below it move into that instance,
    /// keeping their overrides. Returns the entity's id afterwards, which
    /// changes when it moves.
    pub fn reparent_entity(&mut self, id: EntityId, new_parent: Option<EntityId>) -> Result<EntityId> {
        let owner = self.entity_owner(id)?.clone();
        if owner.is_container() && owner.instance == self.tree.root() {
            return Err(PrefabError::Validation("the root container cannot be reparented".to_string()));
        }
        let new_parent = match new_parent {
            Some(parent) => parent,
            None => self.container_entity_id(self.focus)?,
        };
        if new_parent == id {
            return Err(PrefabError::Validation(format!("{} cannot be its own parent", id)));
        }
        if self.entity_ancestors(new_parent).contains(&id) {
            return Err(PrefabError::Validation(format!("{} is a descendant of {}", new_parent, id)));
        }
        let target = self.entity_owner(new_parent)?.instance;
        if owner.is_container() && self.tree.is_descendant_of(target, owner.instance) {
            return Err(PrefabError::Validation(format!("{} lies inside the instance of {}", new_parent, id)));
        }

        if self.entity_frame(&owner) == Some(target) {
            self.set_parent(id, Some(new_parent))?;
            self.commit_entity_change(id, "Reparent Entity")?;
            return Ok(id);
        }

        if owner.is_container() {
            self.move_instance(owner.instance, new_parent, target)
        } else {
            self.move_entities(id, owner.instance, new_parent, target)
        }
    }

    /// An alias not yet used by `instance` or its template
    fn free_alias(&self, instance: &Instance, template: TemplateId, wanted: &Alias, fresh: impl Fn() -> Alias) -> Alias {
        let listed = |alias: &Alias| {
            self.templates
                .document(template)
                .and_then(dom::instances)
                .map_or(false, |entries| entries.contains_key(alias.as_str()))
        };
        let used = |alias: &Alias| {
            instance.entity(alias).is_some() || instance.nested_instance(alias).is_some() || listed(alias)
        };
        if used(wanted) {
            fresh()
        } else {
            wanted.clone()
        }
    }

    /// Re-nest a whole instance under a parent in another instance
    fn move_instance(&mut self, moving: InstanceHandle, new_parent: EntityId, target: InstanceHandle) -> Result<EntityId> {
        let source = self.instance_template(moving)?;
        CycleDetector::new(&self.tree, &self.templates).check(target, source)?;
        // The link moves between the owners' templates whatever the focus
        let target_template = self.instance_template(target)?;

        let instance = self.instance_ref(moving)?;
        let container = instance.container_entity_id();
        let link = instance
            .link_id()
            .and_then(|link| self.links.get(link))
            .cloned()
            .ok_or_else(|| {
                PrefabError::Validation(format!(
                    "'{}' was added by an override and cannot be moved",
                    self.tree.absolute_alias_path(moving)
                ))
            })?;
        let parent_ref = self
            .reference_for(Some(target), new_parent)
            .ok_or_else(|| PrefabError::reference(format!("{} cannot be referenced from its own instance", new_parent)))?;

        let mut desired = self.cached_document(container)?;
        let translation = document_translation(&desired).unwrap_or_default();
        let rotation = document_rotation(&desired).unwrap_or(IDENTITY_ROTATION);
        set_document_transform(&mut desired, Some(&parent_ref), translation, rotation);
        let mut patch = link.patch.clone();
        self.rebase_container_ops(&mut patch, source, &desired)?;

        let target_instance = self.instance_ref(target)?;
        let alias = self.free_alias(target_instance, target_template, &link.instance_alias, || {
            self.aliases.instance_alias()
        });

        self.transact("Reparent Instance", |world, batch| {
            world.remove_link(moving, batch)?;
            world.create_link(source, target_template, alias.clone(), patch, Some(batch))?;
            Ok(())
        })?;
        let moved = self.nested_container_id(target, &alias);
        log::debug!("Moved instance '{}' to {}", link.instance_alias, moved);
        Ok(moved)
    }

    /// Move an entity with its descendants into another instance
    fn move_entities(
        &mut self,
        id: EntityId,
        from: InstanceHandle,
        new_parent: EntityId,
        target: InstanceHandle,
    ) -> Result<EntityId> {
        let (entities, instances) = self.retrieve_and_sort_prefab_entities_and_instances(&[id], from)?;
        let detector = CycleDetector::new(&self.tree, &self.templates);
        for nested in &instances {
            detector.check(target, self.instance_template(*nested)?)?;
        }
        // Entities that travel with links go to the owners' templates
        let carries_instances = !instances.is_empty();
        let from_template = self.instance_template(from)?;
        let target_template = self.instance_template(target)?;
        let parent_ref = self
            .reference_for(Some(target), new_parent)
            .ok_or_else(|| PrefabError::reference(format!("{} cannot be referenced from its own instance", new_parent)))?;

        // Fresh aliases only where the target already uses one
        let target_instance = self.instance_ref(target)?;
        let mut remap = AliasRemap::new();
        let mut moved_entities = Vec::with_capacity(entities.len());
        for entity in &entities {
            let alias = self.entity_owner(*entity)?.alias.clone();
            let placed = self.free_alias(target_instance, target_template, &alias, || self.aliases.entity_alias());
            if placed != alias {
                remap.insert(alias.as_str(), placed.as_str());
            }
            moved_entities.push((*entity, alias, placed));
        }
        let mut moved_instances = Vec::with_capacity(instances.len());
        for nested in &instances {
            let instance = self.instance_ref(*nested)?;
            let alias = instance
                .alias()
                .cloned()
                .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", nested)))?;
            let patch = instance
                .link_id()
                .and_then(|link| self.links.get(link))
                .map(|link| link.patch.clone())
                .ok_or_else(|| {
                    PrefabError::Validation(format!(
                        "'{}' was added by an override and cannot be moved",
                        self.tree.absolute_alias_path(*nested)
                    ))
                })?;
            let placed = self.free_alias(target_instance, target_template, &alias, || self.aliases.instance_alias());
            if placed != alias {
                remap.insert(alias.as_str(), placed.as_str());
            }
            moved_instances.push((*nested, instance.template_id(), placed, patch));
        }

        let mut removals = Patch::new();
        let mut additions = Patch::new();
        for (entity, alias, placed) in &moved_entities {
            let mut document = self.cached_document(*entity)?;
            remap.remap_value(&mut document);
            if *entity == id {
                let translation = document_translation(&document).unwrap_or_default();
                let rotation = document_rotation(&document).unwrap_or(IDENTITY_ROTATION);
                set_document_transform(&mut document, Some(&parent_ref), translation, rotation);
            }
            removals.push(PatchOp::remove(dom::entity_path(alias)));
            additions.push(PatchOp::add(dom::entity_path(placed), document));
        }
        let container_path = DocPath::from_segments([crate::alias::CONTAINER_ALIAS]);
        for (_, _, _, patch) in &mut moved_instances {
            for op in patch.iter_mut().filter(|op| op.path.starts_with(&container_path)) {
                remap.remap_value(&mut op.value);
            }
        }

        let moved = moved_entities
            .iter()
            .find(|(entity, _, _)| *entity == id)
            .map(|(_, _, placed)| self.entity_id_in(target, placed))
            .ok_or_else(|| PrefabError::reference(format!("{} was not collected for the move", id)))?;

        self.transact("Reparent Entity", |world, batch| {
            for (nested, _, _, _) in &moved_instances {
                world.remove_link(*nested, batch)?;
            }
            if carries_instances {
                world.record_template_patch(batch, from_template, removals)?;
                world.record_template_patch(batch, target_template, additions)?;
            } else {
                world.commit_edit(batch, from, removals)?;
                world.commit_edit(batch, target, additions)?;
            }
            for (_, source, alias, patch) in moved_instances {
                world.create_link(source, target_template, alias, patch, Some(batch))?;
            }
            match world.entity(moved) {
                Some(entity) if entity.parent_id() == Some(new_parent) => Ok(()),
                _ => Err(PrefabError::reference(format!("moved entity {} did not appear", moved))),
            }
        })?;
        log::debug!("Moved {} entities and {} instances to {}", entities.len(), instances.len(), moved);
        Ok(moved)
    }
}
