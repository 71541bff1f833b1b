//! Turning a selection of entities into a new template and nesting it back

use super::edit::{set_document_transform, EditTarget};
use super::PrefabWorld;
use crate::alias::{Alias, CONTAINER_ALIAS};
use crate::dom;
use crate::entity::{Transform, IDENTITY_ROTATION};
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use crate::instance::InstanceHandle;
use crate::placement::{container_transform, offset_from};
use serde_json::Value;
use void_patch::{Patch, PatchOp};

/// A nested instance that moves into the new template
struct MovedInstance {
    handle: InstanceHandle,
    source: TemplateId,
    alias: Alias,
    patch: Patch,
}

impl PrefabWorld {
    /// Wrap `ids` and everything below them in a new template at `source_path`
    /// and replace them by one instance of it
    ///
    /// The selected top-level entities must share one parent. Nested instances
    /// reached by the selection move into the new template with their
    /// overrides.
    pub fn create_prefab(&mut self, ids: &[EntityId], source_path: &str) -> Result<InstanceHandle> {
        if ids.is_empty() {
            return Err(PrefabError::Validation("no entities given".to_string()));
        }
        if self.templates.find_by_path(source_path).is_some() {
            return Err(PrefabError::Validation(format!(
                "a template is already loaded from '{}'",
                source_path
            )));
        }
        let focus_container = self.container_entity_id(self.focus)?;
        let selected: Vec<EntityId> = ids.iter().copied().filter(|id| *id != focus_container).collect();
        if selected.is_empty() {
            return Err(PrefabError::Validation("the focused container cannot be made a prefab".to_string()));
        }

        let top_level = self.top_level_entities(&selected);
        let parent = self.common_parent(&top_level)?;
        let owner = self.entities_belong_to_same_instance(&top_level)?;
        if self.entity_owner(parent)?.instance != owner {
            return Err(PrefabError::Validation(format!(
                "{} does not belong to '{}'",
                parent,
                self.tree.absolute_alias_path(owner)
            )));
        }
        let owner_template = match self.edit_target(owner)? {
            EditTarget::Source(template) => template,
            EditTarget::Override { .. } => {
                return Err(PrefabError::Validation(format!(
                    "focus '{}' before creating prefabs inside it",
                    self.tree.absolute_alias_path(owner)
                )));
            }
        };
        let parent_ref = self
            .reference_for(Some(owner), parent)
            .ok_or_else(|| PrefabError::reference(format!("{} cannot be referenced from its own instance", parent)))?;

        let (entities, instances) = self.retrieve_and_sort_prefab_entities_and_instances(&top_level, owner)?;

        let transforms = top_level
            .iter()
            .map(|id| self.transform_of(*id))
            .collect::<Result<Vec<Transform>>>()?;
        let (center, rotation) = container_transform(&transforms);
        let single = top_level.len() == 1;
        let local_placement = |transform: &Transform| -> ([f32; 3], [f32; 4]) {
            if single {
                ([0.0; 3], IDENTITY_ROTATION)
            } else {
                (offset_from(center, transform.translation), transform.rotation)
            }
        };

        // Document of the new template
        let mut document = dom::empty_template(&dom::name_from_source(source_path));
        let mut removals = Patch::new();
        for id in &entities {
            let alias = self.entity_owner(*id)?.alias.clone();
            let mut entity_doc = self.cached_document(*id)?;
            if top_level.contains(id) {
                let (translation, rotation) = local_placement(&self.transform_of(*id)?);
                set_document_transform(&mut entity_doc, Some(CONTAINER_ALIAS), translation, rotation);
            }
            if let Some(Value::Object(map)) = document.get_mut(dom::ENTITIES) {
                map.insert(alias.to_string(), entity_doc);
            }
            removals.push(PatchOp::remove(dom::entity_path(&alias)));
        }

        let mut moved = Vec::new();
        for handle in &instances {
            let instance = self.instance_ref(*handle)?;
            let source = instance.template_id();
            let alias = instance
                .alias()
                .cloned()
                .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", handle)))?;
            let container = instance.container_entity_id();
            let link_id = instance.link_id().ok_or_else(|| {
                PrefabError::Validation(format!(
                    "'{}' was added by an override and cannot be moved",
                    self.tree.absolute_alias_path(*handle)
                ))
            })?;
            let mut patch = self
                .links
                .get(link_id)
                .map(|link| link.patch.clone())
                .ok_or_else(|| PrefabError::reference(format!("{} is not registered", link_id)))?;
            if top_level.contains(&container) {
                let mut desired = self.cached_document(container)?;
                let (translation, rotation) = local_placement(&self.transform_of(container)?);
                set_document_transform(&mut desired, Some(CONTAINER_ALIAS), translation, rotation);
                self.rebase_container_ops(&mut patch, source, &desired)?;
            }
            moved.push(MovedInstance {
                handle: *handle,
                source,
                alias,
                patch,
            });
        }

        let template = self.templates.insert(source_path, document, false)?;
        let placement = Transform::default().with_translation(center).with_rotation(rotation);
        let outer_patch = match self.container_override(template, Some(&parent_ref), &placement) {
            Ok(patch) => patch,
            Err(err) => {
                self.discard_template(template);
                return Err(err);
            }
        };
        let alias = self.aliases.instance_alias();

        let result = self.transact("Create Prefab", |world, batch| {
            for nested in &moved {
                world.remove_link(nested.handle, batch)?;
            }
            world.record_template_patch(batch, owner_template, removals)?;
            for nested in moved {
                // Lives in the new template only; dropped with it on rollback
                world.create_link(nested.source, template, nested.alias, nested.patch, None)?;
            }
            world.create_link(template, owner_template, alias.clone(), outer_patch, Some(batch))?;
            world
                .instance_ref(owner)?
                .nested_instance(&alias)
                .ok_or_else(|| PrefabError::reference(format!("instance '{}' did not appear", alias)))
        });

        match result {
            Ok(handle) => {
                log::debug!(
                    "Created prefab '{}' from {} entities and {} instances",
                    source_path,
                    entities.len(),
                    instances.len()
                );
                Ok(handle)
            }
            Err(err) => {
                self.discard_template(template);
                Err(err)
            }
        }
    }

    /// The parent every entity in `ids` has
    fn common_parent(&self, ids: &[EntityId]) -> Result<EntityId> {
        let mut common = None;
        for &id in ids {
            let parent = self
                .parent_id(id)
                .ok_or_else(|| PrefabError::Validation(format!("{} has no parent", id)))?;
            match common {
                None => common = Some(parent),
                Some(existing) if existing == parent => {}
                Some(_) => {
                    return Err(PrefabError::Validation(
                        "the selected entities do not share a common parent".to_string(),
                    ));
                }
            }
        }
        common.ok_or_else(|| PrefabError::Validation("no entities given".to_string()))
    }
}
