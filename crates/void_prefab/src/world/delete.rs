//! Deleting entities and nested instances

use super::edit::EditTarget;
use super::PrefabWorld;
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::EntityId;
use void_patch::{Patch, PatchOp};

impl PrefabWorld {
    /// Delete `ids` with their descendants
    ///
    /// A container in the selection takes its whole instance with it: the link
    /// and the nested entry in the owning template go away.
    pub fn delete_entities(&mut self, ids: &[EntityId]) -> Result<()> {
        if ids.is_empty() {
            return Err(PrefabError::Validation("no entities given".to_string()));
        }
        let focus_container = self.container_entity_id(self.focus)?;
        let selected: Vec<EntityId> = ids.iter().copied().filter(|id| *id != focus_container).collect();
        if selected.is_empty() {
            return Err(PrefabError::Validation("the focused container cannot be deleted".to_string()));
        }

        let owner = self.entities_belong_to_same_instance(&selected)?;
        if !self.tree.is_descendant_of(owner, self.focus) {
            return Err(PrefabError::Validation(format!(
                "'{}' is outside the focused prefab",
                self.tree.absolute_alias_path(owner)
            )));
        }
        let (entities, instances) = self.retrieve_and_sort_prefab_entities_and_instances(&selected, owner)?;

        let mut entity_removals = Patch::new();
        for id in &entities {
            let alias = &self.entity_owner(*id)?.alias;
            entity_removals.push(PatchOp::remove(dom::entity_path(alias)));
        }

        let target = self.edit_target(owner)?;
        self.transact("Delete Entities", |world, batch| match target {
            EditTarget::Source(template) => {
                for nested in &instances {
                    world.remove_link(*nested, batch)?;
                }
                world.record_template_patch(batch, template, entity_removals)
            }
            EditTarget::Override { .. } => {
                let mut patch = Patch::new();
                for nested in &instances {
                    let alias = world
                        .instance_ref(*nested)?
                        .alias()
                        .cloned()
                        .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", nested)))?;
                    patch.push(PatchOp::remove(dom::instance_path(&alias)));
                }
                patch.extend(entity_removals);
                world.commit_edit(batch, owner, patch)
            }
        })?;
        log::debug!("Deleted {} entities and {} instances", entities.len(), instances.len());
        Ok(())
    }
}
