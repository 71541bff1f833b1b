//! Instantiating templates into the live tree

use super::PrefabWorld;
use crate::cycle::CycleDetector;
use crate::entity::{document_rotation, Transform, IDENTITY_ROTATION};
use crate::error::{PrefabError, Result};
use crate::id::EntityId;
use crate::instance::InstanceHandle;

impl PrefabWorld {
    /// Nest the template loaded from `source_path` under `parent`
    ///
    /// `parent` defaults to the focused container. The link lives in the
    /// template of the instance that owns `parent`. The new container is
    /// parented and placed through its link patch; the template keeps its own
    /// rotation.
    pub fn instantiate_prefab(
        &mut self,
        source_path: &str,
        parent: Option<EntityId>,
        translation: [f32; 3],
    ) -> Result<InstanceHandle> {
        let source = self
            .templates
            .find_by_path(source_path)
            .ok_or_else(|| PrefabError::Validation(format!("template '{}' is not loaded", source_path)))?;
        let parent = match parent {
            Some(parent) => parent,
            None => self.container_entity_id(self.focus)?,
        };
        let owner = self.entity_owner(parent)?.instance;
        CycleDetector::new(&self.tree, &self.templates).check(owner, source)?;

        let parent_ref = self
            .reference_for(Some(owner), parent)
            .ok_or_else(|| PrefabError::reference(format!("{} cannot be referenced from its own instance", parent)))?;
        let rotation = self
            .templates
            .document(source)
            .and_then(|doc| doc.get(crate::alias::CONTAINER_ALIAS))
            .and_then(document_rotation)
            .unwrap_or(IDENTITY_ROTATION);
        let placement = Transform::default().with_translation(translation).with_rotation(rotation);
        let patch = self.container_override(source, Some(&parent_ref), &placement)?;

        let alias = self.aliases.instance_alias();
        let owner_template = self.instance_template(owner)?;
        let handle = self.transact("Instantiate Prefab", |world, batch| {
            world.create_link(source, owner_template, alias.clone(), patch, Some(batch))?;
            world
                .instance_ref(owner)?
                .nested_instance(&alias)
                .ok_or_else(|| PrefabError::reference(format!("instance '{}' did not appear", alias)))
        })?;
        log::debug!("Instantiated '{}' as '{}'", source_path, self.tree.absolute_alias_path(handle));
        Ok(handle)
    }
}
