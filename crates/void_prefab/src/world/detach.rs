//! Dissolving a nested instance into its parent

use super::edit::EditTarget;
use super::PrefabWorld;
use crate::alias::{Alias, CONTAINER_ALIAS};
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use serde_json::Value;
use void_patch::{AliasRemap, DocPath, Patch, PatchOp};

impl PrefabWorld {
    /// Replace the instance behind `container` by plain entities in its parent
    ///
    /// The container stays as an ordinary entity under a new alias. Nested
    /// instances of the detached instance are re-linked into the parent
    /// template, keeping the overrides that reached them. Returns the id of the
    /// former container.
    pub fn detach_prefab(&mut self, container: EntityId) -> Result<EntityId> {
        let owner = self.entity_owner(container)?.clone();
        if !owner.is_container() {
            return Err(PrefabError::Validation(format!("{} is not an instance container", container)));
        }
        let instance = owner.instance;
        let parent = self
            .tree
            .parent_of(instance)
            .ok_or_else(|| PrefabError::Validation("the root instance cannot be detached".to_string()))?;
        if self.tree.is_descendant_of(self.focus, instance) {
            return Err(PrefabError::Validation(format!(
                "'{}' is focused and cannot be detached",
                self.tree.absolute_alias_path(instance)
            )));
        }
        let parent_template = match self.edit_target(parent)? {
            EditTarget::Source(template) => template,
            EditTarget::Override { .. } => {
                return Err(PrefabError::Validation(format!(
                    "focus '{}' before detaching instances inside it",
                    self.tree.absolute_alias_path(parent)
                )));
            }
        };

        let detached = self.instance_ref(instance)?;
        let instance_alias = detached
            .alias()
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", instance)))?;
        let outer_patch = detached
            .link_id()
            .and_then(|link| self.links.get(link))
            .map(|link| link.patch.clone())
            .ok_or_else(|| {
                PrefabError::Validation(format!(
                    "'{}' was added by an override and cannot be detached",
                    self.tree.absolute_alias_path(instance)
                ))
            })?;

        // Aliases that would clash with the parent's get fresh ones
        let taken = self.instance_ref(parent)?;
        let is_taken = |alias: &Alias| taken.entity(alias).is_some() || taken.nested_instance(alias).is_some();
        let container_alias = self.aliases.entity_alias();
        let mut remap = AliasRemap::new();
        remap.insert_leading(CONTAINER_ALIAS, container_alias.as_str());
        for alias in detached.entities().keys() {
            if is_taken(alias) || *alias == instance_alias {
                remap.insert(alias.as_str(), self.aliases.entity_alias().as_str());
            }
        }
        for alias in detached.nested().keys() {
            if is_taken(alias) || *alias == instance_alias {
                remap.insert(alias.as_str(), self.aliases.instance_alias().as_str());
            }
        }
        let renamed = |alias: &Alias| remap.get(alias.as_str()).map(Alias::from).unwrap_or_else(|| alias.clone());

        let mut additions = Patch::new();
        let mut container_doc = self.cached_document(container)?;
        if let Some(map) = container_doc.as_object_mut() {
            map.insert(dom::ID.to_string(), Value::String(container_alias.to_string()));
        }
        additions.push(PatchOp::add(dom::entity_path(&container_alias), container_doc));
        for (alias, entity) in detached.entities() {
            let mut document = self.cached_document(entity.id())?;
            remap.remap_value(&mut document);
            additions.push(PatchOp::add(dom::entity_path(&renamed(alias)), document));
        }

        let container_path = DocPath::from_segments([CONTAINER_ALIAS]);
        let mut relinks: Vec<(TemplateId, Alias, Patch)> = Vec::new();
        for (alias, nested) in detached.nested() {
            let nested_instance = self.instance_ref(*nested)?;
            let own = nested_instance
                .link_id()
                .and_then(|link| self.links.get(link))
                .map(|link| link.patch.clone())
                .ok_or_else(|| {
                    PrefabError::Validation(format!(
                        "'{}' was added by an override and cannot be re-linked",
                        self.tree.absolute_alias_path(*nested)
                    ))
                })?;
            let mut patch = outer_patch.scoped_to(&dom::instance_path(alias));
            patch.merge(own);
            // Container placement refers to the detached instance's aliases
            for op in patch.iter_mut().filter(|op| op.path.starts_with(&container_path)) {
                remap.remap_value(&mut op.value);
            }
            relinks.push((nested_instance.template_id(), renamed(alias), patch));
        }

        let new_id = self.entity_id_in(parent, &container_alias);
        self.transact("Detach Prefab", |world, batch| {
            world.remove_link(instance, batch)?;
            world.commit_edit(batch, parent, additions)?;
            for (source, alias, patch) in relinks {
                world.create_link(source, parent_template, alias, patch, Some(batch))?;
            }
            match world.entity(new_id) {
                Some(_) => Ok(()),
                None => Err(PrefabError::reference(format!("detached container {} did not appear", new_id))),
            }
        })?;
        log::debug!("Detached '{}' as '{}'", instance_alias, container_alias);
        Ok(new_id)
    }
}
