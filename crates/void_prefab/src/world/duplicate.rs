//! Duplicating entities and nested instances inside their owning instance
//!
//! Every alias in the selection gets its replacement before any document is
//! rewritten, so references between duplicated entities (parents, component
//! fields, container placement in link patches) all land on the new aliases.

use super::edit::EditTarget;
use super::PrefabWorld;
use crate::alias::Alias;
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use serde_json::Value;
use void_patch::{AliasRemap, Patch, PatchOp};

impl PrefabWorld {
    /// Copy `ids` with their descendants next to the originals
    ///
    /// Returns the ids of the copies: entities first, then the containers of
    /// copied nested instances.
    pub fn duplicate_entities(&mut self, ids: &[EntityId]) -> Result<Vec<EntityId>> {
        if ids.is_empty() {
            return Err(PrefabError::Validation("no entities given".to_string()));
        }
        let focus_container = self.container_entity_id(self.focus)?;
        if ids.contains(&focus_container) {
            return Err(PrefabError::Validation("the focused container cannot be duplicated".to_string()));
        }
        let owner = self.entities_belong_to_same_instance(ids)?;
        let top_level = self.top_level_entities(ids);
        let (entities, instances) = self.retrieve_and_sort_prefab_entities_and_instances(&top_level, owner)?;

        let target = self.edit_target(owner)?;
        if matches!(target, EditTarget::Override { .. }) && !instances.is_empty() {
            return Err(PrefabError::Validation(format!(
                "focus '{}' before duplicating its nested instances",
                self.tree.absolute_alias_path(owner)
            )));
        }

        // Allocate every new alias and snapshot every document first
        let mut remap = AliasRemap::new();
        let mut entity_docs: Vec<(Alias, Value)> = Vec::with_capacity(entities.len());
        for id in &entities {
            let alias = self.entity_owner(*id)?.alias.clone();
            let fresh = self.aliases.entity_alias();
            remap.insert(alias.as_str(), fresh.as_str());
            entity_docs.push((fresh, self.cached_document(*id)?));
        }
        let mut instance_links: Vec<(TemplateId, Alias, Patch)> = Vec::with_capacity(instances.len());
        for handle in &instances {
            let instance = self.instance_ref(*handle)?;
            let alias = instance
                .alias()
                .cloned()
                .ok_or_else(|| PrefabError::reference(format!("nested instance {:?} has no alias", handle)))?;
            let patch = instance
                .link_id()
                .and_then(|link| self.links.get(link))
                .map(|link| link.patch.clone())
                .ok_or_else(|| {
                    PrefabError::Validation(format!(
                        "'{}' was added by an override and cannot be duplicated",
                        self.tree.absolute_alias_path(*handle)
                    ))
                })?;
            let fresh = self.aliases.instance_alias();
            remap.insert(alias.as_str(), fresh.as_str());
            instance_links.push((instance.template_id(), fresh, patch));
        }

        // Then rewrite with the complete mapping
        for (_, document) in &mut entity_docs {
            remap.remap_value(document);
        }
        for (_, _, patch) in &mut instance_links {
            remap.remap_patch(patch);
        }

        let mut copies: Vec<EntityId> = entity_docs
            .iter()
            .map(|(alias, _)| self.entity_id_in(owner, alias))
            .collect();
        copies.extend(
            instance_links
                .iter()
                .map(|(_, alias, _)| self.nested_container_id(owner, alias)),
        );

        let additions: Patch = entity_docs
            .into_iter()
            .map(|(alias, document)| PatchOp::add(dom::entity_path(&alias), document))
            .collect();
        let expected = copies.clone();
        self.transact("Duplicate Entities", |world, batch| {
            world.commit_edit(batch, owner, additions)?;
            if let EditTarget::Source(template) = target {
                for (source, alias, patch) in instance_links {
                    world.create_link(source, template, alias, patch, Some(batch))?;
                }
            }
            match expected.iter().find(|id| world.entity(**id).is_none()) {
                Some(missing) => Err(PrefabError::reference(format!("duplicate {} did not appear", missing))),
                None => Ok(()),
            }
        })?;
        log::debug!("Duplicated {} entities into {} copies", ids.len(), copies.len());
        Ok(copies)
    }
}
