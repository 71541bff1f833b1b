//! Propagation - rebuilding live instances from documents and link patches

use super::{resolve_reference, EntityOwner, PrefabWorld};
use crate::alias::{Alias, CONTAINER_ALIAS};
use crate::dom;
use crate::entity::{document_parent_ref, Entity};
use crate::error::{PrefabError, Result};
use crate::id::{EntityId, TemplateId};
use crate::instance::{Instance, InstanceHandle};
use crate::link::Link;
use serde_json::Value;
use void_patch::Patch;

impl PrefabWorld {
    /// Rebuild every live instance of `template`
    pub fn propagate_template_changes(&mut self, template: TemplateId) -> Result<()> {
        let instances = self.tree.instances_of(template);
        log::debug!(
            "Propagating '{}' to {} instance(s)",
            self.templates.describe(template),
            instances.len()
        );
        for handle in instances {
            // An earlier rebuild may have removed it
            if self.tree.contains(handle) {
                self.rebuild_instance(handle)?;
            }
        }
        Ok(())
    }

    /// Template document of `handle` with every applicable link patch applied,
    /// outermost link first
    pub fn effective_document(&self, handle: InstanceHandle) -> Result<Value> {
        let template = self.instance_template(handle)?;
        let template_path = self.templates.describe(template);
        let mut document = self
            .templates
            .document(template)
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("template '{}' is not loaded", template_path)))?;

        let mut chain = self.tree.ancestors(handle);
        chain.reverse();
        let aliases: Vec<Alias> = chain
            .iter()
            .skip(1)
            .filter_map(|h| self.tree.get(*h).and_then(Instance::alias).cloned())
            .collect();

        for (depth, linked) in chain.iter().enumerate().skip(1) {
            let Some(link_id) = self.instance_ref(*linked)?.link_id() else {
                continue;
            };
            let Some(link) = self.links.get(link_id) else {
                log::warn!("Instance {:?} refers to missing {}", linked, link_id);
                continue;
            };
            let prefix = super::edit::instances_prefix(aliases.iter().skip(depth));
            let ops: Patch = link
                .patch
                .scoped_to(&prefix)
                .into_iter()
                .filter(|op| !op.path.is_root() && !dom::reaches_into_nested(&op.path))
                .collect();
            self.apply_link_ops(&mut document, &ops, link, &template_path)?;
        }

        dom::normalize(&mut document);
        Ok(document)
    }

    fn apply_link_ops(&self, document: &mut Value, ops: &Patch, link: &Link, template_path: &str) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if self.config.strict_link_patches {
            return void_patch::apply(document, ops).map_err(|e| PrefabError::propagation(template_path, &e));
        }
        let report = void_patch::apply_lenient(document, ops);
        for (op, err) in &report.failed {
            log::warn!(
                "Skipping stale override {:?} {} from {} on '{}': {}",
                op.op,
                op.path,
                link.id,
                template_path,
                err
            );
        }
        Ok(())
    }

    /// Rebuild one instance and everything below it
    pub(crate) fn rebuild_instance(&mut self, handle: InstanceHandle) -> Result<()> {
        self.rebuild_subtree(handle)?;
        self.release_dangling_parents(handle);
        Ok(())
    }

    fn rebuild_subtree(&mut self, handle: InstanceHandle) -> Result<()> {
        let document = self.effective_document(handle)?;
        let template = self.instance_template(handle)?;
        let template_path = self.templates.describe(template);
        let abs = self.tree.absolute_alias_path(handle);
        let parent_frame = self.tree.parent_of(handle).map(|p| self.tree.absolute_alias_path(p));
        let failure = |reason: String| PrefabError::Propagation {
            template: template_path.clone(),
            reason,
        };

        // Build everything before touching live state
        let container_doc = document.get(CONTAINER_ALIAS).cloned().unwrap_or(Value::Null);
        let container_id = EntityId::from_alias_path(&abs.join(Alias::container()));
        let container = Entity::from_document(container_id, &container_doc, |r| {
            resolve_reference(parent_frame.as_ref(), r)
        })
        .map_err(failure)?;
        let container_cached = container.to_document(CONTAINER_ALIAS, document_parent_ref(&container_doc).map(str::to_string));

        let mut entities = Vec::new();
        if let Some(map) = dom::entities(&document) {
            for (key, entity_doc) in map {
                let alias = Alias::from(key.as_str());
                if alias.is_container() {
                    return Err(failure(format!("'{}' is reserved and cannot name an entity", CONTAINER_ALIAS)));
                }
                let id = EntityId::from_alias_path(&abs.join(alias.clone()));
                let entity = Entity::from_document(id, entity_doc, |r| resolve_reference(Some(&abs), r)).map_err(failure)?;
                let cached = entity.to_document(alias.as_str(), document_parent_ref(entity_doc).map(str::to_string));
                entities.push((alias, entity, cached));
            }
        }

        let desired: Vec<(Alias, String)> = dom::instances(&document)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(alias, entry)| match dom::entry_source(entry) {
                        Some(source) => Some((Alias::from(alias.as_str()), source.to_string())),
                        None => {
                            log::warn!("Nested instance '{}' in '{}' has no source", alias, template_path);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Swap in the new entities
        let instance = self
            .tree
            .get_mut(handle)
            .ok_or_else(|| PrefabError::reference(format!("instance {:?} does not exist", handle)))?;
        let old_container = instance.container_entity_id();
        let old_entities: Vec<EntityId> = instance.take_entities().values().map(Entity::id).collect();
        instance.set_container(container);
        for (alias, entity, _) in &entities {
            instance.add_entity(alias.clone(), entity.clone())?;
        }
        instance.set_document(document);

        for id in old_entities.into_iter().chain(std::iter::once(old_container)) {
            self.entity_index.remove(&id);
            self.dom_cache.remove(&id);
        }
        self.entity_index.insert(
            container_id,
            EntityOwner {
                instance: handle,
                alias: Alias::container(),
            },
        );
        self.dom_cache.insert(container_id, container_cached);
        for (alias, entity, cached) in entities {
            self.entity_index.insert(entity.id(), EntityOwner { instance: handle, alias });
            self.dom_cache.insert(entity.id(), cached);
        }

        self.reconcile_nested(handle, template, &desired)?;

        let children: Vec<InstanceHandle> = self.instance_ref(handle)?.nested().values().copied().collect();
        for child in children {
            self.rebuild_subtree(child)?;
        }
        Ok(())
    }

    /// Unparent entities under `handle` whose parent reference names no live
    /// entity. The reference stays in the cached document.
    fn release_dangling_parents(&mut self, handle: InstanceHandle) {
        let mut dangling = Vec::new();
        for instance in self.tree.descendants(handle) {
            let Some(live) = self.tree.get(instance) else {
                continue;
            };
            for entity in std::iter::once(live.container()).chain(live.entities().values()) {
                if entity.parent_id().map_or(false, |parent| !self.entity_index.contains_key(&parent)) {
                    dangling.push((instance, entity.id()));
                }
            }
        }

        for (instance, id) in dangling {
            log::warn!(
                "Parent '{}' of {} in '{}' does not resolve; leaving it unparented",
                self.dom_cache.get(&id).and_then(document_parent_ref).unwrap_or_default(),
                id,
                self.tree.absolute_alias_path(instance)
            );
            let Some(live) = self.tree.get_mut(instance) else {
                continue;
            };
            let entity = if live.container_entity_id() == id {
                Some(live.container_mut())
            } else {
                live.entity_mut_by_id(id)
            };
            if let Some(entity) = entity {
                entity.set_parent(None);
            }
        }
    }

    /// Match nested instances to the nested entries of the effective document
    fn reconcile_nested(&mut self, handle: InstanceHandle, template: TemplateId, desired: &[(Alias, String)]) -> Result<()> {
        let current: Vec<(Alias, InstanceHandle)> = self
            .instance_ref(handle)?
            .nested()
            .iter()
            .map(|(alias, child)| (alias.clone(), *child))
            .collect();

        for (alias, child) in current {
            let child_source = self.instance_template(child).map(|t| self.templates.describe(t));
            let keep = desired
                .iter()
                .any(|(a, source)| a == &alias && child_source.as_deref().ok() == Some(source.as_str()));
            if !keep {
                self.remove_nested(handle, &alias);
            }
        }

        for (alias, source) in desired {
            let link_id = self.links.find(template, alias).map(|link| link.id);
            if let Some(child) = self.instance_ref(handle)?.nested_instance(alias) {
                if let Some(instance) = self.tree.get_mut(child) {
                    instance.set_link_id(link_id);
                }
                continue;
            }

            let Some(source_template) = self.templates.find_by_path(source) else {
                // Built once the template is loaded
                log::debug!("Nested instance '{}' waits for '{}'", alias, source);
                continue;
            };
            let ancestor = self.tree.ancestors(handle).into_iter().find_map(|h| {
                let path = self.templates.describe(self.tree.get(h)?.template_id());
                (path == *source).then_some(path)
            });
            if let Some(ancestor) = ancestor {
                self.skip_nested(
                    handle,
                    alias,
                    PrefabError::Cycle {
                        candidate: source.clone(),
                        ancestor,
                    },
                )?;
                continue;
            }

            let container = Entity::new(self.nested_container_id(handle, alias), "");
            let child = self
                .tree
                .insert_detached(Instance::new(source_template, Some(alias.clone()), container).with_link(link_id));
            self.tree.add_instance(handle, child)?;
        }
        Ok(())
    }

    /// Lenient rebuilds leave a looping entry out; strict ones fail
    fn skip_nested(&self, handle: InstanceHandle, alias: &Alias, reason: PrefabError) -> Result<()> {
        if self.config.strict_link_patches {
            return Err(reason);
        }
        log::warn!(
            "Skipping nested instance '{}' under '{}': {}",
            alias,
            self.tree.absolute_alias_path(handle),
            reason
        );
        Ok(())
    }

    /// Detach and destroy a nested instance along with its subtree
    pub(crate) fn remove_nested(&mut self, parent: InstanceHandle, alias: &Alias) {
        let Some(child) = self.tree.detach_nested_instance(parent, alias) else {
            return;
        };
        if self.tree.is_descendant_of(self.focus, child) {
            log::debug!("Focused instance removed; focusing the root");
            self.focus = self.tree.root();
        }
        for instance in self.tree.destroy(child) {
            let ids = std::iter::once(instance.container_entity_id())
                .chain(instance.entities().values().map(Entity::id));
            for id in ids {
                self.entity_index.remove(&id);
                self.dom_cache.remove(&id);
            }
        }
    }
}
