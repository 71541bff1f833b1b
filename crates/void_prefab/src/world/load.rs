//! Template registration and link import
//!
//! Nested entries in a loaded document may carry `"Patches"`. Those are moved
//! into the link table when the document is registered; the stored template
//! keeps only `"Source"`.

use super::PrefabWorld;
use crate::alias::Alias;
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::TemplateId;
use crate::link::Link;
use crate::template::Template;
use serde_json::Value;
use void_patch::Patch;

/// Link patch waiting for its source template to be loaded
#[derive(Debug, Clone)]
pub(crate) struct PendingLink {
    target: TemplateId,
    alias: Alias,
    source_path: String,
    patch: Patch,
}

impl PrefabWorld {
    /// Register a template document loaded from `source_path`
    pub fn load_template(&mut self, source_path: &str, document: Value) -> Result<TemplateId> {
        self.register_template(source_path, document, false)
    }

    /// Register a template generated at runtime
    pub fn load_procedural_template(&mut self, source_path: &str, document: Value) -> Result<TemplateId> {
        self.register_template(source_path, document, true)
    }

    fn register_template(&mut self, source_path: &str, document: Value, is_procedural: bool) -> Result<TemplateId> {
        let id = self.templates.insert(source_path, document, is_procedural)?;
        if let Err(err) = self.import_links(id) {
            self.discard_template(id);
            return Err(err);
        }
        self.resolve_pending_links(source_path, id);
        log::debug!("Loaded template '{}' as {}", source_path, id);

        // Templates that were waiting on this one can now build their nested instances
        let waiting: Vec<TemplateId> = self
            .templates
            .iter()
            .filter(|t| {
                dom::instances(t.document())
                    .map_or(false, |entries| entries.values().any(|e| dom::entry_source(e) == Some(source_path)))
            })
            .map(Template::id)
            .collect();
        for template in waiting {
            self.propagate_template_changes(template)?;
        }
        Ok(id)
    }

    /// Move `"Patches"` out of the nested entries of `template` into links
    pub(crate) fn import_links(&mut self, template: TemplateId) -> Result<()> {
        let path = self.templates.describe(template);
        let mut found = Vec::new();
        {
            let document = self
                .templates
                .get_mut(template)
                .ok_or_else(|| PrefabError::reference(format!("{} is not loaded", template)))?
                .document_mut();
            if let Some(Value::Object(entries)) = document.get_mut(dom::INSTANCES) {
                for (alias, entry) in entries.iter_mut() {
                    let Some(source) = dom::entry_source(entry).map(str::to_string) else {
                        log::warn!("Nested instance '{}' in '{}' has no source", alias, path);
                        continue;
                    };
                    let patch = match entry.as_object_mut().and_then(|e| e.remove(dom::PATCHES)) {
                        Some(value) => Patch::from_value(&value).map_err(|e| PrefabError::propagation(&path, &e))?,
                        None => Patch::new(),
                    };
                    found.push(PendingLink {
                        target: template,
                        alias: Alias::from(alias.as_str()),
                        source_path: source,
                        patch,
                    });
                }
            }
        }

        for pending in found {
            match self.templates.find_by_path(&pending.source_path) {
                Some(source) => self.insert_link(source, pending)?,
                None => self.pending_links.push(pending),
            }
        }
        Ok(())
    }

    fn resolve_pending_links(&mut self, source_path: &str, source: TemplateId) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_links)
            .into_iter()
            .partition(|pending| pending.source_path == source_path);
        self.pending_links = waiting;

        for pending in ready {
            let still_nested = self
                .templates
                .document(pending.target)
                .and_then(|doc| dom::instances(doc))
                .and_then(|entries| entries.get(pending.alias.as_str()))
                .and_then(dom::entry_source)
                == Some(source_path);
            if !still_nested {
                continue;
            }
            if let Err(err) = self.insert_link(source, pending) {
                log::warn!("Dropping link for '{}': {}", source_path, err);
            }
        }
    }

    fn insert_link(&mut self, source: TemplateId, pending: PendingLink) -> Result<()> {
        let link = Link {
            id: self.links.allocate_id(),
            source_template: source,
            target_template: pending.target,
            instance_alias: pending.alias,
            patch: pending.patch,
        };
        self.links.insert(link)
    }

    /// Remove a template nothing refers to any more
    pub fn unload_template(&mut self, id: TemplateId) -> Result<Template> {
        let path = self.templates.describe(id);
        if !self.templates.contains(id) {
            return Err(PrefabError::Validation(format!("template '{}' is not loaded", path)));
        }
        if !self.tree.instances_of(id).is_empty() {
            return Err(PrefabError::Validation(format!("template '{}' still has live instances", path)));
        }
        if self.links.sourced_from(id).next().is_some() {
            return Err(PrefabError::Validation(format!("template '{}' is still nested elsewhere", path)));
        }
        self.pending_links.retain(|pending| pending.target != id);
        self.discard_template(id)
            .ok_or_else(|| PrefabError::reference(format!("template '{}' vanished while unloading", path)))
    }

    /// Drop a template and the links that live inside it
    pub(crate) fn discard_template(&mut self, id: TemplateId) -> Option<Template> {
        let inner: Vec<_> = self.links.targeting(id).map(|link| link.id).collect();
        for link in inner {
            self.links.remove(link);
        }
        self.templates.remove(id)
    }

    /// Template document with each nested entry's link patches inlined
    pub fn template_document_with_links(&self, id: TemplateId) -> Result<Value> {
        let mut document = self
            .templates
            .document(id)
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("{} is not loaded", id)))?;
        dom::normalize(&mut document);
        for link in self.links.targeting(id) {
            let source = self.templates.describe(link.source_template);
            if let Some(Value::Object(entries)) = document.get_mut(dom::INSTANCES) {
                entries.insert(link.instance_alias.to_string(), link.to_dom(&source));
            }
        }
        Ok(document)
    }
}
