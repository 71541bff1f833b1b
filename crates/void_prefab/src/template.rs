//! Templates - canonical prefab documents
//!
//! The store hands out read access freely; writes are crate-private so every
//! change goes through the composition world, which records undo state and
//! propagates to live instances.

use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::TemplateId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A template document and its bookkeeping
#[derive(Debug, Clone)]
pub struct Template {
    id: TemplateId,
    source_path: String,
    document: Value,
    is_procedural: bool,
    dirty: bool,
}

impl Template {
    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Procedural templates are generated at runtime and never saved
    pub fn is_procedural(&self) -> bool {
        self.is_procedural
    }

    /// True if the document changed since it was loaded or last saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn document_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// Owner of every loaded template
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: BTreeMap<TemplateId, Template>,
    by_path: HashMap<String, TemplateId>,
    next_id: u64,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a source path
    pub fn insert(&mut self, source_path: impl Into<String>, mut document: Value, is_procedural: bool) -> Result<TemplateId> {
        let source_path = source_path.into();
        if source_path.is_empty() {
            return Err(PrefabError::Validation("template source path is empty".to_string()));
        }
        if self.by_path.contains_key(&source_path) {
            return Err(PrefabError::Validation(format!(
                "a template is already loaded from '{}'",
                source_path
            )));
        }
        if !document.is_object() {
            return Err(PrefabError::Validation(format!(
                "template document for '{}' is not an object",
                source_path
            )));
        }
        dom::normalize(&mut document);

        self.next_id += 1;
        let id = TemplateId::new(self.next_id);
        self.by_path.insert(source_path.clone(), id);
        self.templates.insert(
            id,
            Template {
                id,
                source_path,
                document,
                is_procedural,
                dirty: false,
            },
        );
        Ok(id)
    }

    pub fn remove(&mut self, id: TemplateId) -> Option<Template> {
        let template = self.templates.remove(&id)?;
        self.by_path.remove(&template.source_path);
        Some(template)
    }

    pub fn get(&self, id: TemplateId) -> Option<&Template> {
        self.templates.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TemplateId) -> Option<&mut Template> {
        self.templates.get_mut(&id)
    }

    pub fn find_by_path(&self, source_path: &str) -> Option<TemplateId> {
        self.by_path.get(source_path).copied()
    }

    /// Document of a template
    pub fn document(&self, id: TemplateId) -> Option<&Value> {
        self.get(id).map(Template::document)
    }

    /// Source path of a template, or a placeholder for messages
    pub fn describe(&self, id: TemplateId) -> String {
        self.get(id)
            .map(|t| t.source_path.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn contains(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Clear the dirty flag after the document was written out
    pub fn mark_saved(&mut self, id: TemplateId) -> Result<()> {
        let template = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| PrefabError::reference(format!("{} is not loaded", id)))?;
        template.dirty = false;
        Ok(())
    }
}
