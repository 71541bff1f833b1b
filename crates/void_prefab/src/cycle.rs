//! Cycle detection for template nesting
//!
//! Placing template `C` under instance `I` is refused when the source path of
//! `I` or any of its ancestors appears among the source paths `C` pulls in.
//! Source paths are gathered from template documents only; nesting introduced
//! by link overrides is not seen here and is caught at rebuild time instead.

use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::TemplateId;
use crate::instance::{InstanceHandle, InstanceTree};
use crate::template::TemplateStore;
use std::collections::BTreeSet;

/// Checks candidate nestings against the live instance tree
pub struct CycleDetector<'a> {
    tree: &'a InstanceTree,
    templates: &'a TemplateStore,
}

impl<'a> CycleDetector<'a> {
    pub fn new(tree: &'a InstanceTree, templates: &'a TemplateStore) -> Self {
        Self { tree, templates }
    }

    /// Source path of `template` plus every source path it nests, transitively
    pub fn template_source_paths(&self, template: TemplateId) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        let mut pending = vec![template];

        while let Some(id) = pending.pop() {
            let Some(template) = self.templates.get(id) else {
                continue;
            };
            if !paths.insert(template.source_path().to_string()) {
                continue;
            }
            let Some(entries) = dom::instances(template.document()) else {
                continue;
            };
            for entry in entries.values() {
                let Some(source) = dom::entry_source(entry) else {
                    continue;
                };
                match self.templates.find_by_path(source) {
                    Some(nested) => pending.push(nested),
                    None => {
                        paths.insert(source.to_string());
                    }
                }
            }
        }
        paths
    }

    /// First ancestor of `instance` (itself included) whose source path is a candidate
    pub fn find_conflict(&self, instance: InstanceHandle, candidates: &BTreeSet<String>) -> Option<String> {
        self.tree.ancestors(instance).into_iter().find_map(|handle| {
            let template = self.tree.get(handle)?.template_id();
            let path = self.templates.get(template)?.source_path();
            candidates.contains(path).then(|| path.to_string())
        })
    }

    /// True if any ancestor of `instance`, or `instance` itself, has a source
    /// path in `candidates`
    pub fn has_cycle(&self, instance: InstanceHandle, candidates: &BTreeSet<String>) -> bool {
        self.find_conflict(instance, candidates).is_some()
    }

    /// Fail with a cycle error if nesting `candidate` under `instance` loops
    pub fn check(&self, instance: InstanceHandle, candidate: TemplateId) -> Result<()> {
        let candidates = self.template_source_paths(candidate);
        match self.find_conflict(instance, &candidates) {
            Some(ancestor) => {
                let candidate = self.templates.describe(candidate);
                log::warn!("Refusing to nest '{}': it would contain '{}'", candidate, ancestor);
                Err(PrefabError::Cycle { candidate, ancestor })
            }
            None => Ok(()),
        }
    }
}
