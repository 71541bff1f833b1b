//! Recording, replaying and rolling back undo nodes
//!
//! Every template or link mutation is expressed as an [`UndoNode`] and goes
//! through [`PrefabWorld::replay`]: perform the node, then propagate the
//! template it touched. If propagation fails the node is reverted before the
//! error is returned, so a failed step never stays visible.

use super::PrefabWorld;
use crate::alias::Alias;
use crate::cycle::CycleDetector;
use crate::dom;
use crate::error::{PrefabError, Result};
use crate::id::{LinkId, TemplateId};
use crate::instance::InstanceHandle;
use crate::link::Link;
use crate::transaction::{Batch, BatchState, Direction, UndoNode};
use void_patch::{diff, Patch, PatchOp};

impl PrefabWorld {
    // ----- node execution ----------------------------------------------------

    /// Carry out one node without propagating. Returns the template whose
    /// instances need rebuilding.
    fn perform(&mut self, node: &UndoNode, direction: Direction) -> Result<TemplateId> {
        match (node, direction) {
            (UndoNode::PatchTemplate { template, redo, .. }, Direction::Redo) => self.write_template(*template, redo),
            (UndoNode::PatchTemplate { template, undo, .. }, Direction::Undo) => self.write_template(*template, undo),
            (UndoNode::UpdateLink { link, after, .. }, Direction::Redo) => self.write_link(*link, after),
            (UndoNode::UpdateLink { link, before, .. }, Direction::Undo) => self.write_link(*link, before),
            (UndoNode::CreateLink { link }, Direction::Redo) | (UndoNode::RemoveLink { link }, Direction::Undo) => {
                self.attach_link(link)
            }
            (UndoNode::CreateLink { link }, Direction::Undo) | (UndoNode::RemoveLink { link }, Direction::Redo) => {
                self.detach_link(link)
            }
        }
    }

    fn write_template(&mut self, template: TemplateId, patch: &Patch) -> Result<TemplateId> {
        let path = self.templates.describe(template);
        let entry = self
            .templates
            .get_mut(template)
            .ok_or_else(|| PrefabError::reference(format!("template '{}' is not loaded", path)))?;
        void_patch::apply(entry.document_mut(), patch).map_err(|e| PrefabError::propagation(&path, &e))?;
        entry.mark_dirty();
        Ok(template)
    }

    fn write_link(&mut self, id: LinkId, patch: &Patch) -> Result<TemplateId> {
        let link = self
            .links
            .get_mut(id)
            .ok_or_else(|| PrefabError::reference(format!("{} is not registered", id)))?;
        link.patch = patch.clone();
        let target = link.target_template;
        if let Some(template) = self.templates.get_mut(target) {
            template.mark_dirty();
        }
        Ok(target)
    }

    /// Register a link and make sure its target lists the nested entry
    fn attach_link(&mut self, link: &Link) -> Result<TemplateId> {
        if !self.templates.contains(link.source_template) {
            return Err(PrefabError::reference(format!("{} is not loaded", link.source_template)));
        }
        let source = self.templates.describe(link.source_template);
        let entry_path = dom::instance_path(&link.instance_alias);
        let target_path = self.templates.describe(link.target_template);
        let target = self
            .templates
            .get_mut(link.target_template)
            .ok_or_else(|| PrefabError::reference(format!("template '{}' is not loaded", target_path)))?;

        let needs_entry = entry_path.resolve(target.document()).is_none();
        self.links.insert(link.clone())?;
        if needs_entry {
            let add = PatchOp::add(entry_path, dom::instance_entry(&source));
            if let Err(err) = void_patch::apply_op(target.document_mut(), &add) {
                self.links.remove(link.id);
                return Err(PrefabError::propagation(target_path, &err));
            }
        }
        target.mark_dirty();
        Ok(link.target_template)
    }

    /// Drop a link and the nested entry it describes
    fn detach_link(&mut self, link: &Link) -> Result<TemplateId> {
        if self.links.remove(link.id).is_none() {
            return Err(PrefabError::reference(format!("{} is not registered", link.id)));
        }
        if let Some(target) = self.templates.get_mut(link.target_template) {
            let entry_path = dom::instance_path(&link.instance_alias);
            if entry_path.resolve(target.document()).is_some() {
                if let Err(err) = void_patch::apply_op(target.document_mut(), &PatchOp::remove(entry_path)) {
                    log::error!("Could not remove the entry of {}: {}", link.id, err);
                }
            }
            target.mark_dirty();
        }
        Ok(link.target_template)
    }

    /// Perform a node and propagate; revert the node if propagation fails
    pub(crate) fn replay(&mut self, node: &UndoNode, direction: Direction) -> Result<()> {
        log::trace!("{:?} {}", direction, node.describe());
        let template = self.perform(node, direction)?;
        if let Err(err) = self.propagate_template_changes(template) {
            log::warn!("Reverting '{}': {}", node.describe(), err);
            let reverted = self
                .perform(node, direction.reversed())
                .and_then(|template| self.propagate_template_changes(template));
            if let Err(revert) = reverted {
                log::error!("Could not revert '{}': {}", node.describe(), revert);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Replay every node of a batch; on failure undo the ones already replayed
    fn replay_batch(&mut self, batch: &Batch, direction: Direction) -> Result<()> {
        let nodes: Vec<&UndoNode> = match direction {
            Direction::Redo => batch.nodes().iter().collect(),
            Direction::Undo => batch.nodes().iter().rev().collect(),
        };
        for (done, node) in nodes.iter().enumerate() {
            if let Err(err) = self.replay(node, direction) {
                for node in nodes[..done].iter().rev() {
                    if let Err(restore) = self.replay(node, direction.reversed()) {
                        log::error!("Could not restore '{}': {}", node.describe(), restore);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Perform `node` and keep it in `batch`
    pub(crate) fn record(&mut self, batch: &mut Batch, node: UndoNode) -> Result<()> {
        self.replay(&node, Direction::Redo)?;
        batch.push(node);
        Ok(())
    }

    // ----- batches -----------------------------------------------------------

    pub fn begin_batch(&mut self, label: impl Into<String>) -> Batch {
        self.history.begin(label)
    }

    /// Hand a finished batch to the undo log. Empty batches are dropped.
    pub fn commit_batch(&mut self, batch: Batch) {
        if batch.is_empty() {
            log::trace!("Dropping empty batch '{}'", batch.label());
            return;
        }
        log::debug!("Committed '{}' ({} steps)", batch.label(), batch.len());
        self.history.push(batch);
    }

    /// Roll back every node of an unfinished batch, newest first
    pub fn discard_batch(&mut self, mut batch: Batch) -> Batch {
        for node in batch.nodes().iter().rev() {
            if let Err(err) = self.replay(node, Direction::Undo) {
                log::error!("Could not roll back '{}': {}", node.describe(), err);
            }
        }
        batch.set_state(BatchState::RolledBack);
        batch
    }

    /// Run `f` inside a batch: commit on success, roll back on failure
    pub fn transact<T, F>(&mut self, label: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self, &mut Batch) -> Result<T>,
    {
        let mut batch = self.history.begin(label);
        match f(self, &mut batch) {
            Ok(value) => {
                self.commit_batch(batch);
                Ok(value)
            }
            Err(err) => {
                log::warn!("'{}' failed, rolling back {} step(s): {}", label, batch.len(), err);
                self.discard_batch(batch);
                Err(err)
            }
        }
    }

    /// Revert the newest committed batch. `Ok(false)` if there is none.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(batch) = self.history.pop_undo() else {
            return Ok(false);
        };
        match self.replay_batch(&batch, Direction::Undo) {
            Ok(()) => {
                log::debug!("Undid '{}'", batch.label());
                self.history.push_redo(batch);
                Ok(true)
            }
            Err(err) => {
                self.history.push_undo(batch);
                Err(err)
            }
        }
    }

    /// Reapply the newest undone batch. `Ok(false)` if there is none.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(batch) = self.history.pop_redo() else {
            return Ok(false);
        };
        match self.replay_batch(&batch, Direction::Redo) {
            Ok(()) => {
                log::debug!("Redid '{}'", batch.label());
                self.history.push_undo(batch);
                Ok(true)
            }
            Err(err) => {
                self.history.push_redo(batch);
                Err(err)
            }
        }
    }

    // ----- template and link writes -----------------------------------------

    /// Apply `patch` to a template as one undoable step, then propagate
    ///
    /// Nothing changes if any op fails to resolve.
    pub fn apply_patch(&mut self, template: TemplateId, patch: Patch) -> Result<()> {
        self.transact("Apply Patch", |world, batch| world.record_template_patch(batch, template, patch))
    }

    pub(crate) fn record_template_patch(&mut self, batch: &mut Batch, template: TemplateId, patch: Patch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let path = self.templates.describe(template);
        let before = self
            .templates
            .document(template)
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("template '{}' is not loaded", path)))?;
        let mut after = before.clone();
        void_patch::apply(&mut after, &patch).map_err(|e| PrefabError::propagation(&path, &e))?;
        let undo = diff(&after, &before);
        self.record(
            batch,
            UndoNode::PatchTemplate {
                template,
                redo: patch,
                undo,
            },
        )
    }

    /// Merge `addition` into a link's override patch
    pub(crate) fn record_link_update(&mut self, batch: &mut Batch, link: LinkId, addition: Patch) -> Result<()> {
        let before = self
            .links
            .get(link)
            .map(|l| l.patch.clone())
            .ok_or_else(|| PrefabError::reference(format!("{} is not registered", link)))?;
        let mut after = before.clone();
        after.merge(addition);
        if after == before {
            return Ok(());
        }
        self.record(batch, UndoNode::UpdateLink { link, before, after })
    }

    /// Replace a link's override patch as one undoable step
    pub fn update_link(&mut self, link: LinkId, patch: Patch, batch: Option<&mut Batch>) -> Result<()> {
        let before = self
            .links
            .get(link)
            .map(|l| l.patch.clone())
            .ok_or_else(|| PrefabError::reference(format!("{} is not registered", link)))?;
        let node = UndoNode::UpdateLink {
            link,
            before,
            after: patch,
        };
        match batch {
            Some(batch) => self.record(batch, node),
            None => self.transact("Update Link", |world, batch| world.record(batch, node)),
        }
    }

    /// Nest `source` in `target` under `alias`
    ///
    /// With a batch the creation is recorded there; without one it is applied
    /// immediately and is not undoable.
    pub fn create_link(
        &mut self,
        source: TemplateId,
        target: TemplateId,
        alias: Alias,
        patch: Patch,
        batch: Option<&mut Batch>,
    ) -> Result<LinkId> {
        let source_path = self.templates.describe(source);
        let target_path = self.templates.describe(target);
        if !self.templates.contains(source) || !self.templates.contains(target) {
            return Err(PrefabError::Validation(format!(
                "cannot link '{}' into '{}': template not loaded",
                source_path, target_path
            )));
        }
        if alias.as_str().is_empty() || alias.is_container() || alias.as_str().contains('/') {
            return Err(PrefabError::Validation(format!("'{}' is not a valid instance alias", alias)));
        }
        if self.links.find(target, &alias).is_some()
            || self
                .templates
                .document(target)
                .and_then(dom::instances)
                .map_or(false, |entries| entries.contains_key(alias.as_str()))
        {
            return Err(PrefabError::Validation(format!(
                "alias '{}' is already used in '{}'",
                alias, target_path
            )));
        }
        if CycleDetector::new(&self.tree, &self.templates)
            .template_source_paths(source)
            .contains(&target_path)
        {
            log::warn!("Refusing to nest '{}' in '{}'", source_path, target_path);
            return Err(PrefabError::Cycle {
                candidate: source_path,
                ancestor: target_path,
            });
        }

        let id = self.links.allocate_id();
        let node = UndoNode::CreateLink {
            link: Link {
                id,
                source_template: source,
                target_template: target,
                instance_alias: alias,
                patch,
            },
        };
        match batch {
            Some(batch) => self.record(batch, node)?,
            None => self.replay(&node, Direction::Redo)?,
        }
        Ok(id)
    }

    /// Remove the link of a nested instance and hand back its override patch
    ///
    /// The nested instance disappears from its parent template.
    pub fn remove_link(&mut self, instance: InstanceHandle, batch: &mut Batch) -> Result<Patch> {
        if instance == self.tree.root() {
            return Err(PrefabError::Validation("the root instance has no link".to_string()));
        }
        let link_id = self.instance_ref(instance)?.link_id().ok_or_else(|| {
            PrefabError::Validation(format!(
                "'{}' was added by an override and has no link",
                self.tree.absolute_alias_path(instance)
            ))
        })?;
        let link = self
            .links
            .get(link_id)
            .cloned()
            .ok_or_else(|| PrefabError::reference(format!("{} is not registered", link_id)))?;
        let patch = link.patch.clone();
        self.record(batch, UndoNode::RemoveLink { link })?;
        Ok(patch)
    }
}
