//! Undo log - reversible steps grouped into batches
//!
//! Every mutation of a template document or the link table is described by an
//! [`UndoNode`]. A node is performed as soon as it is recorded; a [`Batch`]
//! collects the nodes of one user operation so the whole operation can be
//! undone, redone or rolled back as a unit.

use crate::id::{LinkId, TemplateId};
use crate::link::Link;
use void_patch::Patch;

/// Identifier of a batch, unique within one [`TransactionLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Direction a node is replayed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Redo,
    Undo,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Redo => Direction::Undo,
            Direction::Undo => Direction::Redo,
        }
    }
}

/// One reversible step
#[derive(Debug, Clone, PartialEq)]
pub enum UndoNode {
    /// Patch a template document; `undo` restores the previous content
    PatchTemplate {
        template: TemplateId,
        redo: Patch,
        undo: Patch,
    },
    /// Swap a link's override patch
    UpdateLink {
        link: LinkId,
        before: Patch,
        after: Patch,
    },
    /// Register a link and its nested instance entry
    CreateLink { link: Link },
    /// Drop a link and its nested instance entry
    RemoveLink { link: Link },
}

impl UndoNode {
    /// Short description for logging
    pub fn describe(&self) -> String {
        match self {
            UndoNode::PatchTemplate { template, redo, .. } => {
                format!("patch {} ({} ops)", template, redo.len())
            }
            UndoNode::UpdateLink { link, after, .. } => format!("update {} ({} ops)", link, after.len()),
            UndoNode::CreateLink { link } => format!("create {} '{}'", link.id, link.instance_alias),
            UndoNode::RemoveLink { link } => format!("remove {} '{}'", link.id, link.instance_alias),
        }
    }
}

/// The state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nodes are still being recorded
    Building,
    /// Handed to the log
    Committed,
    /// Discarded and rolled back
    RolledBack,
}

/// The reversible steps of one user operation
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    label: String,
    nodes: Vec<UndoNode>,
    state: BatchState,
}

impl Batch {
    pub fn new(id: BatchId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            nodes: Vec::new(),
            state: BatchState::Building,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn nodes(&self) -> &[UndoNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, node: UndoNode) {
        debug_assert_eq!(self.state, BatchState::Building);
        self.nodes.push(node);
    }

    pub(crate) fn set_state(&mut self, state: BatchState) {
        self.state = state;
    }
}

/// Undo/redo stacks of committed batches
#[derive(Debug)]
pub struct TransactionLog {
    undo_stack: Vec<Batch>,
    redo_stack: Vec<Batch>,
    max_size: usize,
    next_batch: u64,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_SIZE)
    }
}

impl TransactionLog {
    /// Default maximum history size.
    pub const DEFAULT_MAX_SIZE: usize = 100;

    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
            next_batch: 1,
        }
    }

    /// Start an empty batch with the next free id
    pub fn begin(&mut self, label: impl Into<String>) -> Batch {
        let id = BatchId::new(self.next_batch);
        self.next_batch += 1;
        Batch::new(id, label)
    }

    /// Push a committed batch. Clears the redo stack.
    pub fn push(&mut self, mut batch: Batch) {
        batch.set_state(BatchState::Committed);
        self.redo_stack.clear();
        self.undo_stack.push(batch);
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Label of the batch the next undo reverts
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(Batch::label)
    }

    /// Label of the batch the next redo reapplies
    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(Batch::label)
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Batch> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Batch> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_undo(&mut self, batch: Batch) {
        self.undo_stack.push(batch);
    }

    pub(crate) fn push_redo(&mut self, batch: Batch) {
        self.redo_stack.push(batch);
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(log: &mut TransactionLog, label: &str) -> Batch {
        let mut batch = log.begin(label);
        batch.push(UndoNode::UpdateLink {
            link: LinkId::new(1),
            before: Patch::new(),
            after: Patch::new(),
        });
        batch
    }

    #[test]
    fn test_batch_ids_are_unique_per_log() {
        let mut log = TransactionLog::default();
        let first = log.begin("a").id();
        let second = log.begin("b").id();
        assert_ne!(first, second);

        // A fresh log numbers its batches on its own
        assert_eq!(TransactionLog::default().begin("c").id(), first);
    }

    #[test]
    fn test_push_clears_redo() {
        let mut log = TransactionLog::default();
        let next = batch(&mut log, "first");
        log.push(next);
        let undone = log.pop_undo().unwrap();
        log.push_redo(undone);
        assert!(log.can_redo());

        let next = batch(&mut log, "second");
        log.push(next);
        assert!(!log.can_redo());
        assert_eq!(log.undo_label(), Some("second"));
        assert_eq!(log.undo_stack[0].state(), BatchState::Committed);
    }

    #[test]
    fn test_history_limit() {
        let mut log = TransactionLog::new(2);
        let next = batch(&mut log, "a");
        log.push(next);
        let next = batch(&mut log, "b");
        log.push(next);
        let next = batch(&mut log, "c");
        log.push(next);
        assert_eq!(log.undo_len(), 2);
        assert_eq!(log.pop_undo().unwrap().label(), "c");
        assert_eq!(log.pop_undo().unwrap().label(), "b");
    }
}
