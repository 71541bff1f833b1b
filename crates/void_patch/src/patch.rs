//! Patches - ordered, path-addressed document operations
//!
//! A patch serializes as a plain JSON array of `{op, path, value}` objects so it
//! can be stored inside documents and link records unchanged.

use crate::error::Result;
use crate::pointer::DocPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a single patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Insert into an object or array (overwrites an existing object member)
    Add,
    /// Remove an existing value
    Remove,
    /// Overwrite an existing value
    Replace,
}

/// A single operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// What to do
    pub op: OpKind,
    /// Where to do it
    pub path: DocPath,
    /// Payload for `add` and `replace`; null for `remove`
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl PatchOp {
    /// Create an add operation
    pub fn add(path: DocPath, value: Value) -> Self {
        Self {
            op: OpKind::Add,
            path,
            value,
        }
    }

    /// Create a remove operation
    pub fn remove(path: DocPath) -> Self {
        Self {
            op: OpKind::Remove,
            path,
            value: Value::Null,
        }
    }

    /// Create a replace operation
    pub fn replace(path: DocPath, value: Value) -> Self {
        Self {
            op: OpKind::Replace,
            path,
            value,
        }
    }

    /// Return a copy with `prefix` prepended to the path
    pub fn prefixed(&self, prefix: &DocPath) -> Self {
        Self {
            op: self.op,
            path: prefix.concat(&self.path),
            value: self.value.clone(),
        }
    }
}

/// An ordered sequence of operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch from operations
    pub fn from_ops(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    /// Add an operation (builder pattern)
    pub fn with_op(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// Append every operation of `other`
    pub fn extend(&mut self, other: Patch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOp> {
        self.ops.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, PatchOp> {
        self.ops.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    /// Prepend `prefix` to every path in place
    pub fn prefix_paths(&mut self, prefix: &DocPath) {
        if prefix.is_root() {
            return;
        }
        for op in &mut self.ops {
            op.path = prefix.concat(&op.path);
        }
    }

    /// Return a copy with `prefix` prepended to every path
    pub fn prefixed(&self, prefix: &DocPath) -> Self {
        let mut patch = self.clone();
        patch.prefix_paths(prefix);
        patch
    }

    /// Keep only operations under `prefix`, with the prefix removed
    pub fn scoped_to(&self, prefix: &DocPath) -> Self {
        Self {
            ops: self
                .ops
                .iter()
                .filter_map(|op| {
                    op.path.strip_prefix(prefix).map(|path| PatchOp {
                        op: op.op,
                        path,
                        value: op.value.clone(),
                    })
                })
                .collect(),
        }
    }

    /// True if any operation addresses `path` or something below it
    pub fn touches(&self, path: &DocPath) -> bool {
        self.ops.iter().any(|op| op.path.starts_with(path))
    }

    /// Drop every operation addressing `path` or something below it
    pub fn remove_under(&mut self, path: &DocPath) {
        self.ops.retain(|op| !op.path.starts_with(path));
    }

    /// Append `later` and drop earlier replaces made dead by it
    ///
    /// An earlier `replace` is dropped when a later op in `later` replaces or
    /// removes the exact same path. Nothing else is reordered or removed.
    pub fn merge(&mut self, later: Patch) {
        self.ops.retain(|earlier| {
            earlier.op != OpKind::Replace
                || !later
                    .ops
                    .iter()
                    .any(|op| op.path == earlier.path && matches!(op.op, OpKind::Replace | OpKind::Remove))
        });
        self.ops.extend(later.ops);
    }

    /// Convert to the document form (a JSON array)
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse from the document form
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl FromIterator<PatchOp> for Patch {
    fn from_iter<T: IntoIterator<Item = PatchOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
