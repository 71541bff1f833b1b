//! Patch application
//!
//! [`apply`] works on a scratch copy and only swaps it in once every op has
//! succeeded. [`apply_lenient`] applies ops one by one and collects failures;
//! propagation uses it for inherited link patches whose targets may have gone.

use crate::error::{PatchError, Result};
use crate::patch::{OpKind, Patch, PatchOp};
use crate::pointer::parse_index;
use serde_json::Value;

/// Outcome of a lenient application
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Number of ops that took effect
    pub applied: usize,
    /// Ops that were skipped, with the reason
    pub failed: Vec<(PatchOp, PatchError)>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply every op of `patch` to `doc`, or none of them
pub fn apply(doc: &mut Value, patch: &Patch) -> Result<()> {
    if patch.is_empty() {
        return Ok(());
    }
    let mut working = doc.clone();
    for (index, op) in patch.iter().enumerate() {
        if let Err(err) = apply_op(&mut working, op) {
            log::trace!("Patch rejected at op {} of {}: {}", index, patch.len(), err);
            return Err(err);
        }
    }
    *doc = working;
    Ok(())
}

/// Apply ops one at a time, skipping the ones that do not resolve
pub fn apply_lenient(doc: &mut Value, patch: &Patch) -> ApplyReport {
    let mut report = ApplyReport::default();
    for op in patch {
        match apply_op(doc, op) {
            Ok(()) => report.applied += 1,
            Err(err) => report.failed.push((op.clone(), err)),
        }
    }
    if !report.is_clean() {
        log::trace!("Applied {} ops, skipped {}", report.applied, report.failed.len());
    }
    report
}

/// Apply a single op. On error `doc` is unchanged.
pub fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<()> {
    let Some((parent_path, key)) = op.path.split_last() else {
        return match op.op {
            OpKind::Add | OpKind::Replace => {
                *doc = op.value.clone();
                Ok(())
            }
            OpKind::Remove => Err(PatchError::RootRemoval),
        };
    };

    let parent = parent_path
        .resolve_mut(doc)
        .ok_or_else(|| PatchError::PathNotFound(parent_path.to_string()))?;

    match parent {
        Value::Object(map) => match op.op {
            OpKind::Add => {
                map.insert(key.to_string(), op.value.clone());
                Ok(())
            }
            OpKind::Replace => match map.get_mut(key) {
                Some(slot) => {
                    *slot = op.value.clone();
                    Ok(())
                }
                None => Err(PatchError::PathNotFound(op.path.to_string())),
            },
            OpKind::Remove => map
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| PatchError::PathNotFound(op.path.to_string())),
        },
        Value::Array(items) => {
            let len = items.len();
            let index = if key == "-" && op.op == OpKind::Add {
                len
            } else {
                parse_index(key).ok_or_else(|| PatchError::InvalidPointer(op.path.to_string()))?
            };
            let out_of_bounds = || PatchError::IndexOutOfBounds {
                path: op.path.to_string(),
                index,
                len,
            };

            match op.op {
                OpKind::Add if index <= len => {
                    items.insert(index, op.value.clone());
                    Ok(())
                }
                OpKind::Replace if index < len => {
                    items[index] = op.value.clone();
                    Ok(())
                }
                OpKind::Remove if index < len => {
                    items.remove(index);
                    Ok(())
                }
                _ => Err(out_of_bounds()),
            }
        }
        _ => Err(PatchError::NotAContainer(parent_path.to_string())),
    }
}
