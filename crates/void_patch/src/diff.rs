//! Structural diff
//!
//! Objects are compared key by key. Arrays are compared by index: common
//! indices recurse, trailing elements become `remove` (highest index first) or
//! `add`. A reordered array therefore shows up as per-index changes; there is
//! no move operation.

use crate::patch::{Patch, PatchOp};
use crate::pointer::DocPath;
use serde_json::Value;

/// Compute the patch that turns `before` into `after`
pub fn diff(before: &Value, after: &Value) -> Patch {
    let mut patch = Patch::new();
    let mut path = DocPath::root();
    diff_into(&mut path, before, after, &mut patch);
    patch
}

fn diff_into(path: &mut DocPath, before: &Value, after: &Value, out: &mut Patch) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                match new.get(key) {
                    Some(new_value) => {
                        path.push(key.clone());
                        diff_into(path, old_value, new_value, out);
                        path.pop();
                    }
                    None => out.push(PatchOp::remove(path.join(key.clone()))),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    out.push(PatchOp::add(path.join(key.clone()), new_value.clone()));
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            let common = old.len().min(new.len());
            for index in 0..common {
                path.push(index.to_string());
                diff_into(path, &old[index], &new[index], out);
                path.pop();
            }
            for index in (new.len()..old.len()).rev() {
                out.push(PatchOp::remove(path.join(index.to_string())));
            }
            for (index, value) in new.iter().enumerate().skip(old.len()) {
                out.push(PatchOp::add(path.join(index.to_string()), value.clone()));
            }
        }
        _ => out.push(PatchOp::replace(path.clone(), after.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::OpKind;
    use serde_json::json;

    #[test]
    fn test_identical_is_empty() {
        let doc = json!({"a": [1, {"b": null}], "c": "d"});
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_object_members() {
        let before = json!({"keep": 1, "drop": 2, "change": {"x": 1}});
        let after = json!({"keep": 1, "change": {"x": 2}, "new": true});
        let patch = diff(&before, &after);

        let described: Vec<(OpKind, String)> =
            patch.iter().map(|op| (op.op, op.path.to_string())).collect();
        assert_eq!(
            described,
            vec![
                (OpKind::Replace, "/change/x".to_string()),
                (OpKind::Remove, "/drop".to_string()),
                (OpKind::Add, "/new".to_string()),
            ]
        );
    }

    #[test]
    fn test_arrays_by_index() {
        let patch = diff(&json!([1, 2, 3, 4]), &json!([2, 1]));
        let described: Vec<String> = patch
            .iter()
            .map(|op| format!("{:?} {}", op.op, op.path))
            .collect();
        assert_eq!(described, vec!["Replace /0", "Replace /1", "Remove /3", "Remove /2"]);

        let grow = diff(&json!([1]), &json!([1, 5, 6]));
        assert_eq!(grow.len(), 2);
        assert!(grow.iter().all(|op| op.op == OpKind::Add));
    }

    #[test]
    fn test_type_change_replaces() {
        let patch = diff(&json!({"a": [1]}), &json!({"a": {"0": 1}}));
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.ops()[0].op, OpKind::Replace);
        assert_eq!(patch.ops()[0].path.to_string(), "/a");
    }
}
