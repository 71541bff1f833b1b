//! Structural alias remapping
//!
//! Aliases appear in documents as object keys, as whole string values, and as
//! segments of slash-separated references (`/Entities/Entity_[1]/Name`,
//! `Instance_[4]/ContainerEntity`). All three are rewritten by exact segment
//! comparison, so `Entity_[1]` never matches inside `Entity_[12]`.
//!
//! Leading mappings only rewrite a whole string or the first segment of a
//! reference. `ContainerEntity` names the local container when it leads a
//! reference and a nested instance's container when it follows an alias.

use crate::patch::Patch;
use crate::pointer::DocPath;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// An old-alias to new-alias mapping
#[derive(Debug, Clone, Default)]
pub struct AliasRemap {
    map: HashMap<String, String>,
    leading: HashMap<String, String>,
}

impl AliasRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. Returns the previous target for `old`, if any.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) -> Option<String> {
        self.map.insert(old.into(), new.into())
    }

    /// Record a mapping that applies to whole strings and to the first
    /// segment of a reference only. Keys and document paths keep `old`.
    pub fn insert_leading(&mut self, old: impl Into<String>, new: impl Into<String>) -> Option<String> {
        self.leading.insert(old.into(), new.into())
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.map.get(old).map(String::as_str)
    }

    fn get_leading(&self, old: &str) -> Option<&str> {
        self.get(old).or_else(|| self.leading.get(old).map(String::as_str))
    }

    pub fn contains(&self, old: &str) -> bool {
        self.map.contains_key(old)
    }

    pub fn len(&self) -> usize {
        self.map.len() + self.leading.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.leading.is_empty()
    }

    /// Iterate over the `(old, new)` pairs that apply everywhere
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrite the segments of a document path
    pub fn remap_path(&self, path: &DocPath) -> DocPath {
        DocPath::from_segments(
            path.segments()
                .iter()
                .map(|segment| self.get(segment).unwrap_or(segment.as_str()).to_string()),
        )
    }

    /// Rewrite a string that is either an alias or a slash-separated reference
    pub fn remap_str(&self, text: &str) -> Option<String> {
        if let Some(new) = self.get_leading(text) {
            return Some(new.to_string());
        }
        if !text.contains('/') {
            return None;
        }

        let mut changed = false;
        let rewritten: Vec<&str> = text
            .split('/')
            .enumerate()
            .map(|(index, segment)| {
                let mapped = if index == 0 {
                    self.get_leading(segment)
                } else {
                    self.get(segment)
                };
                (segment, mapped)
            })
            .map(|(segment, mapped)| match mapped {
                Some(new) => {
                    changed = true;
                    new
                }
                None => segment,
            })
            .collect();
        changed.then(|| rewritten.join("/"))
    }

    /// Rewrite keys and string values throughout `value`
    pub fn remap_value(&self, value: &mut Value) {
        if self.is_empty() {
            return;
        }
        match value {
            Value::String(text) => {
                if let Some(new) = self.remap_str(text) {
                    *text = new;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.remap_value(item);
                }
            }
            Value::Object(map) => {
                let old = std::mem::take(map);
                let mut renamed = Map::new();
                for (key, mut child) in old {
                    self.remap_value(&mut child);
                    let key = self.get(&key).map(str::to_string).unwrap_or(key);
                    renamed.insert(key, child);
                }
                *map = renamed;
            }
            _ => {}
        }
    }

    /// Rewrite every path and value of a patch
    pub fn remap_patch(&self, patch: &mut Patch) {
        if self.is_empty() {
            return;
        }
        for op in patch.iter_mut() {
            op.path = self.remap_path(&op.path);
            self.remap_value(&mut op.value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AliasRemap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            leading: HashMap::new(),
        }
    }
}
