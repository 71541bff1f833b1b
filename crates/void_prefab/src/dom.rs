//! Template document layout
//!
//! ```text
//! {
//!   "ContainerEntity": { "Id": "ContainerEntity", "Name": .., "Components": {..} },
//!   "Entities":  { <alias>: { "Id": <alias>, "Name": .., "Components": {..} } },
//!   "Instances": { <alias>: { "Source": <template path> } }
//! }
//! ```

use crate::alias::{Alias, CONTAINER_ALIAS};
use serde_json::{json, Map, Value};
use void_patch::DocPath;

pub const ENTITIES: &str = "Entities";
pub const INSTANCES: &str = "Instances";
pub const SOURCE: &str = "Source";
pub const PATCHES: &str = "Patches";
pub const ID: &str = "Id";
pub const NAME: &str = "Name";
pub const COMPONENTS: &str = "Components";
pub const TRANSFORM: &str = "Transform";
pub const PARENT_ENTITY: &str = "Parent Entity";
pub const TRANSLATE: &str = "Translate";
pub const ROTATE: &str = "Rotate";

/// An empty template document with a named container
pub fn empty_template(container_name: &str) -> Value {
    json!({
        CONTAINER_ALIAS: {
            ID: CONTAINER_ALIAS,
            NAME: container_name,
            COMPONENTS: {},
        },
        ENTITIES: {},
        INSTANCES: {},
    })
}

/// Path of an entity inside its owning instance's document
pub fn entity_path(alias: &Alias) -> DocPath {
    if alias.is_container() {
        DocPath::from_segments([CONTAINER_ALIAS])
    } else {
        DocPath::from_segments([ENTITIES, alias.as_str()])
    }
}

/// Path of a nested instance entry inside its parent's document
pub fn instance_path(alias: &Alias) -> DocPath {
    DocPath::from_segments([INSTANCES, alias.as_str()])
}

/// Nested instance entry for a template source path
pub fn instance_entry(source_path: &str) -> Value {
    json!({ SOURCE: source_path })
}

/// The `Entities` map, if present
pub fn entities(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get(ENTITIES).and_then(Value::as_object)
}

/// The `Instances` map, if present
pub fn instances(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get(INSTANCES).and_then(Value::as_object)
}

/// Source path of a nested instance entry
pub fn entry_source(entry: &Value) -> Option<&str> {
    entry.get(SOURCE).and_then(Value::as_str)
}

/// True if `path` reaches inside a nested instance entry (deeper than
/// `/Instances/<alias>`)
pub fn reaches_into_nested(path: &DocPath) -> bool {
    path.len() > 2 && path.first() == Some(INSTANCES)
}

/// Container name derived from a source path (`prefabs/car.prefab` -> `car`)
pub fn name_from_source(source_path: &str) -> String {
    let file = source_path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(source_path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

/// Make sure the top-level maps exist so patches can address into them
pub fn normalize(doc: &mut Value) {
    if let Value::Object(map) = doc {
        for key in [ENTITIES, INSTANCES] {
            if !map.get(key).map_or(false, Value::is_object) {
                map.insert(key.to_string(), Value::Object(Map::new()));
            }
        }
        if !map.get(CONTAINER_ALIAS).map_or(false, Value::is_object) {
            map.insert(
                CONTAINER_ALIAS.to_string(),
                json!({ ID: CONTAINER_ALIAS, NAME: "", COMPONENTS: {} }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(entity_path(&Alias::from("Entity_[3]")).to_string(), "/Entities/Entity_[3]");
        assert_eq!(entity_path(&Alias::container()).to_string(), "/ContainerEntity");
        assert_eq!(instance_path(&Alias::from("Instance_[1]")).to_string(), "/Instances/Instance_[1]");
    }

    #[test]
    fn test_reaches_into_nested() {
        assert!(!reaches_into_nested(&DocPath::parse("/Instances/Instance_[1]").unwrap()));
        assert!(reaches_into_nested(&DocPath::parse("/Instances/Instance_[1]/Entities").unwrap()));
        assert!(!reaches_into_nested(&DocPath::parse("/Entities/Entity_[1]/Name").unwrap()));
    }

    #[test]
    fn test_name_from_source() {
        assert_eq!(name_from_source("prefabs/car.prefab"), "car");
        assert_eq!(name_from_source("C:\\levels\\town.prefab"), "town");
        assert_eq!(name_from_source("plain"), "plain");
    }

    #[test]
    fn test_normalize_fills_missing_maps() {
        let mut doc = json!({ ENTITIES: [] });
        normalize(&mut doc);
        assert!(doc[ENTITIES].is_object());
        assert!(doc[INSTANCES].is_object());
        assert_eq!(doc[CONTAINER_ALIAS][ID], json!(CONTAINER_ALIAS));
    }
}
