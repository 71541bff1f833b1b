//! Live entities and their document form
//!
//! An [`Entity`] is the runtime view of one entity document. The transform is
//! held typed because parenting and placement are edited directly; every other
//! component is kept as an opaque document value.

use crate::dom::{COMPONENTS, ID, NAME, PARENT_ENTITY, ROTATE, TRANSFORM, TRANSLATE};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity rotation quaternion (x, y, z, w)
pub const IDENTITY_ROTATION: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Local placement and parent of an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub parent: Option<EntityId>,
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            parent: None,
            translation: [0.0; 3],
            rotation: IDENTITY_ROTATION,
        }
    }
}

impl Transform {
    pub fn with_parent(mut self, parent: Option<EntityId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_translation(mut self, translation: [f32; 3]) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: [f32; 4]) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Transform component as stored in documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TransformDom {
    #[serde(rename = "Parent Entity", default)]
    parent: Option<String>,
    #[serde(rename = "Translate", default)]
    translate: [f32; 3],
    #[serde(rename = "Rotate", default = "identity_rotation")]
    rotate: [f32; 4],
}

fn identity_rotation() -> [f32; 4] {
    IDENTITY_ROTATION
}

/// A live entity
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    name: String,
    transform: Transform,
    components: Map<String, Value>,
}

impl Entity {
    /// Create an entity with a default transform and no other components
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Transform::default(),
            components: Map::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_component(name, value);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.transform.parent
    }

    pub fn set_parent(&mut self, parent: Option<EntityId>) {
        self.transform.parent = parent;
    }

    pub fn set_local_translation(&mut self, translation: [f32; 3]) {
        self.transform.translation = translation;
    }

    pub fn set_local_rotation(&mut self, rotation: [f32; 4]) {
        self.transform.rotation = rotation;
    }

    pub fn components(&self) -> &Map<String, Value> {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Value> {
        self.components.get(name)
    }

    /// Set a component. The transform is not stored here.
    pub fn set_component(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if name == TRANSFORM {
            log::warn!("Transform of {} must be edited through the transform accessors", self.id);
            return;
        }
        self.components.insert(name, value);
    }

    pub fn remove_component(&mut self, name: &str) -> Option<Value> {
        self.components.remove(name)
    }

    /// Generate the document for this entity
    ///
    /// `parent_ref` is the parent's reference relative to the entity's frame,
    /// already resolved by the caller.
    pub fn to_document(&self, alias: &str, parent_ref: Option<String>) -> Value {
        let transform = TransformDom {
            parent: parent_ref,
            translate: self.transform.translation,
            rotate: self.transform.rotation,
        };

        let mut components = self.components.clone();
        components.insert(
            TRANSFORM.to_string(),
            serde_json::to_value(transform).unwrap_or(Value::Null),
        );

        let mut doc = Map::new();
        doc.insert(ID.to_string(), Value::String(alias.to_string()));
        doc.insert(NAME.to_string(), Value::String(self.name.clone()));
        doc.insert(COMPONENTS.to_string(), Value::Object(components));
        Value::Object(doc)
    }

    /// Build an entity from its document
    ///
    /// `resolve_parent` maps a parent reference to an id in the entity's frame.
    pub fn from_document<F>(id: EntityId, doc: &Value, resolve_parent: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<EntityId>,
    {
        let object = doc
            .as_object()
            .ok_or_else(|| format!("entity document for {} is not an object", id))?;

        let name = object.get(NAME).and_then(Value::as_str).unwrap_or_default().to_string();
        let mut components = match object.get(COMPONENTS) {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(format!("'{}' of {} is not an object", COMPONENTS, id)),
        };

        let transform = match components.remove(TRANSFORM) {
            Some(value) => {
                let dom: TransformDom = serde_json::from_value(value)
                    .map_err(|e| format!("malformed {} on {}: {}", TRANSFORM, id, e))?;
                Transform {
                    parent: dom.parent.as_deref().and_then(&resolve_parent),
                    translation: dom.translate,
                    rotation: dom.rotate,
                }
            }
            None => Transform::default(),
        };

        Ok(Self {
            id,
            name,
            transform,
            components,
        })
    }
}

/// Read the parent reference stored in an entity document
pub fn document_parent_ref(doc: &Value) -> Option<&str> {
    doc.get(COMPONENTS)?
        .get(TRANSFORM)?
        .get(PARENT_ENTITY)?
        .as_str()
}

/// Read the translation stored in an entity document
pub fn document_translation(doc: &Value) -> Option<[f32; 3]> {
    let items = doc.get(COMPONENTS)?.get(TRANSFORM)?.get(TRANSLATE)?.as_array()?;
    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

/// Read the rotation stored in an entity document
pub fn document_rotation(doc: &Value) -> Option<[f32; 4]> {
    let items = doc.get(COMPONENTS)?.get(TRANSFORM)?.get(ROTATE)?.as_array()?;
    let mut out = IDENTITY_ROTATION;
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_round_trip() {
        let parent = EntityId::from_raw(7);
        let entity = Entity::new(EntityId::from_raw(1), "Lamp")
            .with_transform(Transform::default().with_parent(Some(parent)).with_translation([1.0, 2.0, 3.0]))
            .with_component("Light", json!({"Intensity": 4}));

        let doc = entity.to_document("Entity_[1]", Some("Entity_[7]".to_string()));
        assert_eq!(doc["Id"], json!("Entity_[1]"));
        assert_eq!(document_parent_ref(&doc), Some("Entity_[7]"));
        assert_eq!(document_translation(&doc), Some([1.0, 2.0, 3.0]));

        let rebuilt = Entity::from_document(EntityId::from_raw(1), &doc, |r| {
            (r == "Entity_[7]").then_some(parent)
        })
        .unwrap();
        assert_eq!(rebuilt, entity);
    }

    #[test]
    fn test_missing_transform_defaults() {
        let doc = json!({"Id": "Entity_[1]", "Name": "Bare"});
        let entity = Entity::from_document(EntityId::from_raw(1), &doc, |_| None).unwrap();
        assert_eq!(entity.transform(), &Transform::default());
        assert_eq!(document_rotation(&entity.to_document("Entity_[1]", None)), Some(IDENTITY_ROTATION));
    }

    #[test]
    fn test_malformed_documents() {
        let id = EntityId::from_raw(1);
        assert!(Entity::from_document(id, &json!(3), |_| None).is_err());
        assert!(Entity::from_document(id, &json!({"Components": []}), |_| None).is_err());
        assert!(Entity::from_document(
            id,
            &json!({"Components": {"Transform": {"Translate": "up"}}}),
            |_| None
        )
        .is_err());
    }

    #[test]
    fn test_transform_is_not_a_plain_component() {
        let mut entity = Entity::new(EntityId::from_raw(1), "A");
        entity.set_component("Transform", json!({}));
        assert!(entity.component("Transform").is_none());
    }
}
