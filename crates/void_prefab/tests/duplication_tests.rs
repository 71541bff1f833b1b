//! Duplication tests
//!
//! Copies must get fresh aliases everywhere, with references between copied
//! entities pointing at the copies.

use serde_json::{json, Value};
use std::collections::HashSet;
use void_prefab::*;

const LAMP: &str = "prefabs/lamp.prefab";

fn lamp_template() -> Value {
    json!({
        "ContainerEntity": {"Id": "ContainerEntity", "Name": "Lamp", "Components": {}},
        "Entities": {
            "Entity_[bulb]": {
                "Id": "Entity_[bulb]",
                "Name": "Bulb",
                "Components": {
                    "Transform": {"Parent Entity": "ContainerEntity", "Translate": [0.0, 2.0, 0.0], "Rotate": [0.0, 0.0, 0.0, 1.0]}
                }
            }
        },
        "Instances": {}
    })
}

fn setup() -> PrefabWorld {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut world = PrefabWorld::new(PrefabConfig::default(), "levels/room.prefab").unwrap();
    world.load_template(LAMP, lamp_template()).unwrap();
    world
}

fn alias_of(world: &PrefabWorld, id: EntityId) -> Alias {
    world.entity_owner(id).unwrap().alias.clone()
}

#[test]
fn test_duplicate_hierarchy_gets_fresh_aliases() {
    let mut world = setup();
    let table = world.create_entity(None, [1.0, 0.0, 0.0]).unwrap();
    let leg = world.create_entity(Some(table), [0.0, -1.0, 0.0]).unwrap();
    let table_alias = alias_of(&world, table);
    world
        .edit_entity(leg, |entity| entity.set_component("Support", json!({"of": table_alias.as_str()})))
        .unwrap();
    world.update_entity(leg).unwrap();

    let copies = world.duplicate_entities(&[table, leg]).unwrap();

    assert_eq!(copies.len(), 2);
    let (table_copy, leg_copy) = (copies[0], copies[1]);
    let originals: HashSet<Alias> = [table, leg].iter().map(|id| alias_of(&world, *id)).collect();
    let fresh: HashSet<Alias> = copies.iter().map(|id| alias_of(&world, *id)).collect();
    assert_eq!(fresh.len(), 2);
    assert!(originals.is_disjoint(&fresh));

    // The copied leg hangs off the copied table and refers to it
    assert_eq!(world.parent_id(leg_copy), Some(table_copy));
    let copy_alias = alias_of(&world, table_copy);
    assert_eq!(
        world.entity(leg_copy).unwrap().component("Support"),
        Some(&json!({"of": copy_alias.as_str()}))
    );

    // No original alias leaks into the copies
    for copy in &copies {
        let text = world.entity_document(*copy).unwrap().to_string();
        for alias in &originals {
            assert!(!text.contains(alias.as_str()), "{} leaks into {}", alias, text);
        }
    }
    // Originals are untouched
    assert_eq!(world.parent_id(leg), Some(table));
}

#[test]
fn test_duplicate_many_times_never_reuses_aliases() {
    let mut world = setup();
    let original = world.create_entity(None, [0.0; 3]).unwrap();

    let mut seen = HashSet::new();
    seen.insert(alias_of(&world, original));
    for _ in 0..10 {
        let copies = world.duplicate_entities(&[original]).unwrap();
        assert_eq!(copies.len(), 1);
        assert!(seen.insert(alias_of(&world, copies[0])));
    }
    let root_doc = world.templates().document(world.root_template().unwrap()).unwrap();
    assert_eq!(dom::entities(root_doc).unwrap().len(), 11);
}

#[test]
fn test_duplicate_nested_instance_copies_its_link() {
    let mut world = setup();
    let shelf = world.create_entity(None, [0.0; 3]).unwrap();
    let lamp = world.instantiate_prefab(LAMP, Some(shelf), [0.0, 1.0, 0.0]).unwrap();
    let lamp_container = world.container_entity_id(lamp).unwrap();

    let copies = world.duplicate_entities(&[shelf]).unwrap();

    assert_eq!(copies.len(), 2);
    let (shelf_copy, lamp_copy) = (copies[0], copies[1]);
    assert!(world.is_instance_container_entity(lamp_copy));
    assert_ne!(lamp_copy, lamp_container);
    assert_eq!(world.parent_id(lamp_copy), Some(shelf_copy));
    assert_eq!(world.parent_id(lamp_container), Some(shelf));

    let copied = world.owning_instance(lamp_copy).unwrap();
    assert_ne!(copied, lamp);
    assert_eq!(world.owning_instance_prefab_path(lamp_copy), Some(LAMP));
    assert!(world.instance(copied).unwrap().link_id().is_some());
    assert_eq!(world.instance(copied).unwrap().entities().len(), 1);
    assert_eq!(world.instance(world.root()).unwrap().nested().len(), 2);
}

#[test]
fn test_duplicate_rejects_focused_container_and_mixed_owners() {
    let mut world = setup();
    let lamp = world.instantiate_prefab(LAMP, None, [0.0; 3]).unwrap();
    let bulb = world.instance(lamp).unwrap().entity(&Alias::from("Entity_[bulb]")).unwrap().id();
    let loose = world.create_entity(None, [0.0; 3]).unwrap();
    let root_container = world.container_entity_id(world.root()).unwrap();

    assert!(matches!(world.duplicate_entities(&[]), Err(PrefabError::Validation(_))));
    assert!(matches!(world.duplicate_entities(&[root_container]), Err(PrefabError::Validation(_))));
    assert!(world.duplicate_entities(&[bulb, loose]).is_err());
}

#[test]
fn test_duplicate_inside_instance_is_an_override() {
    let mut world = setup();
    let lamp = world.instantiate_prefab(LAMP, None, [0.0; 3]).unwrap();
    let lamp_template = world.instance(lamp).unwrap().template_id();
    let bulb = world.instance(lamp).unwrap().entity(&Alias::from("Entity_[bulb]")).unwrap().id();

    let copies = world.duplicate_entities(&[bulb]).unwrap();

    assert_eq!(world.owning_instance(copies[0]), Some(lamp));
    assert_eq!(world.instance(lamp).unwrap().entities().len(), 2);
    assert_eq!(dom::entities(world.templates().document(lamp_template).unwrap()).unwrap().len(), 1);
}
