//! Undo, redo and batch rollback

use serde_json::{json, Value};
use void_prefab::*;

const CRATE: &str = "prefabs/crate.prefab";

fn crate_template() -> Value {
    json!({
        "ContainerEntity": {"Id": "ContainerEntity", "Name": "Crate", "Components": {}},
        "Entities": {
            "Entity_[lid]": {
                "Id": "Entity_[lid]",
                "Name": "Lid",
                "Components": {
                    "Transform": {"Parent Entity": "ContainerEntity", "Translate": [0.0, 1.0, 0.0], "Rotate": [0.0, 0.0, 0.0, 1.0]}
                }
            }
        },
        "Instances": {}
    })
}

fn setup(config: PrefabConfig) -> (PrefabWorld, TemplateId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut world = PrefabWorld::new(config, "levels/dock.prefab").unwrap();
    let template = world.load_template(CRATE, crate_template()).unwrap();
    (world, template)
}

fn lid_of(world: &PrefabWorld, instance: InstanceHandle) -> EntityId {
    world.instance(instance).unwrap().entity(&Alias::from("Entity_[lid]")).unwrap().id()
}

fn root_nested(world: &PrefabWorld, alias: &Alias) -> Option<InstanceHandle> {
    world.instance(world.root()).unwrap().nested_instance(alias)
}

#[test]
fn test_undo_redo_create_entity() {
    let (mut world, _) = setup(PrefabConfig::default());
    assert!(!world.undo().unwrap());

    let id = world.create_entity(None, [1.0, 2.0, 3.0]).unwrap();
    assert_eq!(world.history().undo_label(), Some("Create Entity"));

    assert!(world.undo().unwrap());
    assert!(world.entity(id).is_none());
    assert_eq!(world.history().redo_label(), Some("Create Entity"));

    assert!(world.redo().unwrap());
    let entity = world.entity(id).unwrap();
    assert_eq!(entity.transform().translation, [1.0, 2.0, 3.0]);
    assert!(!world.history().can_redo());
}

#[test]
fn test_undo_instantiate_removes_link_and_entry() {
    let (mut world, _) = setup(PrefabConfig::default());
    let root_template = world.root_template().unwrap();
    let before = world.snapshot().unwrap();

    let handle = world.instantiate_prefab(CRATE, None, [0.0; 3]).unwrap();
    let alias = world.instance(handle).unwrap().alias().cloned().unwrap();
    let lid = lid_of(&world, handle);

    world.undo().unwrap();
    assert!(root_nested(&world, &alias).is_none());
    assert!(world.entity(lid).is_none());
    assert_eq!(world.links().targeting(root_template).count(), 0);
    assert_eq!(world.snapshot().unwrap(), before);

    world.redo().unwrap();
    let again = root_nested(&world, &alias).unwrap();
    assert_eq!(lid_of(&world, again), lid);
}

#[test]
fn test_undo_delete_restores_overrides() {
    let (mut world, _) = setup(PrefabConfig::default());
    let handle = world.instantiate_prefab(CRATE, None, [0.0; 3]).unwrap();
    let alias = world.instance(handle).unwrap().alias().cloned().unwrap();
    let lid = lid_of(&world, handle);
    world.edit_entity(lid, |entity| entity.set_name("Open Lid")).unwrap();
    world.update_entity(lid).unwrap();

    let container = world.container_entity_id(handle).unwrap();
    world.delete_entities(&[container]).unwrap();
    assert!(world.entity(lid).is_none());

    world.undo().unwrap();
    let restored = root_nested(&world, &alias).unwrap();
    assert_eq!(lid_of(&world, restored), lid);
    assert_eq!(world.entity(lid).unwrap().name(), "Open Lid");

    // And the override edit before it
    world.undo().unwrap();
    assert_eq!(world.entity(lid).unwrap().name(), "Lid");
}

#[test]
fn test_undo_create_prefab_restores_originals() {
    let (mut world, _) = setup(PrefabConfig::default());
    let ids = [
        world.create_entity(None, [0.0; 3]).unwrap(),
        world.create_entity(None, [2.0, 0.0, 0.0]).unwrap(),
    ];
    let handle = world.create_prefab(&ids, "prefabs/pair.prefab").unwrap();
    let alias = world.instance(handle).unwrap().alias().cloned().unwrap();

    world.undo().unwrap();

    assert!(root_nested(&world, &alias).is_none());
    for id in ids {
        assert_eq!(world.owning_instance(id), Some(world.root()));
    }
    // The new template stays loaded for a redo
    assert!(world.templates().find_by_path("prefabs/pair.prefab").is_some());
    world.redo().unwrap();
    assert!(root_nested(&world, &alias).is_some());
}

#[test]
fn test_transact_rolls_back_on_error() {
    let (mut world, crate_id) = setup(PrefabConfig::default());
    let root_template = world.root_template().unwrap();
    let before = world.snapshot().unwrap();
    let undo_len = world.history().undo_len();

    let result: Result<()> = world.transact("Abandoned", |world, batch| {
        world.create_link(crate_id, root_template, Alias::from("Instance_[a]"), Patch::new(), Some(batch))?;
        assert!(root_nested(world, &Alias::from("Instance_[a]")).is_some());
        Err(PrefabError::Validation("abandoned".to_string()))
    });

    assert_eq!(result, Err(PrefabError::Validation("abandoned".to_string())));
    assert_eq!(world.snapshot().unwrap(), before);
    assert_eq!(world.links().len(), 0);
    assert!(dom::instances(world.templates().document(root_template).unwrap()).unwrap().is_empty());
    assert_eq!(world.history().undo_len(), undo_len);
}

#[test]
fn test_manual_batch_commit_and_discard() {
    let (mut world, crate_id) = setup(PrefabConfig::default());
    let root_template = world.root_template().unwrap();

    let mut batch = world.begin_batch("Two Crates");
    for alias in ["Instance_[a]", "Instance_[b]"] {
        world
            .create_link(crate_id, root_template, Alias::from(alias), Patch::new(), Some(&mut batch))
            .unwrap();
    }
    assert_eq!(batch.state(), BatchState::Building);
    world.commit_batch(batch);
    assert_eq!(world.instance(world.root()).unwrap().nested().len(), 2);

    // One undo step for the whole batch
    world.undo().unwrap();
    assert!(world.instance(world.root()).unwrap().nested().is_empty());

    let mut batch = world.begin_batch("Discarded");
    world
        .create_link(crate_id, root_template, Alias::from("Instance_[c]"), Patch::new(), Some(&mut batch))
        .unwrap();
    let batch = world.discard_batch(batch);
    assert_eq!(batch.state(), BatchState::RolledBack);
    assert!(world.instance(world.root()).unwrap().nested().is_empty());
    assert_eq!(world.history().undo_label(), None);
}

#[test]
fn test_batch_ids_are_numbered_per_world() {
    let (mut world, _) = setup(PrefabConfig::default());
    let first = world.begin_batch("First").id();
    let second = world.begin_batch("Second").id();
    assert!(second > first);

    let (mut other, _) = setup(PrefabConfig::default());
    assert_eq!(other.begin_batch("First").id(), first);
}

#[test]
fn test_apply_patch_is_atomic() {
    let (mut world, crate_id) = setup(PrefabConfig::default());
    world.instantiate_prefab(CRATE, None, [0.0; 3]).unwrap();
    let document = world.templates().document(crate_id).cloned().unwrap();
    let undo_len = world.history().undo_len();

    let patch = Patch::from_ops(vec![
        PatchOp::replace(DocPath::parse("/Entities/Entity_[lid]/Name").unwrap(), json!("Heavy Lid")),
        PatchOp::replace(DocPath::parse("/Entities/Entity_[missing]/Name").unwrap(), json!("x")),
    ]);
    let err = world.apply_patch(crate_id, patch).unwrap_err();

    assert!(matches!(err, PrefabError::Propagation { .. }));
    assert_eq!(world.templates().document(crate_id), Some(&document));
    assert_eq!(world.history().undo_len(), undo_len);
}

#[test]
fn test_create_link_validates_before_mutating() {
    let (mut world, crate_id) = setup(PrefabConfig::default());
    let root_template = world.root_template().unwrap();
    world
        .create_link(crate_id, root_template, Alias::from("Instance_[a]"), Patch::new(), None)
        .unwrap();
    // Applied directly, so not undoable
    assert!(!world.history().can_undo());

    for alias in ["", "ContainerEntity", "a/b", "Instance_[a]"] {
        let err = world
            .create_link(crate_id, root_template, Alias::from(alias), Patch::new(), None)
            .unwrap_err();
        assert!(matches!(err, PrefabError::Validation(_)), "{:?}", alias);
    }
    let err = world
        .create_link(root_template, crate_id, Alias::from("Instance_[x]"), Patch::new(), None)
        .unwrap_err();
    assert!(matches!(err, PrefabError::Cycle { .. }));
    assert_eq!(world.links().len(), 1);
}

#[test]
fn test_history_limit_drops_oldest() {
    let (mut world, _) = setup(PrefabConfig::default().with_history_limit(2));
    for x in 0..3 {
        world.create_entity(None, [x as f32, 0.0, 0.0]).unwrap();
    }
    assert_eq!(world.history().undo_len(), 2);
    assert!(world.undo().unwrap());
    assert!(world.undo().unwrap());
    assert!(!world.undo().unwrap());
    let root_doc = world.templates().document(world.root_template().unwrap()).unwrap();
    assert_eq!(dom::entities(root_doc).unwrap().len(), 1);
}

#[test]
fn test_config_from_toml() {
    let config = PrefabConfig::from_toml_str("history_limit = 5\nstrict_link_patches = true\n").unwrap();
    assert_eq!(config.history_limit, 5);
    assert!(config.strict_link_patches);
    assert_eq!(config.entity_alias_prefix, "Entity");

    let err = PrefabConfig::from_toml_str("entity_alias_prefix = \"Instance\"").unwrap_err();
    assert!(matches!(err, PrefabError::Config(_)));
    assert!(PrefabWorld::new(PrefabConfig::default().with_history_limit(0), "levels/x.prefab").is_err());
}
