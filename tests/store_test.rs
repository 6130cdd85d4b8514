//! Integration tests for EntityTreeStore: structure, identities and rejection policy

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rstest::{fixture, rstest};

use factory_canvas::domain::{
    EntityId, EntityKind, EntityTreeStore, FactoryModel, LogisticsLineModel, Payload, Point,
    Purity, RecipeModel, ResourceModel, Size, StoreError, StoreEvent,
};
use factory_canvas::util::testing::init_test_setup;

fn id(raw: u64) -> EntityId {
    EntityId::from_raw(raw)
}

fn factory(name: &str) -> Payload {
    FactoryModel {
        factory_name: name.into(),
        position: Point::new(0.0, 0.0),
        frame_size: Size::new(320.0, 240.0),
    }
    .into()
}

fn recipe(name: &str) -> Payload {
    RecipeModel {
        recipe_name: name.into(),
        ..RecipeModel::default()
    }
    .into()
}

fn line() -> Payload {
    LogisticsLineModel::default().into()
}

/// Checks bidirectional parent/children consistency across the whole store.
fn assert_consistent(store: &EntityTreeStore) {
    let all: Vec<_> = store.iter().collect();
    assert_eq!(all.len(), store.len(), "every entity is reachable from root");
    for entity in &all {
        match entity.parent_id {
            None => assert!(entity.is_root()),
            Some(parent) => {
                let p = store.get(parent).expect("parent must be live");
                assert_eq!(
                    p.child_ids.iter().filter(|&&c| c == entity.id).count(),
                    1,
                    "{} listed exactly once under {}",
                    entity.id,
                    parent
                );
            }
        }
        for &child in &entity.child_ids {
            assert_eq!(store.get(child).and_then(|c| c.parent_id), Some(entity.id));
        }
    }
}

/// root
/// ├── 1 factory A
/// │   ├── 2 recipe
/// │   └── 3 factory B
/// │       ├── 4 recipe
/// │       └── 5 line
/// └── 6 factory C
#[fixture]
fn populated() -> EntityTreeStore {
    init_test_setup();
    let mut store = EntityTreeStore::new();
    let a = store.create_at_root(factory("A"));
    store.create_entity(recipe("Iron Plate"), a);
    let b = store.create_entity(factory("B"), a);
    store.create_entity(recipe("Screw"), b);
    store.create_entity(line(), b);
    store.create_at_root(factory("C"));
    store
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn given_factory_and_recipe_when_moved_and_removed_then_sibling_survives() {
    init_test_setup();
    let mut store = EntityTreeStore::new();

    let f = store.create_entity(factory("Main"), EntityId::ROOT);
    assert_eq!(f.to_string(), "1");
    assert_eq!(store.root_children(), &[id(1)]);

    let r = store.create_entity(recipe("Iron Plate"), f);
    assert_eq!(r.to_string(), "2");
    assert_eq!(store.children_of(f), &[id(2)]);

    store.move_entity(r, EntityId::ROOT).unwrap();
    assert!(store.children_of(f).is_empty());
    assert_eq!(store.root_children(), &[id(1), id(2)]);

    store.remove_entity(f).unwrap();
    assert!(!store.exists(id(1)));
    assert_eq!(store.root_children(), &[id(2)]);
    assert_consistent(&store);
}

#[test]
fn given_unknown_parent_when_creating_then_falls_back_to_root() {
    init_test_setup();
    let mut store = EntityTreeStore::new();
    let unknown: EntityId = "999".parse().unwrap();

    let new_id = store.create_entity(factory("Orphan"), unknown);

    assert_eq!(store.get(new_id).unwrap().parent_id, Some(EntityId::ROOT));
    assert_eq!(store.root_children(), &[new_id]);
}

#[rstest]
#[case::recipe_parent(id(2))]
#[case::line_parent(id(5))]
fn given_childless_parent_when_creating_then_falls_back_to_root(
    mut populated: EntityTreeStore,
    #[case] parent: EntityId,
) {
    let new_id = populated.create_factory(FactoryModel::default(), parent);

    assert!(populated.children_of(parent).is_empty());
    assert_eq!(populated.get(new_id).unwrap().parent_id, Some(EntityId::ROOT));
    assert_eq!(populated.root_children(), &[id(1), id(6), new_id]);
    for entity in populated.iter() {
        if !entity.child_ids.is_empty() {
            assert!(entity.kind.can_have_children(), "{} became a parent", entity);
        }
    }
    assert_consistent(&populated);
}

#[test]
fn given_recipe_at_root_when_creating_under_it_then_recipe_stays_childless() {
    init_test_setup();
    let mut store = EntityTreeStore::new();
    let r = store.create_recipe(RecipeModel::default(), EntityId::ROOT);

    let f = store.create_factory(FactoryModel::default(), r);

    assert!(store.children_of(r).is_empty());
    assert_eq!(store.root_children(), &[r, f]);
}

// ============================================================
// Identity allocation
// ============================================================

#[rstest]
fn given_many_creations_then_ids_are_unique_and_increasing(mut populated: EntityTreeStore) {
    let mut seen: HashSet<EntityId> = store_ids(&populated).into_iter().collect();
    let mut last = id(6);
    for i in 0..20 {
        let parent = if i % 3 == 0 { EntityId::ROOT } else { last };
        let new_id = populated.create_entity(factory("F"), parent);
        assert!(new_id > last);
        assert!(seen.insert(new_id));
        last = new_id;
    }
}

#[rstest]
fn given_removed_entities_when_creating_then_ids_are_not_reused(mut populated: EntityTreeStore) {
    populated.remove_entity(id(6)).unwrap();
    let next = populated.create_at_root(factory("D"));
    assert_eq!(next, id(7));
}

fn store_ids(store: &EntityTreeStore) -> Vec<EntityId> {
    store.iter().map(|e| e.id).collect()
}

// ============================================================
// Queries
// ============================================================

#[rstest]
fn given_populated_store_when_listing_by_kind_then_creation_order(populated: EntityTreeStore) {
    let factories: Vec<EntityId> = populated.factories().iter().map(|e| e.id).collect();
    assert_eq!(factories, vec![id(1), id(3), id(6)]);

    let recipes: Vec<EntityId> = populated.recipes().iter().map(|e| e.id).collect();
    assert_eq!(recipes, vec![id(2), id(4)]);

    let roots = populated.list_by_kind(EntityKind::Root);
    assert_eq!(roots.len(), 1);
    assert!(populated.list_by_kind(EntityKind::ResourceNode).is_empty());
}

#[rstest]
fn given_moved_entity_when_listing_then_order_is_still_creation_order(
    mut populated: EntityTreeStore,
) {
    populated.move_entity(id(1), id(6)).unwrap();
    let factories: Vec<EntityId> = populated.factories().iter().map(|e| e.id).collect();
    assert_eq!(factories, vec![id(1), id(3), id(6)]);
}

#[rstest]
fn given_populated_store_when_walking_then_shapes_match(populated: EntityTreeStore) {
    assert_eq!(populated.descendants(id(1)), vec![id(2), id(3), id(4), id(5)]);
    assert_eq!(populated.ancestors(id(4)), vec![id(3), id(1), EntityId::ROOT]);
    assert!(populated.ancestors(EntityId::ROOT).is_empty());
    assert_eq!(populated.depth(), 4);
    assert_eq!(populated.leaves(), vec![id(2), id(4), id(5), id(6)]);

    let post: Vec<EntityId> = populated.iter_postorder().map(|e| e.id).collect();
    assert_eq!(post.last(), Some(&EntityId::ROOT));
    assert_eq!(&post[..3], &[id(2), id(4), id(5)]);
}

#[rstest]
fn given_unknown_id_when_querying_then_empty_results(populated: EntityTreeStore) {
    assert!(!populated.exists(id(42)));
    assert!(populated.get(id(42)).is_none());
    assert!(populated.children_of(id(42)).is_empty());
    assert!(populated.descendants(id(42)).is_empty());
}

// ============================================================
// Move
// ============================================================

#[rstest]
fn given_subtree_when_moved_then_descendants_follow(mut populated: EntityTreeStore) {
    populated.move_entity(id(3), id(6)).unwrap();

    assert_eq!(populated.children_of(id(1)), &[id(2)]);
    assert_eq!(populated.children_of(id(6)), &[id(3)]);
    assert_eq!(populated.children_of(id(3)), &[id(4), id(5)]);
    assert_eq!(populated.ancestors(id(5)), vec![id(3), id(6), EntityId::ROOT]);
    assert_consistent(&populated);
}

#[rstest]
#[case::into_recipe(id(2))]
#[case::into_line(id(5))]
fn given_childless_destination_when_moving_then_store_unchanged(
    mut populated: EntityTreeStore,
    #[case] destination: EntityId,
) {
    let before: Vec<_> = populated.iter().cloned().collect();

    let err = populated.move_entity(id(6), destination).unwrap_err();

    assert!(matches!(err, StoreError::ChildlessDestination { id, .. } if id == destination));
    let after: Vec<_> = populated.iter().cloned().collect();
    assert_eq!(before, after);
}

#[rstest]
#[case::missing_target(id(42), id(1), StoreError::NotFound(id(42)))]
#[case::missing_destination(id(6), id(42), StoreError::NotFound(id(42)))]
#[case::root_target(EntityId::ROOT, id(1), StoreError::RootImmutable)]
#[case::onto_itself(id(1), id(1), StoreError::CycleDetected { target: id(1), destination: id(1) })]
#[case::into_descendant(id(1), id(3), StoreError::CycleDetected { target: id(1), destination: id(3) })]
fn given_invalid_move_then_rejected_without_mutation(
    mut populated: EntityTreeStore,
    #[case] target: EntityId,
    #[case] destination: EntityId,
    #[case] expected: StoreError,
) {
    let before: Vec<_> = populated.iter().cloned().collect();

    assert_eq!(populated.move_entity(target, destination), Err(expected));

    let after: Vec<_> = populated.iter().cloned().collect();
    assert_eq!(before, after);
}

#[rstest]
fn given_move_to_same_parent_then_entity_goes_last(mut populated: EntityTreeStore) {
    populated.move_entity(id(1), EntityId::ROOT).unwrap();
    assert_eq!(populated.root_children(), &[id(6), id(1)]);
    assert_consistent(&populated);
}

// ============================================================
// Remove
// ============================================================

#[rstest]
fn given_nested_subtree_when_removed_then_all_descendants_gone(mut populated: EntityTreeStore) {
    let removed = populated.remove_entity(id(1)).unwrap();

    assert_eq!(removed, vec![id(2), id(4), id(5), id(3), id(1)]);
    for gone in &removed {
        assert!(!populated.exists(*gone));
    }
    for entity in populated.iter() {
        if let Some(parent) = entity.parent_id {
            assert!(!removed.contains(&parent));
        }
    }
    assert_eq!(populated.root_children(), &[id(6)]);
    assert_eq!(populated.len(), 2);
    assert_consistent(&populated);
}

#[rstest]
fn given_middle_node_when_removed_then_parent_keeps_other_children(mut populated: EntityTreeStore) {
    populated.remove_entity(id(3)).unwrap();
    assert_eq!(populated.children_of(id(1)), &[id(2)]);
    assert_consistent(&populated);
}

#[rstest]
fn given_unknown_or_root_when_removing_then_rejected(mut populated: EntityTreeStore) {
    assert_eq!(populated.remove_entity(id(42)), Err(StoreError::NotFound(id(42))));
    assert_eq!(
        populated.remove_entity(EntityId::ROOT),
        Err(StoreError::RootImmutable)
    );
    assert_eq!(populated.len(), 7);
}

#[rstest]
fn given_removed_entity_when_removed_again_then_not_found(mut populated: EntityTreeStore) {
    populated.remove_entity(id(2)).unwrap();
    assert_eq!(populated.remove_entity(id(2)), Err(StoreError::NotFound(id(2))));
}

// ============================================================
// Payload updates
// ============================================================

#[rstest]
fn given_matching_kind_when_updating_then_payload_replaced(mut populated: EntityTreeStore) {
    let model = RecipeModel {
        recipe_name: "Alternate: Cast Screw".into(),
        overclock: 250,
        machine_count: 8,
    };
    populated.set_recipe_model(id(2), model.clone()).unwrap();

    let entity = populated.get(id(2)).unwrap();
    assert_eq!(entity.payload.as_ref().and_then(Payload::as_recipe), Some(&model));
    assert_eq!(entity.parent_id, Some(id(1)));
}

#[rstest]
fn given_mismatched_kind_when_updating_then_rejected(mut populated: EntityTreeStore) {
    let err = populated
        .set_factory_model(id(2), FactoryModel::default())
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::KindMismatch {
            id: id(2),
            expected: EntityKind::Factory,
            actual: EntityKind::Recipe,
        }
    );
    let entity = populated.get(id(2)).unwrap();
    assert_eq!(
        entity.payload.as_ref().and_then(Payload::as_recipe).map(|r| r.recipe_name.as_str()),
        Some("Iron Plate")
    );
}

#[rstest]
fn given_root_or_unknown_when_updating_then_rejected(mut populated: EntityTreeStore) {
    assert!(matches!(
        populated.set_factory_model(EntityId::ROOT, FactoryModel::default()),
        Err(StoreError::KindMismatch { actual: EntityKind::Root, .. })
    ));
    assert_eq!(
        populated.update_payload(id(42), line()),
        Err(StoreError::NotFound(id(42)))
    );
}

#[test]
fn given_resource_node_when_updating_then_new_payload_stored() {
    init_test_setup();
    let mut store = EntityTreeStore::new();
    let r = store.create_at_root(recipe("Iron Ingot"));
    let node = store.create_at_root(
        ResourceModel {
            resource_name: "Iron Ore".into(),
            purity: Purity::Impure,
            recipe_id: Some(r),
            position: Point::new(5.0, 5.0),
        }
        .into(),
    );

    let upgraded = ResourceModel {
        resource_name: "Iron Ore".into(),
        purity: Purity::Pure,
        recipe_id: Some(r),
        position: Point::new(5.0, 5.0),
    };
    store.update_payload(node, upgraded.clone().into()).unwrap();

    let stored = store.get(node).unwrap().payload.as_ref().and_then(Payload::as_resource);
    assert_eq!(stored, Some(&upgraded));
}

// ============================================================
// Reset
// ============================================================

#[rstest]
fn given_populated_store_when_reset_then_matches_fresh_store(mut populated: EntityTreeStore) {
    populated.reset();

    let fresh = EntityTreeStore::new();
    assert_eq!(populated.len(), 1);
    assert!(populated.root_children().is_empty());
    assert_eq!(populated.next_id(), fresh.next_id());
    assert!(populated.root().is_some_and(|r| r.is_root() && r.child_ids.is_empty()));
    assert_eq!(populated.root(), fresh.root());
    assert_eq!(populated.create_at_root(factory("again")), id(1));
}

// ============================================================
// Events
// ============================================================

#[test]
fn given_subscriber_when_mutating_then_events_in_order() {
    init_test_setup();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut store = EntityTreeStore::new();
    let sink = Rc::clone(&events);
    let sub = store.subscribe(move |e| sink.borrow_mut().push(e.clone()));

    let f = store.create_at_root(factory("A"));
    let r = store.create_entity(recipe("R"), f);
    store.move_entity(r, EntityId::ROOT).unwrap();
    // Rejected: no event
    let _ = store.move_entity(f, r);
    store.set_recipe_model(r, RecipeModel::default()).unwrap();
    store.remove_entity(f).unwrap();
    store.reset();

    assert_eq!(
        *events.borrow(),
        vec![
            StoreEvent::Created { id: f, kind: EntityKind::Factory, parent: EntityId::ROOT },
            StoreEvent::Created { id: r, kind: EntityKind::Recipe, parent: f },
            StoreEvent::Moved { id: r, from: f, to: EntityId::ROOT },
            StoreEvent::PayloadUpdated { id: r, kind: EntityKind::Recipe },
            StoreEvent::Removed { ids: vec![f] },
            StoreEvent::Reset,
        ]
    );

    assert!(store.unsubscribe(sub));
    store.create_at_root(factory("quiet"));
    assert_eq!(events.borrow().len(), 6);
}

#[test]
fn given_stale_references_when_replaying_then_consistency_holds() {
    init_test_setup();
    let mut store = EntityTreeStore::new();
    let a = store.create_at_root(factory("A"));
    let b = store.create_entity(factory("B"), a);
    let c = store.create_entity(recipe("C"), b);
    store.remove_entity(b).unwrap();

    // A drag that outlived the delete.
    assert_eq!(store.move_entity(c, a), Err(StoreError::NotFound(c)));
    assert_eq!(store.move_entity(a, b), Err(StoreError::NotFound(b)));
    let orphan = store.create_entity(recipe("late"), b);

    assert_eq!(store.get(orphan).unwrap().parent_id, Some(EntityId::ROOT));
    assert_consistent(&store);
}
