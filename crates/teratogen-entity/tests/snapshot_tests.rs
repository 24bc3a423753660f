//! Integration tests for manager snapshots.

use proptest::prelude::*;
use teratogen_entity::prelude::*;

// -- test component types ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Pos {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Inventory {
    label: String,
    items: Vec<u32>,
}

fn setup_manager() -> Manager {
    let mut m = Manager::new();
    m.register_container::<Pos>("pos");
    m.register_container::<Inventory>("inventory");
    m.register_relation("contains", Cardinality::OneToMany);
    m.register_relation("wields", Cardinality::OneToOne);
    m
}

fn reload(bytes: &[u8]) -> Manager {
    let mut m = setup_manager();
    m.deserialize(&mut &bytes[..]).unwrap();
    m
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn empty_manager_round_trips() {
    let bytes = setup_manager().to_bytes().unwrap();
    let loaded = reload(&bytes);
    assert_eq!(loaded.entity_count(), 0);
    assert_eq!(loaded.to_bytes().unwrap(), bytes);
}

#[test]
fn full_state_round_trips() {
    let mut m = setup_manager();
    let hero = m.new_entity();
    let sword = m.new_entity();
    let pack = m.new_entity();
    let potion = m.new_entity();

    m.container_mut::<Pos>("pos").unwrap().add(hero, Pos { x: 5, y: -2 });
    m.container_mut::<Inventory>("inventory").unwrap().add(
        pack,
        Inventory {
            label: "backpack".into(),
            items: vec![1, 2, 3],
        },
    );
    {
        let contains = m.relation_mut("contains").unwrap();
        contains.add_pair(hero, sword);
        contains.add_pair(hero, pack);
        contains.add_pair(pack, potion);
    }
    m.relation_mut("wields").unwrap().add_pair(hero, sword);

    let bytes = m.to_bytes().unwrap();
    let loaded = reload(&bytes);

    assert_eq!(loaded.entities().collect::<Vec<_>>(), m.entities().collect::<Vec<_>>());
    assert_eq!(loaded.container::<Pos>("pos").unwrap().get(hero), Some(&Pos { x: 5, y: -2 }));
    assert_eq!(
        loaded.container::<Inventory>("inventory").unwrap().get(pack).map(|i| i.items.len()),
        Some(3)
    );
    let contains = loaded.relation("contains").unwrap();
    assert_eq!(contains.get_lhs(potion), Some(pack));
    assert_eq!(contains.count_rhs(hero), 2);
    assert_eq!(loaded.relation("wields").unwrap().get_rhs(hero), Some(sword));
    loaded.check_invariants().unwrap();

    assert_eq!(loaded.to_bytes().unwrap(), bytes);
}

#[test]
fn shared_instance_survives_round_trip() {
    let mut m = setup_manager();
    let a = m.new_entity();
    let b = m.new_entity();
    let c = m.new_entity();
    {
        let pos = m.container_mut::<Pos>("pos").unwrap();
        let shared = pos.add(a, Pos { x: 1, y: 1 });
        pos.share(b, shared).unwrap();
        pos.add(c, Pos { x: 1, y: 1 });
    }

    let mut loaded = reload(&m.to_bytes().unwrap());
    let pos = loaded.container_mut::<Pos>("pos").unwrap();
    assert_eq!(pos.instance_count(), 2);
    assert_eq!(pos.handle(a), pos.handle(b));
    assert_ne!(pos.handle(a), pos.handle(c));

    pos.get_mut(a).unwrap().x = 99;
    assert_eq!(pos.get(b).unwrap().x, 99);
    assert_eq!(pos.get(c).unwrap().x, 1);
}

#[test]
fn states_built_differently_serialize_identically() {
    // Same logical state reached through different insertion orders.
    let mut first = setup_manager();
    let ids: Vec<EntityId> = (0..4).map(|_| first.new_entity()).collect();
    for &id in &ids {
        first
            .container_mut::<Pos>("pos")
            .unwrap()
            .add(id, Pos { x: id.to_raw() as i32, y: 0 });
    }
    first.relation_mut("contains").unwrap().add_pair(ids[0], ids[1]);
    first.relation_mut("contains").unwrap().add_pair(ids[0], ids[2]);

    let mut second = setup_manager();
    let ids2: Vec<EntityId> = (0..4).map(|_| second.new_entity()).collect();
    for &id in ids2.iter().rev() {
        second
            .container_mut::<Pos>("pos")
            .unwrap()
            .add(id, Pos { x: id.to_raw() as i32, y: 0 });
    }
    second.relation_mut("contains").unwrap().add_pair(ids2[0], ids2[2]);
    second.relation_mut("contains").unwrap().add_pair(ids2[0], ids2[1]);

    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
}

#[test]
fn removed_entities_stay_removed_after_load() {
    let mut m = setup_manager();
    let bag = m.new_entity();
    let coin = m.new_entity();
    m.container_mut::<Pos>("pos").unwrap().add(bag, Pos { x: 0, y: 0 });
    m.relation_mut("contains").unwrap().add_pair(bag, coin);
    m.remove_entity(bag);

    let loaded = reload(&m.to_bytes().unwrap());
    assert!(!loaded.has_entity(bag));
    assert!(loaded.has_entity(coin));
    assert!(loaded.container::<Pos>("pos").unwrap().get(bag).is_none());
    assert!(loaded.relation("contains").unwrap().is_empty());
}

#[test]
fn loading_requires_every_family() {
    let bytes = setup_manager().to_bytes().unwrap();
    let mut m = Manager::new();
    m.register_container::<Pos>("pos");
    m.register_relation("contains", Cardinality::OneToMany);
    let err = m.deserialize(&mut bytes.as_slice()).unwrap_err();
    assert!(matches!(err, EntityError::UnregisteredFamily { .. }));
    assert!(err.to_string().contains("inventory"));
}

#[test]
fn loading_into_wrong_handler_type_fails() {
    let mut m = setup_manager();
    let e = m.new_entity();
    m.container_mut::<Pos>("pos").unwrap().add(e, Pos { x: 1, y: 2 });
    let bytes = m.to_bytes().unwrap();

    // Same family names, but "pos" now expects a relation block.
    let mut wrong = Manager::new();
    wrong.register_container::<Inventory>("inventory");
    wrong.register_relation("contains", Cardinality::OneToMany);
    wrong.register_relation("pos", Cardinality::ManyToMany);
    wrong.register_relation("wields", Cardinality::OneToOne);
    assert!(wrong.deserialize(&mut bytes.as_slice()).is_err());
}

#[test]
fn every_truncation_is_an_error() {
    let mut m = setup_manager();
    let a = m.new_entity();
    let b = m.new_entity();
    m.container_mut::<Pos>("pos").unwrap().add(a, Pos { x: 1, y: 2 });
    m.relation_mut("contains").unwrap().add_pair(a, b);
    let bytes = m.to_bytes().unwrap();

    for len in 0..bytes.len() {
        let mut target = setup_manager();
        assert!(
            target.deserialize(&mut &bytes[..len]).is_err(),
            "prefix of {len} bytes loaded"
        );
    }
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Spawn(i32, i32),
    Despawn(usize),
    Contain(usize, usize),
    Share(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-50..50i32, -50..50i32).prop_map(|(x, y)| Op::Spawn(x, y)),
        1 => (0..32usize).prop_map(Op::Despawn),
        2 => (0..32usize, 0..32usize).prop_map(|(a, b)| Op::Contain(a, b)),
        1 => (0..32usize, 0..32usize).prop_map(|(a, b)| Op::Share(a, b)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn snapshot_round_trip_is_deterministic(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut m = setup_manager();
        let mut alive: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                Op::Spawn(x, y) => {
                    let id = m.new_entity();
                    m.container_mut::<Pos>("pos").unwrap().add(id, Pos { x, y });
                    alive.push(id);
                }
                Op::Despawn(i) if !alive.is_empty() => {
                    let id = alive.remove(i % alive.len());
                    m.remove_entity(id);
                }
                Op::Contain(a, b) if !alive.is_empty() => {
                    let (l, r) = (alive[a % alive.len()], alive[b % alive.len()]);
                    m.relation_mut("contains").unwrap().add_pair(l, r);
                }
                Op::Share(a, b) if !alive.is_empty() => {
                    let (from, to) = (alive[a % alive.len()], alive[b % alive.len()]);
                    let pos = m.container_mut::<Pos>("pos").unwrap();
                    if let Some(handle) = pos.handle(from) {
                        pos.share(to, handle).unwrap();
                    }
                }
                _ => {}
            }
        }

        prop_assert!(m.check_invariants().is_ok());
        let bytes = m.to_bytes().unwrap();
        let loaded = reload(&bytes);
        prop_assert!(loaded.check_invariants().is_ok());
        prop_assert_eq!(loaded.to_bytes().unwrap(), bytes);

        for &id in &alive {
            prop_assert_eq!(
                loaded.container::<Pos>("pos").unwrap().get(id),
                m.container::<Pos>("pos").unwrap().get(id)
            );
        }
    }
}
