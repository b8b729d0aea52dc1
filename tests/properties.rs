use std::collections::{BTreeSet, HashMap};
use std::sync::Once;

use proptest::prelude::*;

use strata::{component_id_of, register, ComponentId, Entity, Signature, Version, World};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct P(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Q(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct R(u16);

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register::<P>().unwrap();
        register::<Q>().unwrap();
        register::<R>().unwrap();
    });
}

fn component_ids() -> [ComponentId; 3] {
    init_registry();
    [
        component_id_of::<P>().unwrap(),
        component_id_of::<Q>().unwrap(),
        component_id_of::<R>().unwrap(),
    ]
}

#[derive(Clone, Debug)]
enum Op {
    Create(u8),
    Destroy(usize),
    Add(usize, u8),
    Remove(usize, u8),
    Set(usize, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8).prop_map(Op::Create),
        any::<usize>().prop_map(Op::Destroy),
        (any::<usize>(), 0u8..3).prop_map(|(index, component)| Op::Add(index, component)),
        (any::<usize>(), 0u8..3).prop_map(|(index, component)| Op::Remove(index, component)),
        (any::<usize>(), any::<u64>()).prop_map(|(index, value)| Op::Set(index, value)),
    ]
}

fn mask_to_components(mask: u8, ids: &[ComponentId; 3]) -> BTreeSet<ComponentId> {
    (0..3)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| ids[bit])
        .collect()
}

/// Directory coherence (P1), chunk packing (P2), signature uniqueness (P3),
/// and size/capacity accounting (P6), checked against a shadow model.
fn check_invariants(world: &World, model: &[(Entity, BTreeSet<ComponentId>)]) {
    // P1: every modeled entity resolves, sits where the directory says, and
    // lives in an archetype with exactly its component set.
    for (entity, components) in model {
        let slot = world
            .location(*entity)
            .expect("modeled entity must be alive");
        let archetype = world.archetype(slot.archetype);
        assert_eq!(
            archetype.chunk_entities(slot.chunk as usize)[slot.row as usize],
            entity.id
        );
        let expected: Vec<ComponentId> = components.iter().copied().collect();
        assert_eq!(
            *archetype.signature(),
            Signature::from_components(&expected)
        );
    }
    assert_eq!(world.size() as usize, model.len());

    // P2: every id stored in a live chunk row is a live entity.
    for archetype in world.archetypes() {
        for chunk in 0..archetype.chunk_count() {
            for &id in archetype.chunk_entities(chunk) {
                assert!(world.contains(Entity::new(id, world.id())));
            }
        }
    }

    // P3: no two archetypes share a signature.
    let archetypes = world.archetypes();
    for (index, left) in archetypes.iter().enumerate() {
        for right in archetypes.iter().skip(index + 1) {
            assert_ne!(left.signature(), right.signature());
        }
    }

    // P6: accounting sums.
    let size: usize = archetypes.iter().map(|archetype| archetype.len()).sum();
    let capacity: usize = archetypes
        .iter()
        .map(|archetype| archetype.chunk_count() * archetype.entities_per_chunk())
        .sum();
    assert_eq!(world.size() as usize, size);
    assert_eq!(world.capacity() as usize, capacity);
}

fn apply_ops(world: &mut World, ops: &[Op]) -> Vec<(Entity, BTreeSet<ComponentId>)> {
    let ids = component_ids();
    let p = ids[0];
    let mut model: Vec<(Entity, BTreeSet<ComponentId>)> = Vec::new();
    // P5: versions per id only ever grow across recycles.
    let mut last_version: HashMap<u32, Version> = HashMap::new();

    for op in ops {
        match op {
            Op::Create(mask) => {
                let components = mask_to_components(*mask, &ids);
                let list: Vec<ComponentId> = components.iter().copied().collect();
                let entity = world.create_from(&list).unwrap();
                let version = world.reference(entity).unwrap().version;
                if let Some(previous) = last_version.get(&entity.id) {
                    assert!(version > *previous, "recycled version must grow");
                }
                last_version.insert(entity.id, version);
                model.push((entity, components));
            }
            Op::Destroy(index) => {
                if model.is_empty() {
                    continue;
                }
                let (entity, _) = model.swap_remove(index % model.len());
                world.destroy(entity).unwrap();
            }
            Op::Add(index, component) => {
                if model.is_empty() {
                    continue;
                }
                let slot = index % model.len();
                let component = ids[*component as usize];
                let (entity, components) = &mut model[slot];
                if components.contains(&component) {
                    assert!(world.add_by_id(*entity, component).is_err());
                } else {
                    world.add_by_id(*entity, component).unwrap();
                    components.insert(component);
                }
            }
            Op::Remove(index, component) => {
                if model.is_empty() {
                    continue;
                }
                let slot = index % model.len();
                let component = ids[*component as usize];
                let (entity, components) = &mut model[slot];
                if components.contains(&component) {
                    world.remove_by_id(*entity, component).unwrap();
                    components.remove(&component);
                } else {
                    assert!(world.remove_by_id(*entity, component).is_err());
                }
            }
            Op::Set(index, value) => {
                if model.is_empty() {
                    continue;
                }
                let slot = index % model.len();
                let (entity, components) = &model[slot];
                if components.contains(&p) {
                    world.set(*entity, P(*value)).unwrap();
                    assert_eq!(world.get::<P>(*entity).unwrap().0, *value);
                }
            }
        }
    }
    model
}

proptest! {
    #[test]
    fn random_structural_ops_preserve_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..200)
    ) {
        let mut world = World::new(0);
        let model = apply_ops(&mut world, &ops);
        check_invariants(&world, &model);
    }

    #[test]
    fn invariants_survive_trim_excess(
        ops in proptest::collection::vec(op_strategy(), 1..150)
    ) {
        let mut world = World::new(0);
        let model = apply_ops(&mut world, &ops);
        world.trim_excess();
        check_invariants(&world, &model);

        // Idempotence (P7): a second trim with no structural change between
        // must not alter observable state.
        let snapshot = (world.size(), world.capacity(), world.archetype_count());
        world.trim_excess();
        prop_assert_eq!(
            snapshot,
            (world.size(), world.capacity(), world.archetype_count())
        );
        check_invariants(&world, &model);
    }

    #[test]
    fn destroyed_entities_never_resolve(count in 1usize..100) {
        init_registry();
        let mut world = World::new(0);
        let signature = Signature::from_components(&[component_ids()[0]]);

        let entities: Vec<_> = (0..count)
            .map(|_| world.create(&signature).unwrap())
            .collect();
        let references: Vec<_> = entities
            .iter()
            .map(|entity| world.reference(*entity).unwrap())
            .collect();

        for entity in &entities {
            world.destroy(*entity).unwrap();
        }

        for (entity, reference) in entities.iter().zip(&references) {
            prop_assert!(!world.contains(*entity));
            prop_assert!(!world.is_alive(*reference));
            prop_assert!(world.location(*entity).is_none());
        }
        prop_assert_eq!(world.size(), 0);
    }

    #[test]
    fn recycle_cycles_always_raise_the_version(cycles in 1usize..20) {
        init_registry();
        let mut world = World::new(0);
        let signature = Signature::from_components(&[component_ids()[0]]);
        let mut previous = 0u32;

        for _ in 0..cycles {
            let entity = world.create(&signature).unwrap();
            let version = world.reference(entity).unwrap().version;
            prop_assert!(version > previous);
            previous = version;
            world.destroy(entity).unwrap();
        }
    }
}
