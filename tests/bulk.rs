use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use strata::{
    component_id_of, register, EventSink, QueryDescription, Signature, World, WorldConfig,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct A(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct B(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct C(i64);

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register::<A>().unwrap();
        register::<B>().unwrap();
        register::<C>().unwrap();
    });
}

fn ids() -> (strata::ComponentId, strata::ComponentId, strata::ComponentId) {
    init_registry();
    (
        component_id_of::<A>().unwrap(),
        component_id_of::<B>().unwrap(),
        component_id_of::<C>().unwrap(),
    )
}

#[derive(Default)]
struct CountingSink {
    added: AtomicUsize,
    removed: AtomicUsize,
    set: AtomicUsize,
    destroyed: AtomicUsize,
}

impl EventSink for CountingSink {
    fn on_entity_destroyed(&self, _entity: strata::Entity) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
    fn on_component_added(&self, _entity: strata::Entity, _component: strata::ComponentId) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }
    fn on_component_removed(&self, _entity: strata::Entity, _component: strata::ComponentId) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }
    fn on_component_set(&self, _entity: strata::Entity, _component: strata::ComponentId) {
        self.set.fetch_add(1, Ordering::Relaxed);
    }
}

struct SharedSink(Arc<CountingSink>);
impl EventSink for SharedSink {
    fn on_entity_destroyed(&self, entity: strata::Entity) {
        self.0.on_entity_destroyed(entity);
    }
    fn on_component_added(&self, entity: strata::Entity, component: strata::ComponentId) {
        self.0.on_component_added(entity, component);
    }
    fn on_component_removed(&self, entity: strata::Entity, component: strata::ComponentId) {
        self.0.on_component_removed(entity, component);
    }
    fn on_component_set(&self, entity: strata::Entity, component: strata::ComponentId) {
        self.0.on_component_set(entity, component);
    }
}

#[test]
fn bulk_add_moves_a_thousand_entities_between_archetypes() {
    let (a, b, _c) = ids();
    let counter = Arc::new(CountingSink::default());
    let mut world = World::with_config(
        0,
        WorldConfig {
            sink: Some(Box::new(SharedSink(counter.clone()))),
            ..Default::default()
        },
    );

    let signature_a = Signature::from_components(&[a]);
    let mut entities = Vec::new();
    for i in 0..1_000u64 {
        let entity = world.create(&signature_a).unwrap();
        world.set(entity, A(i)).unwrap();
        entities.push(entity);
    }

    let changed = world
        .add_matching::<B>(&QueryDescription::new().with_all(&[a]))
        .unwrap();
    assert_eq!(changed, 1_000);

    // All entities now live in {A, B}; {A} is empty.
    let signature_ab = Signature::from_components(&[a, b]);
    let mut in_ab = 0;
    for archetype in world.archetypes() {
        if *archetype.signature() == signature_ab {
            in_ab = archetype.len();
        } else if *archetype.signature() == signature_a {
            assert_eq!(archetype.len(), 0);
        }
    }
    assert_eq!(in_ab, 1_000);

    // Directory was updated in ranges: every entity resolves and kept its A.
    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get::<A>(entity).unwrap().0, i as u64);
        assert_eq!(*world.get::<B>(entity).unwrap(), B::default());
    }

    // The bulk notification fans out per entity by default.
    assert_eq!(counter.added.load(Ordering::Relaxed), 1_000);
}

#[test]
fn bulk_add_matches_per_entity_post_state() {
    let (a, b, _c) = ids();
    let mut bulk_world = World::new(0);
    let mut serial_world = World::new(1);
    let signature = Signature::from_components(&[a]);

    let mut serial_entities = Vec::new();
    for i in 0..257u64 {
        let entity = bulk_world.create(&signature).unwrap();
        bulk_world.set(entity, A(i)).unwrap();
        let entity = serial_world.create(&signature).unwrap();
        serial_world.set(entity, A(i)).unwrap();
        serial_entities.push(entity);
    }

    let description = QueryDescription::new().with_all(&[a]);
    bulk_world.add_matching::<B>(&description).unwrap();
    for entity in serial_entities {
        serial_world.add::<B>(entity).unwrap();
    }

    assert_eq!(bulk_world.size(), serial_world.size());
    let bulk: Vec<u64> = bulk_world
        .query(&QueryDescription::new().with_all(&[a, b]))
        .entities()
        .map(|entity| bulk_world.get::<A>(entity).unwrap().0)
        .collect();
    let mut serial: Vec<u64> = serial_world
        .query(&QueryDescription::new().with_all(&[a, b]))
        .entities()
        .map(|entity| serial_world.get::<A>(entity).unwrap().0)
        .collect();
    let mut bulk_sorted = bulk.clone();
    bulk_sorted.sort_unstable();
    serial.sort_unstable();
    assert_eq!(bulk_sorted, serial);
}

#[test]
fn bulk_remove_drops_the_component_everywhere() {
    let (a, b, c) = ids();
    let mut world = World::new(0);
    let with_b = Signature::from_components(&[a, b]);
    let with_bc = Signature::from_components(&[a, b, c]);

    let mut entities = Vec::new();
    for i in 0..300u64 {
        let signature = if i % 2 == 0 { with_b } else { with_bc };
        let entity = world.create(&signature).unwrap();
        world.set(entity, A(i)).unwrap();
        entities.push(entity);
    }

    let changed = world
        .remove_matching::<B>(&QueryDescription::new().with_all(&[b]))
        .unwrap();
    assert_eq!(changed, 300);

    for (i, &entity) in entities.iter().enumerate() {
        assert!(!world.has::<B>(entity).unwrap());
        assert_eq!(world.get::<A>(entity).unwrap().0, i as u64);
        assert_eq!(world.has::<C>(entity).unwrap(), i % 2 == 1);
    }
}

#[test]
fn bulk_set_overwrites_matching_entities_only() {
    let (a, b, _c) = ids();
    let mut world = World::new(0);

    let plain = world.create(&Signature::from_components(&[a])).unwrap();
    let mut tagged = Vec::new();
    for _ in 0..64 {
        tagged.push(world.create(&Signature::from_components(&[a, b])).unwrap());
    }

    let changed = world
        .set_matching(&QueryDescription::new().with_all(&[b]), A(42))
        .unwrap();
    assert_eq!(changed, 64);

    for entity in tagged {
        assert_eq!(world.get::<A>(entity).unwrap().0, 42);
    }
    assert_eq!(world.get::<A>(plain).unwrap().0, 0);
}

#[test]
fn bulk_destroy_recycles_every_matched_entity() {
    let (a, b, _c) = ids();
    let counter = Arc::new(CountingSink::default());
    let mut world = World::with_config(
        0,
        WorldConfig {
            sink: Some(Box::new(SharedSink(counter.clone()))),
            ..Default::default()
        },
    );

    let keep = world.create(&Signature::from_components(&[a])).unwrap();
    let mut doomed = Vec::new();
    for _ in 0..128 {
        doomed.push(world.create(&Signature::from_components(&[a, b])).unwrap());
    }

    let destroyed = world
        .destroy_matching(&QueryDescription::new().with_all(&[b]))
        .unwrap();
    assert_eq!(destroyed, 128);
    assert_eq!(world.size(), 1);
    assert!(world.contains(keep));
    for entity in &doomed {
        assert!(!world.contains(*entity));
    }
    assert_eq!(counter.destroyed.load(Ordering::Relaxed), 128);

    // Freed ids are recycled with greater versions.
    let reborn = world.create(&Signature::from_components(&[a])).unwrap();
    assert_eq!(reborn.id, doomed[0].id);
    assert!(world.reference(reborn).unwrap().version > 1);
}

#[test]
fn bulk_add_spanning_multiple_chunks_keeps_directory_coherent() {
    let (a, b, _c) = ids();
    // A tiny chunk budget forces many chunks on both sides of the move.
    let mut world = World::with_config(
        0,
        WorldConfig {
            chunk_bytes: 256,
            ..Default::default()
        },
    );

    let signature = Signature::from_components(&[a]);
    let mut entities = Vec::new();
    for i in 0..500u64 {
        let entity = world.create(&signature).unwrap();
        world.set(entity, A(i)).unwrap();
        entities.push(entity);
    }
    assert!(world.archetypes()[0].chunk_count() > 1);

    world
        .add_matching::<B>(&QueryDescription::new().with_all(&[a]))
        .unwrap();

    for (i, &entity) in entities.iter().enumerate() {
        let slot = world.location(entity).unwrap();
        let archetype = world.archetype(slot.archetype);
        assert_eq!(
            archetype.chunk_entities(slot.chunk as usize)[slot.row as usize],
            entity.id,
            "directory must point at the row holding the entity"
        );
        assert_eq!(world.get::<A>(entity).unwrap().0, i as u64);
    }
}
