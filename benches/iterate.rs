use criterion::*;
use std::hint::black_box;
use std::sync::Once;

use strata::{component_id_of, register, QueryDescription, Signature, World};

#[derive(Clone, Copy, Debug, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Velocity {
    dx: f32,
    dy: f32,
}

static INIT: Once = Once::new();

fn init_components() {
    INIT.call_once(|| {
        register::<Position>().unwrap();
        register::<Velocity>().unwrap();
    });
}

fn make_world(n: usize) -> World {
    let mut world = World::new(0);
    let signature = Signature::from_components(&[
        component_id_of::<Position>().unwrap(),
        component_id_of::<Velocity>().unwrap(),
    ]);
    for i in 0..n {
        let entity = world.create(&signature).unwrap();
        world
            .set(
                entity,
                Velocity {
                    dx: (i % 7) as f32,
                    dy: (i % 3) as f32,
                },
            )
            .unwrap();
    }
    world
}

fn integrate(world: &mut World, description: &QueryDescription) {
    let position = component_id_of::<Position>().unwrap();
    let velocity = component_id_of::<Velocity>().unwrap();
    world.par_for_each_chunk(description, |view| {
        let velocities = view.column::<Velocity>(velocity).unwrap();
        let positions = view.column_mut::<Position>(position).unwrap();
        for (position, velocity) in positions.iter_mut().zip(velocities) {
            position.x += velocity.dx * 0.016;
            position.y += velocity.dy * 0.016;
        }
    });
}

fn iterate_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("iterate");
    let position = component_id_of::<Position>().unwrap();
    let velocity = component_id_of::<Velocity>().unwrap();
    let description = QueryDescription::new().with_all(&[position, velocity]);

    for &(label, n) in &[("tick_100k", 100_000usize), ("tick_1M", 1_000_000)] {
        let mut world = make_world(n);
        group.bench_function(label, |b| {
            b.iter(|| {
                integrate(&mut world, &description);
                black_box(&world);
            });
        });
    }

    {
        let world = make_world(100_000);
        group.bench_function("entity_walk_100k", |b| {
            b.iter(|| {
                let query = world.query(&description);
                let mut count = 0usize;
                for entity in query.entities() {
                    count += entity.id as usize & 1;
                }
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
