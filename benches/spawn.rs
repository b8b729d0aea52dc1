use criterion::*;
use std::hint::black_box;
use std::sync::Once;

use strata::{register, Signature, World};

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

fn spawn_signature() -> Signature {
    Signature::from_components(&[
        strata::component_id_of::<Position>().unwrap(),
        strata::component_id_of::<Velocity>().unwrap(),
    ])
}

fn populate(world: &mut World, n: usize) {
    let signature = spawn_signature();
    for _ in 0..n {
        world.create(&signature).unwrap();
    }
}

fn spawn_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("spawn");

    for &(label, n) in &[("spawn_10k", 10_000usize), ("spawn_100k", 100_000)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || World::new(0),
                |mut world| {
                    populate(&mut world, n);
                    black_box(world);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("spawn_reserved_100k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new(0);
                world.reserve(&spawn_signature(), 100_000).unwrap();
                world
            },
            |mut world| {
                populate(&mut world, 100_000);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("create_destroy_cycle", |b| {
        b.iter_batched(
            || {
                let mut world = World::new(0);
                populate(&mut world, 10_000);
                world
            },
            |mut world| {
                let signature = spawn_signature();
                for _ in 0..1_000 {
                    let entity = world.create(&signature).unwrap();
                    world.destroy(entity).unwrap();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
