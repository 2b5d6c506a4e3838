use cohort::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};

pub const N_POS_PER_VEL: usize = 10;
pub const N_POS: usize = 10000;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

fn build() -> (World, Query) {
    let mut world = World::new();

    let pos_with_vel = N_POS / N_POS_PER_VEL;
    let pos_without_vel = N_POS - pos_with_vel;

    for _ in 0..pos_without_vel {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Position { x: 0.0, y: 0.0 })
            .unwrap();
    }

    for _ in 0..pos_with_vel {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Position { x: 0.0, y: 0.0 })
            .unwrap();
        world
            .add_component(entity, SecondaryKey::None, Velocity { dx: 0.0, dy: 0.0 })
            .unwrap();
    }

    let query = QueryBuilder::new()
        .has::<Position>()
        .has::<Velocity>()
        .compile();
    (world, query)
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build", |b| b.iter(build));
}

fn bench_update(c: &mut Criterion) {
    let (mut world, mut query) = build();

    c.bench_function("update", |b| {
        b.iter(|| {
            query
                .stream::<(Position, Velocity)>()
                .for_each(&mut world, |_, pos, vel| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                })
                .unwrap();
        })
    });
}

criterion_group!(benches, bench_build, bench_update);
criterion_main!(benches);
