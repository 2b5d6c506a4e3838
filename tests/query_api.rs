use cohort::prelude::*;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Position(i32, i32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Velocity(i32, i32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct A(u64);
#[derive(Clone, Copy, Debug, PartialEq)]
struct B(u64);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Likes(u32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Sees(u32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Counter(u32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Frozen;

#[test]
fn single_stream_matches_across_archetypes() {
    let mut world = World::new();
    let e1 = world.spawn();
    let e2 = world.spawn();
    let e3 = world.spawn();
    world.add_component(e1, SecondaryKey::None, Position(1, 1)).unwrap();
    world.add_component(e2, SecondaryKey::None, Position(2, 2)).unwrap();
    world.add_component(e3, SecondaryKey::None, Position(3, 3)).unwrap();
    world.add_component(e3, SecondaryKey::None, Velocity(1, 0)).unwrap();

    let mut query = QueryBuilder::new().has::<Position>().compile();
    let mut seen = HashSet::new();
    query
        .stream::<(Position,)>()
        .for_each(&mut world, |entity, pos| {
            seen.insert((entity, *pos));
        })
        .unwrap();

    let expected: HashSet<_> = vec![
        (e1, Position(1, 1)),
        (e2, Position(2, 2)),
        (e3, Position(3, 3)),
    ]
    .into_iter()
    .collect();
    assert_eq!(seen, expected);
}

#[test]
fn two_slot_stream_requires_both_components() {
    let mut world = World::new();
    let e1 = world.spawn();
    let e3 = world.spawn();
    world.add_component(e1, SecondaryKey::None, Position(1, 1)).unwrap();
    world.add_component(e3, SecondaryKey::None, Position(3, 3)).unwrap();
    world.add_component(e3, SecondaryKey::None, Velocity(1, 0)).unwrap();

    let mut query = QueryBuilder::new()
        .has::<Position>()
        .has::<Velocity>()
        .compile();
    let mut hits = Vec::new();
    query
        .stream::<(Position, Velocity)>()
        .for_each(&mut world, |entity, pos, vel| {
            hits.push((entity, *pos, *vel));
        })
        .unwrap();

    assert_eq!(hits, vec![(e3, Position(3, 3), Velocity(1, 0))]);
}

#[test]
fn not_mask_excludes_archetypes() {
    let mut world = World::new();
    let moving = world.spawn();
    let frozen = world.spawn();
    world.add_component(moving, SecondaryKey::None, Position(0, 0)).unwrap();
    world.add_component(frozen, SecondaryKey::None, Position(9, 9)).unwrap();
    world.add_component(frozen, SecondaryKey::None, Frozen).unwrap();

    let mut query = QueryBuilder::new().has::<Position>().not::<Frozen>().compile();
    let mut hits = Vec::new();
    query
        .stream::<(Position,)>()
        .for_each(&mut world, |entity, _| hits.push(entity))
        .unwrap();

    assert_eq!(hits, vec![moving]);
}

#[test]
fn relation_wildcard_cartesian() {
    let mut world = World::new();
    let target_a = world.spawn();
    let target_b = world.spawn();
    let x = world.spawn();

    world
        .add_component(x, SecondaryKey::Entity(target_a), Likes(1))
        .unwrap();
    world
        .add_component(x, SecondaryKey::Entity(target_b), Likes(2))
        .unwrap();
    world.add_component(x, SecondaryKey::None, Likes(0)).unwrap();

    // AnyTarget: the two relation keys, plain excluded
    let mut query = QueryBuilder::new()
        .has_expr(TypeExpression::any_target::<Likes>())
        .compile();
    let mut values = Vec::new();
    query
        .stream_with::<(Likes,)>(&[SecondaryKey::AnyTarget])
        .for_each(&mut world, |_, likes| values.push(likes.0))
        .unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);

    // Any: all three keys
    let mut query = QueryBuilder::new()
        .has_expr(TypeExpression::any::<Likes>())
        .compile();
    let mut values = Vec::new();
    query
        .stream_with::<(Likes,)>(&[SecondaryKey::Any])
        .for_each(&mut world, |_, likes| values.push(likes.0))
        .unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2]);
}

#[test]
fn specific_relation_key_selects_one_column() {
    let mut world = World::new();
    let target_a = world.spawn();
    let target_b = world.spawn();
    let x = world.spawn();

    world
        .add_component(x, SecondaryKey::Entity(target_a), Likes(1))
        .unwrap();
    world
        .add_component(x, SecondaryKey::Entity(target_b), Likes(2))
        .unwrap();

    let mut query = QueryBuilder::new()
        .has_expr(TypeExpression::rel::<Likes>(target_b))
        .compile();
    let mut values = Vec::new();
    query
        .stream_with::<(Likes,)>(&[SecondaryKey::Entity(target_b)])
        .for_each(&mut world, |_, likes| values.push(likes.0))
        .unwrap();
    assert_eq!(values, vec![2]);
}

#[test]
fn migration_and_backfill_sums() {
    let mut world = World::new();
    let entities = world.spawn_n(1000).to_vec();
    for (i, entity) in entities.iter().enumerate() {
        world
            .add_component(*entity, SecondaryKey::None, A(i as u64))
            .unwrap();
    }
    for (i, entity) in entities.iter().enumerate() {
        if i % 2 == 1 {
            world
                .add_component(*entity, SecondaryKey::None, B(2 * i as u64))
                .unwrap();
        }
    }

    let mut a_only = QueryBuilder::new().has::<A>().not::<B>().compile();
    assert_eq!(a_only.count(&world), 500);
    let mut both = QueryBuilder::new().has::<A>().has::<B>().compile();
    assert_eq!(both.count(&world), 500);

    let mut sum = 0u64;
    both.stream::<(A, B)>()
        .for_each(&mut world, |_, _, b| sum += b.0)
        .unwrap();
    assert_eq!(sum, 500_000);
}

#[test]
fn cross_join_visits_every_combination() {
    let mut world = World::new();
    let ta = world.spawn();
    let tb = world.spawn();
    let tc = world.spawn();
    let td = world.spawn();

    // three entities sharing one archetype with 2 Likes and 2 Sees keys
    let mut rows = Vec::new();
    for i in 0..3u32 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::Entity(ta), Likes(10 + i))
            .unwrap();
        world
            .add_component(entity, SecondaryKey::Entity(tb), Likes(20 + i))
            .unwrap();
        world
            .add_component(entity, SecondaryKey::Entity(tc), Sees(30 + i))
            .unwrap();
        world
            .add_component(entity, SecondaryKey::Entity(td), Sees(40 + i))
            .unwrap();
        rows.push(entity);
    }

    let mut query = QueryBuilder::new()
        .has_expr(TypeExpression::any_entity::<Likes>())
        .has_expr(TypeExpression::any_entity::<Sees>())
        .compile();

    let mut tuples = 0;
    let mut combos = HashSet::new();
    query
        .stream_with::<(Likes, Sees)>(&[SecondaryKey::AnyEntity, SecondaryKey::AnyEntity])
        .for_each(&mut world, |_, likes, sees| {
            tuples += 1;
            combos.insert((likes.0 / 10, sees.0 / 10));
        })
        .unwrap();

    // 2 Likes columns x 2 Sees columns x 3 rows
    assert_eq!(tuples, 2 * 2 * 3);
    let expected: HashSet<_> = vec![(1, 3), (1, 4), (2, 3), (2, 4)].into_iter().collect();
    assert_eq!(combos, expected);
}

#[test]
fn raw_yields_column_slices_per_combination() {
    let mut world = World::new();
    let target = world.spawn();
    for i in 0..4u32 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::Entity(target), Likes(i))
            .unwrap();
    }

    let mut query = QueryBuilder::new()
        .has_expr(TypeExpression::any_entity::<Likes>())
        .compile();

    let mut calls = 0;
    let mut rows = 0;
    query
        .stream_with::<(Likes,)>(&[SecondaryKey::AnyEntity])
        .raw(&mut world, |entities, likes| {
            calls += 1;
            rows += entities.len();
            assert_eq!(entities.len(), likes.len());
        })
        .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(rows, 4);
}

#[test]
fn iter_yields_shared_references() {
    let mut world = World::new();
    for i in 0..5 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Position(i, -i))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Position>().compile();
    let sum: i32 = query
        .stream::<(Position,)>()
        .iter(&world)
        .map(|(_, pos)| pos.0)
        .sum();
    assert_eq!(sum, 0 + 1 + 2 + 3 + 4);
}

#[test]
fn blit_overwrites_matched_columns() {
    let mut world = World::new();
    for _ in 0..6 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Counter(3))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Counter>().compile();
    let written = query.blit(&mut world, SecondaryKey::None, Counter(0));
    assert_eq!(written, 6);

    let mut sum = 0;
    query
        .stream::<(Counter,)>()
        .for_each(&mut world, |_, counter| sum += counter.0)
        .unwrap();
    assert_eq!(sum, 0);
}

#[test]
fn uniform_parameter_is_passed_by_value() {
    let mut world = World::new();
    for _ in 0..8 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Counter(1))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Counter>().compile();
    query
        .stream::<(Counter,)>()
        .for_each_uniform(&mut world, 5u32, |_, counter, bump| counter.0 += bump)
        .unwrap();

    let mut sum = 0;
    query
        .stream::<(Counter,)>()
        .for_each(&mut world, |_, counter| sum += counter.0)
        .unwrap();
    assert_eq!(sum, 8 * 6);
}

#[test]
fn queries_see_archetypes_created_after_compile() {
    let mut world = World::new();
    let mut query = QueryBuilder::new().has::<Position>().compile();
    assert_eq!(query.count(&world), 0);

    let entity = world.spawn();
    world
        .add_component(entity, SecondaryKey::None, Position(1, 2))
        .unwrap();
    world
        .add_component(entity, SecondaryKey::None, Velocity(0, 0))
        .unwrap();

    assert_eq!(query.count(&world), 1);
    assert_eq!(query.matched_archetypes(&world).len(), 1);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_increments_every_counter() {
    let mut world = World::new();
    for _ in 0..10_000 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Counter(0))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Counter>().compile();
    query
        .stream::<(Counter,)>()
        .par_for_each(&mut world, Some(256), |_, counter| counter.0 += 1)
        .unwrap();

    let mut sum = 0u32;
    query
        .stream::<(Counter,)>()
        .for_each(&mut world, |_, counter| sum += counter.0)
        .unwrap();
    assert_eq!(sum, 10_000);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_uniform_matches_sequential() {
    let mut world = World::new();
    for _ in 0..1000 {
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Counter(2))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Counter>().compile();
    query
        .stream::<(Counter,)>()
        .par_for_each_uniform(&mut world, None, 3u32, |_, counter, scale| {
            counter.0 *= scale
        })
        .unwrap();

    let mut sum = 0u32;
    query
        .stream::<(Counter,)>()
        .for_each(&mut world, |_, counter| sum += counter.0)
        .unwrap();
    assert_eq!(sum, 6000);
}

#[test]
fn deferred_component_removal_during_iteration() {
    let mut world = World::new();
    let entities = world.spawn_n(5).to_vec();
    for entity in &entities {
        world
            .add_component(*entity, SecondaryKey::None, Counter(1))
            .unwrap();
    }

    let mut query = QueryBuilder::new().has::<Counter>().compile();
    let lock = world.lock();
    query
        .stream::<(Counter,)>()
        .for_each_deferred(&lock, |entity, _| {
            lock.remove_component::<Counter>(entity, SecondaryKey::None)
                .unwrap();
        })
        .unwrap();
    drop(lock);

    assert_eq!(query.count(&world), 0);
    for entity in &entities {
        assert!(world.is_alive(*entity));
        assert!(world.signature_of(*entity).unwrap().is_empty());
    }
}
