//! Hierarchy, destruction and transform resolve properties.

mod common;

use common::{hook_counts, Mesh, Tracked};
use keystone_core::{EntityId, LocalTransform, World};
use keystone_shared::{Quat, Vec3};
use proptest::prelude::*;

/// Builds root → {a → {a1, a2}, b → {b1}} and gives every node a `Tracked`.
fn build_tree(world: &mut World) -> Vec<EntityId> {
    let names = ["root", "a", "a1", "a2", "b", "b1"];
    let ids: Vec<_> = names.iter().map(|n| world.create_entity(*n).unwrap()).collect();
    for (parent, child) in [(0, 1), (1, 2), (1, 3), (0, 4), (4, 5)] {
        world.add_child(ids[parent], ids[child]).unwrap();
    }
    for &id in &ids {
        world.add_component::<Tracked>(id).unwrap();
    }
    world.add_component::<Mesh>(ids[2]).unwrap();
    ids
}

#[test]
fn destroy_cascades_through_subtree() {
    let mut world = common::world(16);
    let ids = build_tree(&mut world);
    let (adds_before, removes_before) = hook_counts();
    assert_eq!(world.registry().chunks().live_chunks(), 1);

    world.destroy_entity(ids[0]).unwrap();

    let (adds, removes) = hook_counts();
    assert_eq!(adds, adds_before);
    assert_eq!(removes - removes_before, ids.len());
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.registry().live_components(), 0);
    assert_eq!(world.registry().chunks().live_chunks(), 0);
    for id in ids {
        assert!(!world.is_alive(id));
    }
}

#[test]
fn destroying_a_branch_keeps_siblings_linked() {
    let mut world = common::world(16);
    let ids = build_tree(&mut world);

    world.destroy_entity(ids[1]).unwrap();

    let children: Vec<_> = world.children(ids[0]).unwrap().collect();
    assert_eq!(children, vec![ids[4]]);
    let family = world.get_entity_family(ids[4]).unwrap();
    assert!(family.prev_sibling.is_null());
    assert_eq!(world.entity_count(), 3);
}

fn build_chain(world: &mut World, depth: usize) -> Vec<EntityId> {
    let mut chain = Vec::with_capacity(depth);
    let mut parent = world.create_entity("link").unwrap();
    chain.push(parent);
    for _ in 1..depth {
        let child = world.create_entity("link").unwrap();
        world.add_child(parent, child).unwrap();
        chain.push(child);
        parent = child;
    }
    chain
}

#[test]
fn destroying_a_full_depth_chain() {
    let depth = 4096;
    let mut world = common::world(depth);
    let chain = build_chain(&mut world, depth);
    world.set_entity_position(chain[0], Vec3::new(1.0, 0.0, 0.0)).unwrap();
    assert!(world.get_entity_position_abs(chain[depth - 1]).is_ok());

    world.destroy_entity(chain[0]).unwrap();
    assert_eq!(world.entity_count(), 0);
    assert!(!world.is_alive(chain[depth - 1]));

    // The pool is reusable at full depth, and dropping the world tears it down.
    build_chain(&mut world, depth);
    assert_eq!(world.entity_count(), depth);
    drop(world);
}

#[test]
fn destroying_mid_chain_keeps_ancestors() {
    let mut world = common::world(64);
    let chain = build_chain(&mut world, 64);

    world.destroy_entity(chain[10]).unwrap();

    assert_eq!(world.entity_count(), 10);
    assert!(world.is_alive(chain[9]));
    assert_eq!(world.children(chain[9]).unwrap().count(), 0);
    assert!(!world.is_alive(chain[63]));
}

#[test]
fn shutdown_runs_every_remove_hook_once() {
    let mut world = common::world(16);
    let ids = build_tree(&mut world);
    let (_, removes_before) = hook_counts();

    world.shutdown();
    drop(world);

    let (_, removes) = hook_counts();
    assert_eq!(removes - removes_before, ids.len());
}

#[test]
fn resolve_is_idempotent() {
    let mut world = common::world(8);
    let a = world.create_entity("a").unwrap();
    let b = world.create_entity("b").unwrap();
    world.add_child(a, b).unwrap();
    world
        .set_entity_transform(
            a,
            LocalTransform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_axis_angle(Vec3::Y, 0.7), Vec3::splat(1.5)),
        )
        .unwrap();
    world.set_entity_position(b, Vec3::new(0.3, -2.0, 4.0)).unwrap();

    let first = world.get_entity_transform_abs(b).unwrap();
    let second = world.get_entity_transform_abs(b).unwrap();
    assert_eq!(first.matrix.to_cols_array(), second.matrix.to_cols_array());
    assert_eq!(first.rotation.to_array(), second.rotation.to_array());

    world.begin_tick();
    let third = world.get_entity_transform_abs(b).unwrap();
    assert_eq!(first.matrix.to_cols_array(), third.matrix.to_cols_array());
}

#[test]
fn rotation_and_scale_abs_round_trip() {
    let mut world = common::world(8);
    let parent = world.create_entity("p").unwrap();
    let child = world.create_entity("c").unwrap();
    world.add_child(parent, child).unwrap();
    world
        .set_entity_transform(
            parent,
            LocalTransform::new(Vec3::new(4.0, 0.0, 0.0), Quat::from_axis_angle(Vec3::Z, 1.2), Vec3::splat(2.0)),
        )
        .unwrap();

    let rotation = Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.4);
    world.set_entity_rotation_abs(child, rotation).unwrap();
    world.set_entity_scale_abs(child, Vec3::new(1.0, 3.0, 0.5)).unwrap();

    assert!(world.get_entity_rotation_abs(child).unwrap().abs_diff_eq(rotation, 1e-5));
    assert!(world
        .get_entity_scale_abs(child)
        .unwrap()
        .abs_diff_eq(Vec3::new(1.0, 3.0, 0.5), 1e-5));
    assert!(world.get_entity_scale(child).unwrap().abs_diff_eq(Vec3::new(0.5, 1.5, 0.25), 1e-6));
}

#[test]
fn reparent_keeps_local_and_moves_world_position() {
    let mut world = common::world(8);
    let p1 = world.create_entity("p1").unwrap();
    let p2 = world.create_entity("p2").unwrap();
    let c = world.create_entity("c").unwrap();
    world.set_entity_position(p1, Vec3::new(1.0, 0.0, 0.0)).unwrap();
    world.set_entity_position(p2, Vec3::new(0.0, 7.0, 0.0)).unwrap();
    world.set_entity_position(c, Vec3::Z).unwrap();

    world.add_child(p1, c).unwrap();
    assert!(world.get_entity_position_abs(c).unwrap().abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-6));

    world.add_child(p2, c).unwrap();
    assert!(world.get_entity_position_abs(c).unwrap().abs_diff_eq(Vec3::new(0.0, 7.0, 1.0), 1e-6));
    assert_eq!(world.get_entity_position(c).unwrap(), Vec3::Z);
}

fn arb_vec3(range: f32) -> impl Strategy<Value = Vec3> {
    (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn arb_parent() -> impl Strategy<Value = LocalTransform> {
    (arb_vec3(50.0), arb_vec3(1.0), 0.0f32..6.0, (0.25f32..4.0, 0.25f32..4.0, 0.25f32..4.0)).prop_map(
        |(position, axis, angle, (sx, sy, sz))| {
            let axis = if axis.length_squared() < 1e-3 { Vec3::Y } else { axis };
            LocalTransform::new(position, Quat::from_axis_angle(axis, angle), Vec3::new(sx, sy, sz))
        },
    )
}

/// Walks every parent's child list and checks the links agree with each child's record.
fn assert_sibling_lists_consistent(world: &World) -> Result<(), TestCaseError> {
    let mut seen = 0usize;
    for entity in world.entities() {
        let mut prev = EntityId::NULL;
        for child in world.children(entity).unwrap() {
            let family = world.get_entity_family(child).unwrap();
            prop_assert_eq!(family.parent, entity);
            prop_assert_eq!(family.prev_sibling, prev);
            prev = child;
            seen += 1;
            prop_assert!(seen <= world.entity_count(), "child list cycle");
        }
    }
    let with_parent = world
        .entities()
        .filter(|&e| !world.get_entity_family(e).unwrap().parent.is_null())
        .count();
    prop_assert_eq!(seen, with_parent);
    Ok(())
}

#[derive(Clone, Debug)]
enum Op {
    Create,
    Destroy(usize),
    Attach(usize, usize),
    Detach(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Create),
        1 => any::<usize>().prop_map(Op::Destroy),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Attach(a, b)),
        1 => any::<usize>().prop_map(Op::Detach),
    ]
}

proptest! {
    #[test]
    fn position_abs_round_trips_under_any_parent(parent_tf in arb_parent(), target in arb_vec3(100.0)) {
        let mut world = common::world(4);
        let parent = world.create_entity("p").unwrap();
        let child = world.create_entity("c").unwrap();
        world.add_child(parent, child).unwrap();
        world.set_entity_transform(parent, parent_tf).unwrap();

        world.set_entity_position_abs(child, target).unwrap();
        let got = world.get_entity_position_abs(child).unwrap();
        prop_assert!(got.abs_diff_eq(target, 1e-2), "{:?} != {:?}", got, target);
    }

    #[test]
    fn handles_stay_valid_until_removed(ops in prop::collection::vec(any::<Option<usize>>(), 1..200)) {
        let mut pool = keystone_core::GenPool::with_capacity(16);
        let mut live = Vec::new();
        let mut dead = Vec::new();

        for op in ops {
            match op {
                None => {
                    if let Some(handle) = pool.add(live.len()) {
                        live.push(handle);
                    } else {
                        prop_assert!(pool.is_full());
                    }
                }
                Some(i) if !live.is_empty() => {
                    let handle = live.swap_remove(i % live.len());
                    prop_assert!(pool.remove(handle).is_some());
                    dead.push(handle);
                }
                Some(_) => {}
            }

            for handle in &live {
                prop_assert!(pool.is_valid(*handle));
            }
            for handle in &dead {
                prop_assert!(!pool.is_valid(*handle));
            }
            prop_assert_eq!(pool.len(), live.len());
        }
    }

    #[test]
    fn hierarchy_stays_consistent(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut world = common::world(32);
        let mut known: Vec<EntityId> = Vec::new();

        for op in ops {
            let pick = |i: usize| known.get(i % known.len().max(1)).copied();
            match op {
                Op::Create => {
                    if let Ok(e) = world.create_entity("n") {
                        known.push(e);
                    }
                }
                Op::Destroy(i) => {
                    if let Some(e) = pick(i) {
                        let _ = world.destroy_entity(e);
                    }
                }
                Op::Attach(a, b) => {
                    if let (Some(p), Some(c)) = (pick(a), pick(b)) {
                        let _ = world.add_child(p, c);
                    }
                }
                Op::Detach(i) => {
                    if let Some(c) = pick(i) {
                        if let Ok(family) = world.get_entity_family(c) {
                            if !family.parent.is_null() {
                                world.remove_child(family.parent, c).unwrap();
                            }
                        }
                    }
                }
            }
            known.retain(|&e| world.is_alive(e));
            assert_sibling_lists_consistent(&world)?;
        }
    }
}
