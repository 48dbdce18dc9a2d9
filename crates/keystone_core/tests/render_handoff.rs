//! Simulation and render threads meeting at the event stream.

mod common;

use std::thread;
use std::time::Duration;

use keystone_core::{FixedTimestep, StoreError, SubmitMode, TransformMirror};
use keystone_shared::Vec3;

const TICKS: u64 = 50;

#[test]
fn render_thread_sees_every_tick_in_block_mode() {
    let mut world = common::world(64);
    let reader = world.take_render_reader().unwrap();

    let render = thread::spawn(move || {
        let mut mirror = TransformMirror::with_capacity(64);
        let mut ticks = Vec::new();
        while let Some(frame) = reader.acquire() {
            ticks.push(frame.tick());
            mirror.apply(&frame);
            reader.release(frame);
        }
        (ticks, mirror)
    });

    let movers: Vec<_> = (0..8)
        .map(|i| {
            let e = world.create_entity(format!("mover{i}")).unwrap();
            world.add_render_proxy(e).unwrap();
            e
        })
        .collect();

    for tick in 1..=TICKS {
        world.begin_tick();
        for (i, &e) in movers.iter().enumerate() {
            world
                .set_entity_position(e, Vec3::new(tick as f32, i as f32, 0.0))
                .unwrap();
        }
        world.push_render_events(1.0);
        world.submit_frame(1.0).unwrap();
    }
    world.destroy_entity(movers[0]).unwrap();
    world.submit_frame(1.0).unwrap();
    drop(world);

    let (ticks, mirror) = render.join().unwrap();
    let expected: Vec<u64> = (1..=TICKS).chain(std::iter::once(TICKS)).collect();
    assert_eq!(ticks, expected);

    assert_eq!(mirror.len(), movers.len() - 1);
    assert!(mirror.get(movers[0].index()).is_none());
    let last = mirror.get(movers[3].index()).unwrap();
    assert!(last.position.abs_diff_eq(Vec3::new(TICKS as f32, 3.0, 0.0), 1e-6));
}

#[test]
fn replace_mode_keeps_only_latest_state() {
    let config = common::config(16, SubmitMode::Replace);
    let mut world = common::world_with(&config);
    let reader = world.take_render_reader().unwrap();
    let e = world.create_entity("e").unwrap();
    world.add_render_proxy(e).unwrap();

    for tick in 1..=5 {
        world.begin_tick();
        world.set_entity_position(e, Vec3::new(tick as f32, 0.0, 0.0)).unwrap();
        world.push_render_events(1.0);
        world.submit_frame(1.0).unwrap();
    }

    let frame = reader.acquire_timeout(Duration::from_millis(100)).unwrap();
    assert_eq!(frame.tick(), 5);
    assert_eq!(frame.len(), 1);
    assert_eq!(world.render_stream().stats().replaced, 4);
    assert!(reader.try_acquire().is_none());
}

#[test]
fn submit_fails_once_render_side_is_gone() {
    let mut world = common::world(4);
    drop(world.take_render_reader());
    assert_eq!(world.submit_frame(0.0), Err(StoreError::StreamClosed));
}

#[test]
fn fixed_timestep_drives_ticks() {
    let mut world = common::world(4);
    let reader = world.take_render_reader().unwrap();
    let e = world.create_entity("e").unwrap();
    world.add_render_proxy(e).unwrap();

    let mut clock = FixedTimestep::new(Duration::from_millis(10));
    let ticks = clock.advance(Duration::from_millis(35));
    for _ in 0..ticks {
        world.begin_tick();
        let x = world.get_entity_position(e).unwrap().x;
        world.set_entity_position(e, Vec3::new(x + 1.0, 0.0, 0.0)).unwrap();
    }
    world.push_render_events(clock.alpha());
    world.submit_frame(clock.alpha()).unwrap();

    let frame = reader.try_acquire().unwrap();
    assert_eq!(frame.tick(), 3);
    assert!((frame.alpha() - 0.5).abs() < 1e-4);
    let event = frame.events()[0];
    assert!(event.payload.position.abs_diff_eq(Vec3::new(2.5, 0.0, 0.0), 1e-4));
}
