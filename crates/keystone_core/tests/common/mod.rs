//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::Cell;

use keystone_core::ecs::{Component, ComponentContext, ComponentRegistry, ComponentTypeId};
use keystone_core::{ChunkHandle, StoreConfig, SubmitMode, World};

thread_local! {
    static ADDS: Cell<usize> = const { Cell::new(0) };
    static REMOVES: Cell<usize> = const { Cell::new(0) };
}

/// `(on_add, on_remove)` calls made by [`Tracked`] on this thread.
pub fn hook_counts() -> (usize, usize) {
    (ADDS.with(Cell::get), REMOVES.with(Cell::get))
}

/// Counts its lifecycle hooks.
#[derive(Default)]
pub struct Tracked {
    pub value: u32,
}

impl Component for Tracked {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const NAME: &'static str = "tracked";

    fn on_add(&mut self, _ctx: &mut ComponentContext<'_>) {
        ADDS.with(|c| c.set(c.get() + 1));
    }

    fn on_remove(&mut self, _ctx: &mut ComponentContext<'_>) {
        REMOVES.with(|c| c.set(c.get() + 1));
    }
}

/// Owns a chunk for its lifetime.
#[derive(Default)]
pub struct Mesh {
    pub vertices: ChunkHandle,
}

impl Component for Mesh {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(2);
    const NAME: &'static str = "mesh";

    fn on_add(&mut self, ctx: &mut ComponentContext<'_>) {
        self.vertices = ctx.chunks.alloc_pod(&[0.0f32; 9]).unwrap_or_default();
    }

    fn on_remove(&mut self, ctx: &mut ComponentContext<'_>) {
        ctx.chunks.free(self.vertices);
    }
}

pub fn config(max_entities: usize, submit_mode: SubmitMode) -> StoreConfig {
    StoreConfig {
        max_entities,
        default_component_capacity: max_entities,
        submit_mode,
        ..StoreConfig::default()
    }
}

pub fn world_with(config: &StoreConfig) -> World {
    let registry = ComponentRegistry::builder()
        .register_configured::<Tracked>(config)
        .and_then(|b| b.register_configured::<Mesh>(config))
        .expect("registry")
        .build_configured(config);
    World::new(config, registry).expect("world")
}

pub fn world(max_entities: usize) -> World {
    world_with(&config(max_entities, SubmitMode::Block))
}
