//! # KEYSTONE Core
//!
//! Fixed-capacity entity/component store for a fixed-tick simulation that
//! feeds a separate render thread:
//! - Generation-checked handles for entities, components and chunks
//! - Parent/child hierarchy with lazily resolved world transforms
//! - Current and previous world transforms for render interpolation
//! - A double-buffered event stream as the only cross-thread hand-off
//!
//! ## Architecture Rules
//!
//! 1. **Capacity is fixed at startup** - exhaustion is an error, not a reallocation
//! 2. **Handles are re-checked on every use** - stale handles are detected in O(1)
//! 3. **One writer** - the simulation thread owns the store; the renderer only sees frames
//!
//! ## Example
//!
//! ```rust
//! use keystone_core::{ComponentRegistry, StoreConfig, World};
//! use keystone_shared::Vec3;
//!
//! let config = StoreConfig::default();
//! let registry = ComponentRegistry::builder().build_configured(&config);
//! let mut world = World::new(&config, registry).unwrap();
//!
//! let parent = world.create_entity("parent").unwrap();
//! let child = world.create_entity("child").unwrap();
//! world.add_child(parent, child).unwrap();
//! world.set_entity_position(parent, Vec3::new(5.0, 0.0, 0.0)).unwrap();
//! world.set_entity_position(child, Vec3::new(1.0, 0.0, 0.0)).unwrap();
//!
//! let abs = world.get_entity_position_abs(child).unwrap();
//! assert!(abs.abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-6));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod sync;

pub use config::StoreConfig;
pub use ecs::{
    AbsTransform, Component, ComponentContext, ComponentRegistry, ComponentTypeId, EntityId,
    IterFlow, LocalTransform, World,
};
pub use error::{StoreError, StoreResult};
pub use memory::{ChunkAllocator, ChunkHandle, GenPool, PoolHandle};
pub use sync::{
    FixedTimestep, RenderEvent, RenderEventKind, RenderFrame, RenderStreamReader, SubmitMode,
    TransformMirror,
};
