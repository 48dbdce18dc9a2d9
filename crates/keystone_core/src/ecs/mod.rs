//! # Entity/Component Store
//!
//! - Entities are generation-checked handles into a fixed pool
//! - Per-entity data lives in dense side tables indexed by slot
//! - Each component type lives in its own fixed-capacity cache behind a
//!   small object-safe interface
//! - World transforms are resolved lazily from a dirty-flag hierarchy

mod component;
mod entity;
mod registry;
mod storage;
mod table;
mod transform;
mod world;

pub use component::{Component, ComponentContext, ComponentHeader, ComponentTypeId, IterFlow};
pub use entity::{ComponentRef, ComponentRow, DirtyFlags, EntityFamily, EntityId, EntityMeta};
pub use registry::{ComponentRegistry, RegistryBuilder};
pub use storage::{ComponentCache, ComponentStorage};
pub use table::DenseTable;
pub use transform::{AbsTransform, LocalTransform};
pub use world::{Children, World};
