//! # Component System
//!
//! Components are plain value types owned by exactly one entity. Each type
//! lives in its own fixed-capacity pool inside the component registry and
//! is addressed by `{type id, handle}`.

use crate::ecs::entity::EntityId;
use crate::memory::{ChunkAllocator, PoolHandle};

/// Identifier of a component type inside the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u16);

/// Visitor result for component iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterFlow {
    /// Keep visiting.
    Continue,
    /// Stop after this item.
    Stop,
}

impl IterFlow {
    /// True for [`IterFlow::Stop`].
    #[inline]
    #[must_use]
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// Bookkeeping stored next to every component value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentHeader {
    /// The owning entity.
    pub entity: EntityId,
    /// The component's own handle.
    pub handle: PoolHandle,
}

/// What a lifecycle hook may touch.
///
/// Hooks run while the registry is mid-update, so they only get the
/// component's identity and the chunk arena, not the whole world.
pub struct ComponentContext<'a> {
    /// The component's header.
    pub header: ComponentHeader,
    /// Arena for variable-length payloads.
    pub chunks: &'a mut ChunkAllocator,
}

/// Marker trait for store components.
///
/// Components must be:
/// - `Default`: the erased `add` path constructs a default value
/// - `Send + 'static`: the store moves between threads between frames
///
/// # Example
///
/// ```rust
/// use keystone_core::ecs::{Component, ComponentTypeId};
///
/// #[derive(Default)]
/// struct Health(u32);
///
/// impl Component for Health {
///     const TYPE_ID: ComponentTypeId = ComponentTypeId(7);
///     const NAME: &'static str = "health";
/// }
/// ```
pub trait Component: Default + Send + 'static {
    /// Unique identifier for this component type.
    const TYPE_ID: ComponentTypeId;

    /// Human-readable type name, also the key for capacity overrides in config.
    const NAME: &'static str;

    /// Called right after the component is attached.
    fn on_add(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Called right before the component is detached.
    fn on_remove(&mut self, _ctx: &mut ComponentContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_flow() {
        assert!(IterFlow::Stop.is_stop());
        assert!(!IterFlow::Continue.is_stop());
    }

    #[test]
    fn test_type_id_ordering() {
        assert!(ComponentTypeId(1) < ComponentTypeId(2));
    }
}
