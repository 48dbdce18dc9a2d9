//! # Component Storage
//!
//! One fixed-capacity, generation-checked pool per component type
//! ([`ComponentCache`]), wrapped behind an object-safe interface
//! ([`ComponentStorage`]) so the registry can hold every type in one list.
//!
//! The erased interface is what the entity manager uses when it only knows a
//! `{type id, handle}` pair (component rows, recursive destroy). Typed code
//! downcasts back to the concrete cache through the registry.

use std::any::Any;

use super::component::{Component, ComponentContext, ComponentHeader, ComponentTypeId, IterFlow};
use super::entity::EntityId;
use crate::error::{StoreError, StoreResult};
use crate::memory::{ChunkAllocator, GenPool, PoolHandle};

/// Uniform interface over every component cache.
pub trait ComponentStorage: Send {
    /// Type identifier of the stored component.
    fn component_type(&self) -> ComponentTypeId;

    /// Name of the stored component type.
    fn type_name(&self) -> &'static str;

    /// Attaches a default-constructed component to `entity` and runs `on_add`.
    ///
    /// # Errors
    ///
    /// [`StoreError::PoolExhausted`] when the cache is full.
    fn add(&mut self, entity: EntityId, chunks: &mut ChunkAllocator) -> StoreResult<PoolHandle>;

    /// Runs `on_remove` and frees the slot. Returns `false` for stale handles.
    fn remove(&mut self, handle: PoolHandle, chunks: &mut ChunkAllocator) -> bool;

    /// Removes every component, running `on_remove` for each.
    fn reset(&mut self, chunks: &mut ChunkAllocator);

    /// Checks whether the handle refers to a live component.
    fn is_valid(&self, handle: PoolHandle) -> bool;

    /// Header of a live component.
    fn header(&self, handle: PoolHandle) -> Option<ComponentHeader>;

    /// Type-erased access to a live component value.
    fn get_any(&self, handle: PoolHandle) -> Option<&dyn Any>;

    /// Type-erased mutable access to a live component value.
    fn get_any_mut(&mut self, handle: PoolHandle) -> Option<&mut dyn Any>;

    /// Visits every live component value until the visitor returns [`IterFlow::Stop`].
    ///
    /// Returns [`IterFlow::Stop`] if iteration ended early.
    fn for_each(&mut self, visitor: &mut dyn FnMut(ComponentHeader, &mut dyn Any) -> IterFlow) -> IterFlow;

    /// Visits every live handle until the visitor returns [`IterFlow::Stop`].
    fn for_each_handle(&self, visitor: &mut dyn FnMut(PoolHandle) -> IterFlow) -> IterFlow;

    /// Number of live components.
    fn len(&self) -> usize;

    /// True if no component is live.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity of the cache.
    fn capacity(&self) -> usize;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct ComponentSlot<C> {
    header: ComponentHeader,
    value: C,
}

/// Fixed-capacity pool for one component type.
///
/// # Example
///
/// ```rust,ignore
/// let mut cache: ComponentCache<Health> = ComponentCache::with_capacity(256);
/// let handle = cache.insert(entity, Health(10), &mut chunks)?;
/// ```
pub struct ComponentCache<C: Component> {
    pool: GenPool<ComponentSlot<C>>,
}

impl<C: Component> ComponentCache<C> {
    /// Creates a cache holding at most `capacity` components.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: GenPool::with_capacity(capacity),
        }
    }

    /// Attaches `value` to `entity` and runs `on_add`.
    ///
    /// # Errors
    ///
    /// [`StoreError::PoolExhausted`] when the cache is full.
    pub fn insert(
        &mut self,
        entity: EntityId,
        value: C,
        chunks: &mut ChunkAllocator,
    ) -> StoreResult<PoolHandle> {
        let slot = ComponentSlot {
            header: ComponentHeader {
                entity,
                handle: PoolHandle::NULL,
            },
            value,
        };
        let Some(handle) = self.pool.add(slot) else {
            tracing::warn!(component = C::NAME, capacity = self.pool.capacity(), "component pool exhausted");
            return Err(StoreError::PoolExhausted {
                pool: C::NAME,
                capacity: self.pool.capacity(),
            });
        };

        if let Some(slot) = self.pool.get_mut(handle) {
            slot.header.handle = handle;
            let mut ctx = ComponentContext {
                header: slot.header,
                chunks,
            };
            slot.value.on_add(&mut ctx);
        }
        Ok(handle)
    }

    /// Runs `on_remove`, frees the slot and returns the value.
    pub fn take(&mut self, handle: PoolHandle, chunks: &mut ChunkAllocator) -> Option<C> {
        let slot = self.pool.get_mut(handle)?;
        let mut ctx = ComponentContext {
            header: slot.header,
            chunks,
        };
        slot.value.on_remove(&mut ctx);
        self.pool.remove(handle).map(|slot| slot.value)
    }

    /// Gets a live component.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&C> {
        self.pool.get(handle).map(|slot| &slot.value)
    }

    /// Gets a live component mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut C> {
        self.pool.get_mut(handle).map(|slot| &mut slot.value)
    }

    /// Iterates over live components with their headers.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentHeader, &C)> {
        self.pool.iter().map(|(_, slot)| (slot.header, &slot.value))
    }

    /// Iterates mutably over live components with their headers.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ComponentHeader, &mut C)> {
        self.pool
            .iter_mut()
            .map(|(_, slot)| (slot.header, &mut slot.value))
    }

    /// Visits live components until the visitor returns [`IterFlow::Stop`].
    pub fn view<F>(&mut self, mut visitor: F) -> IterFlow
    where
        F: FnMut(ComponentHeader, &mut C) -> IterFlow,
    {
        for (header, value) in self.iter_mut() {
            if visitor(header, value).is_stop() {
                return IterFlow::Stop;
            }
        }
        IterFlow::Continue
    }
}

impl<C: Component> ComponentStorage for ComponentCache<C> {
    fn component_type(&self) -> ComponentTypeId {
        C::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        C::NAME
    }

    fn add(&mut self, entity: EntityId, chunks: &mut ChunkAllocator) -> StoreResult<PoolHandle> {
        self.insert(entity, C::default(), chunks)
    }

    fn remove(&mut self, handle: PoolHandle, chunks: &mut ChunkAllocator) -> bool {
        self.take(handle, chunks).is_some()
    }

    fn reset(&mut self, chunks: &mut ChunkAllocator) {
        for (_, slot) in self.pool.iter_mut() {
            let mut ctx = ComponentContext {
                header: slot.header,
                chunks: &mut *chunks,
            };
            slot.value.on_remove(&mut ctx);
        }
        self.pool.clear();
    }

    fn is_valid(&self, handle: PoolHandle) -> bool {
        self.pool.is_valid(handle)
    }

    fn header(&self, handle: PoolHandle) -> Option<ComponentHeader> {
        self.pool.get(handle).map(|slot| slot.header)
    }

    fn get_any(&self, handle: PoolHandle) -> Option<&dyn Any> {
        self.get(handle).map(|value| value as &dyn Any)
    }

    fn get_any_mut(&mut self, handle: PoolHandle) -> Option<&mut dyn Any> {
        self.get_mut(handle).map(|value| value as &mut dyn Any)
    }

    fn for_each(&mut self, visitor: &mut dyn FnMut(ComponentHeader, &mut dyn Any) -> IterFlow) -> IterFlow {
        self.view(|header, value| visitor(header, value))
    }

    fn for_each_handle(&self, visitor: &mut dyn FnMut(PoolHandle) -> IterFlow) -> IterFlow {
        for handle in self.pool.handles() {
            if visitor(handle).is_stop() {
                return IterFlow::Stop;
            }
        }
        IterFlow::Continue
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
