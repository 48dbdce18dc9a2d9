//! # Component Registry
//!
//! The closed set of component storages, keyed by [`ComponentTypeId`].
//!
//! The list is short and fixed at startup, so lookups are a linear scan over
//! a contiguous `Vec` rather than a hash map. The registry also owns the
//! chunk arena so that lifecycle hooks can allocate variable-length data
//! while their storage is borrowed.

use super::component::{Component, ComponentTypeId};
use super::storage::{ComponentCache, ComponentStorage};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::ChunkAllocator;

/// Builds a [`ComponentRegistry`] once at startup.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ComponentRegistry::builder()
///     .register::<Health>(256)?
///     .register::<Skin>(64)?
///     .build(64 * 1024, 512);
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    storages: Vec<Box<dyn ComponentStorage>>,
}

impl RegistryBuilder {
    /// Registers a component type with a fixed capacity.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateComponentType`] if the type id is taken.
    pub fn register<C: Component>(mut self, capacity: usize) -> StoreResult<Self> {
        if self
            .storages
            .iter()
            .any(|storage| storage.component_type() == C::TYPE_ID)
        {
            return Err(StoreError::DuplicateComponentType { type_id: C::TYPE_ID });
        }
        if capacity == 0 {
            return Err(StoreError::InvalidConfig(format!(
                "component '{}' has zero capacity",
                C::NAME
            )));
        }

        tracing::debug!(component = C::NAME, capacity, "registered component storage");
        self.storages
            .push(Box::new(ComponentCache::<C>::with_capacity(capacity)));
        Ok(self)
    }

    /// Registers a component type with the capacity named in `config`.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_configured<C: Component>(self, config: &StoreConfig) -> StoreResult<Self> {
        let capacity = config.component_capacity_for(C::NAME);
        self.register::<C>(capacity)
    }

    /// Finishes the registry with its chunk arena.
    #[must_use]
    pub fn build(self, chunk_arena_bytes: usize, max_chunks: usize) -> ComponentRegistry {
        ComponentRegistry {
            storages: self.storages,
            chunks: ChunkAllocator::new(chunk_arena_bytes, max_chunks),
        }
    }

    /// Finishes the registry with the arena sizes named in `config`.
    #[must_use]
    pub fn build_configured(self, config: &StoreConfig) -> ComponentRegistry {
        self.build(config.chunk_arena_bytes, config.max_chunks)
    }
}

/// The set of component storages plus the shared chunk arena.
pub struct ComponentRegistry {
    storages: Vec<Box<dyn ComponentStorage>>,
    chunks: ChunkAllocator,
}

impl ComponentRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Number of registered component types.
    #[inline]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.storages.len()
    }

    /// Registered type ids, in registration order.
    pub fn type_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.storages.iter().map(|storage| storage.component_type())
    }

    /// Erased storage for a type id.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if the type was never registered.
    pub fn storage(&self, type_id: ComponentTypeId) -> StoreResult<&dyn ComponentStorage> {
        self.storages
            .iter()
            .find(|storage| storage.component_type() == type_id)
            .map(AsRef::as_ref)
            .ok_or(StoreError::UnregisteredComponent { type_id })
    }

    /// Erased storage for a type id, mutably.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if the type was never registered.
    pub fn storage_mut(&mut self, type_id: ComponentTypeId) -> StoreResult<&mut dyn ComponentStorage> {
        match self
            .storages
            .iter_mut()
            .find(|storage| storage.component_type() == type_id)
        {
            Some(storage) => Ok(storage.as_mut()),
            None => Err(StoreError::UnregisteredComponent { type_id }),
        }
    }

    /// Erased storage plus the chunk arena, for add/remove paths that run hooks.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if the type was never registered.
    pub fn storage_and_chunks(
        &mut self,
        type_id: ComponentTypeId,
    ) -> StoreResult<(&mut dyn ComponentStorage, &mut ChunkAllocator)> {
        let Self { storages, chunks } = self;
        match storages
            .iter_mut()
            .find(|storage| storage.component_type() == type_id)
        {
            Some(storage) => Ok((storage.as_mut(), chunks)),
            None => Err(StoreError::UnregisteredComponent { type_id }),
        }
    }

    /// Typed cache for `C`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if `C` was never registered.
    pub fn cache<C: Component>(&self) -> StoreResult<&ComponentCache<C>> {
        self.storage(C::TYPE_ID)?
            .as_any()
            .downcast_ref::<ComponentCache<C>>()
            .ok_or(StoreError::UnregisteredComponent { type_id: C::TYPE_ID })
    }

    /// Typed cache for `C`, mutably.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if `C` was never registered.
    pub fn cache_mut<C: Component>(&mut self) -> StoreResult<&mut ComponentCache<C>> {
        self.storage_mut(C::TYPE_ID)?
            .as_any_mut()
            .downcast_mut::<ComponentCache<C>>()
            .ok_or(StoreError::UnregisteredComponent { type_id: C::TYPE_ID })
    }

    /// Typed cache for `C` plus the chunk arena.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if `C` was never registered.
    pub fn cache_and_chunks<C: Component>(
        &mut self,
    ) -> StoreResult<(&mut ComponentCache<C>, &mut ChunkAllocator)> {
        let (storage, chunks) = self.storage_and_chunks(C::TYPE_ID)?;
        let cache = storage
            .as_any_mut()
            .downcast_mut::<ComponentCache<C>>()
            .ok_or(StoreError::UnregisteredComponent { type_id: C::TYPE_ID })?;
        Ok((cache, chunks))
    }

    /// The chunk arena.
    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &ChunkAllocator {
        &self.chunks
    }

    /// The chunk arena, mutably.
    #[inline]
    pub fn chunks_mut(&mut self) -> &mut ChunkAllocator {
        &mut self.chunks
    }

    /// Removes every component of every type (hooks fire), then resets the arena.
    pub fn reset_all(&mut self) {
        let Self { storages, chunks } = self;
        for storage in storages.iter_mut() {
            storage.reset(chunks);
        }
        chunks.reset();
    }

    /// Total live components across all types.
    #[must_use]
    pub fn live_components(&self) -> usize {
        self.storages.iter().map(|storage| storage.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{EntityId, IterFlow};

    #[derive(Default)]
    struct Mass(f32);

    impl Component for Mass {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(10);
        const NAME: &'static str = "mass";
    }

    #[derive(Default)]
    struct Label;

    impl Component for Label {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(11);
        const NAME: &'static str = "label";
    }

    #[derive(Default)]
    struct Impostor;

    impl Component for Impostor {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(10);
        const NAME: &'static str = "impostor";
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::builder()
            .register::<Mass>(8)
            .and_then(|b| b.register::<Label>(4))
            .unwrap()
            .build(128, 8)
    }

    #[test]
    fn test_lookup_by_type() {
        let registry = registry();
        assert_eq!(registry.type_count(), 2);
        assert_eq!(registry.storage(ComponentTypeId(11)).unwrap().type_name(), "label");
        assert_eq!(registry.storage(ComponentTypeId(10)).unwrap().capacity(), 8);
        assert_eq!(
            registry.type_ids().collect::<Vec<_>>(),
            vec![ComponentTypeId(10), ComponentTypeId(11)]
        );
    }

    #[test]
    fn test_missing_type() {
        let registry = registry();
        assert_eq!(
            registry.storage(ComponentTypeId(99)).err(),
            Some(StoreError::UnregisteredComponent {
                type_id: ComponentTypeId(99)
            })
        );
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let result = ComponentRegistry::builder()
            .register::<Mass>(8)
            .and_then(|b| b.register::<Impostor>(8));
        assert!(matches!(result, Err(StoreError::DuplicateComponentType { .. })));
    }

    #[test]
    fn test_typed_and_erased_agree() {
        let mut registry = registry();
        let (cache, chunks) = registry.cache_and_chunks::<Mass>().unwrap();
        let handle = cache.insert(EntityId::new(0, 0), Mass(2.5), chunks).unwrap();

        assert!(registry.storage(Mass::TYPE_ID).unwrap().is_valid(handle));
        assert_eq!(registry.cache::<Mass>().unwrap().get(handle).map(|m| m.0), Some(2.5));

        let mut total = 0.0;
        let flow = registry.cache_mut::<Mass>().unwrap().view(|_, mass| {
            total += mass.0;
            IterFlow::Continue
        });
        assert_eq!(flow, IterFlow::Continue);
        assert!((total - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reset_all() {
        let mut registry = registry();
        let (storage, chunks) = registry.storage_and_chunks(Label::TYPE_ID).unwrap();
        storage.add(EntityId::new(1, 0), chunks).unwrap();
        registry.chunks_mut().alloc(16).unwrap();
        assert_eq!(registry.live_components(), 1);

        registry.reset_all();
        assert_eq!(registry.live_components(), 0);
        assert_eq!(registry.chunks().live_chunks(), 0);
    }
}
