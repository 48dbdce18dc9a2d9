//! # Entity Manager
//!
//! The [`World`] owns the entity pool, every per-entity side table, the
//! component registry and the simulation end of the render stream.
//!
//! ## Transform resolve
//!
//! ```text
//!   set_entity_position(e)         begin_tick()
//!          │                            │
//!          ▼                            ▼
//!   e was clean? ──yes──► mark e's subtree dirty     mark every live entity dirty
//!          │               (stop at dirty nodes)
//!          no
//!          ▼
//!   calculate_abs_transform(x):
//!     walk up from x while the parent is dirty  →  scratch stack
//!     pop top-down: abs = parent.abs ∘ local, clear dirty bit
//! ```
//!
//! A dirty entity only ever has dirty descendants, so the upward walk can
//! stop at the first clean ancestor and clean ancestors are never recomputed.
//!
//! ## Thread model
//!
//! The world is mutated by the simulation thread only. The render thread
//! sees it exclusively through frames taken from the
//! [`RenderStreamReader`] handed out by [`World::take_render_reader`].

use keystone_shared::{Affine, Quat, Vec3};

use super::component::{Component, ComponentHeader, ComponentTypeId, IterFlow};
use super::entity::{ComponentRef, ComponentRow, DirtyFlags, EntityFamily, EntityId, EntityMeta};
use super::registry::ComponentRegistry;
use super::storage::ComponentStorage;
use super::table::DenseTable;
use super::transform::{AbsTransform, LocalTransform};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::{GenPool, PoolHandle};
use crate::sync::{
    render_stream, RenderEvent, RenderEventKind, RenderStreamReader, RenderStreamWriter,
    TransformPayload,
};

/// Iterator over the direct children of an entity, in attach order.
pub struct Children<'a> {
    family: &'a DenseTable<EntityFamily>,
    cursor: EntityId,
}

impl Iterator for Children<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        if self.cursor.is_null() {
            return None;
        }
        let current = self.cursor;
        self.cursor = self.family[current.index()].next_sibling;
        Some(current)
    }
}

/// The entity/component store.
///
/// All memory is reserved at creation. Entity count, component counts and
/// the chunk arena are bounded by [`StoreConfig`]; running out is a returned
/// error, never a reallocation.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ComponentRegistry::builder()
///     .register_configured::<Health>(&config)?
///     .build_configured(&config);
/// let mut world = World::new(&config, registry)?;
///
/// let ship = world.create_entity("ship")?;
/// let turret = world.create_entity("turret")?;
/// world.add_child(ship, turret)?;
/// world.set_entity_position(turret, Vec3::new(0.0, 2.0, 0.0))?;
/// world.add_render_proxy(turret)?;
///
/// world.begin_tick();
/// world.set_entity_position(ship, Vec3::new(10.0, 0.0, 0.0))?;
/// world.push_render_events(1.0);
/// world.submit_frame(1.0)?;
/// ```
pub struct World {
    /// Entity pool. The value is the entity's meta record.
    entities: GenPool<EntityMeta>,
    family: DenseTable<EntityFamily>,
    local: DenseTable<LocalTransform>,
    abs_current: DenseTable<AbsTransform>,
    abs_previous: DenseTable<AbsTransform>,
    dirty: DenseTable<DirtyFlags>,
    rows: DenseTable<ComponentRow>,

    registry: ComponentRegistry,

    stream: RenderStreamWriter,
    reader: Option<RenderStreamReader>,

    /// Reused by resolve and dirty marking.
    scratch: Vec<u32>,
    /// Reused by the per-tick render proxy passes.
    proxies: Vec<EntityId>,

    tick: u64,
    shut_down: bool,
}

impl World {
    /// Creates a world sized by `config` around a finished registry.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: &StoreConfig, registry: ComponentRegistry) -> StoreResult<Self> {
        config.validate()?;
        let capacity = config.max_entities;
        let (stream, reader) =
            render_stream(config.events_capacity(), capacity, config.submit_mode);

        tracing::debug!(
            max_entities = capacity,
            component_types = registry.type_count(),
            submit_mode = ?config.submit_mode,
            "world created"
        );

        Ok(Self {
            entities: GenPool::with_capacity(capacity),
            family: DenseTable::new(capacity),
            local: DenseTable::new(capacity),
            abs_current: DenseTable::new(capacity),
            abs_previous: DenseTable::new(capacity),
            dirty: DenseTable::new(capacity),
            rows: DenseTable::new(capacity),
            registry,
            stream,
            reader: Some(reader),
            scratch: Vec::with_capacity(64),
            proxies: Vec::with_capacity(capacity.min(1024)),
            tick: 0,
            shut_down: false,
        })
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Maximum number of live entities.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.entities.capacity()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Ticks started so far.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Checks whether the handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_valid(entity.handle())
    }

    /// Iterates over all live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.handles().map(EntityId::from_handle)
    }

    fn live_index(&self, entity: EntityId) -> StoreResult<u32> {
        if self.entities.is_valid(entity.handle()) {
            Ok(entity.index())
        } else {
            tracing::warn!(?entity, "stale entity handle");
            Err(StoreError::StaleEntity(entity))
        }
    }

    /// Creates a root entity at the origin with unit scale.
    ///
    /// The new entity is visible, has no render proxy and starts dirty.
    ///
    /// # Errors
    ///
    /// [`StoreError::PoolExhausted`] when `max_entities` are alive.
    pub fn create_entity(&mut self, name: impl Into<String>) -> StoreResult<EntityId> {
        let Some(handle) = self.entities.add(EntityMeta::new(name)) else {
            tracing::warn!(capacity = self.entities.capacity(), "entity pool exhausted");
            return Err(StoreError::PoolExhausted {
                pool: "entities",
                capacity: self.entities.capacity(),
            });
        };

        let index = handle.index();
        self.family.reset(index);
        self.local.reset(index);
        self.abs_current.reset(index);
        self.abs_previous.reset(index);
        self.rows[index].clear();

        let mut flags = DirtyFlags::empty();
        flags.insert(DirtyFlags::ABS_TRANSFORM);
        flags.insert(DirtyFlags::LOCAL_CHANGED);
        self.dirty[index] = flags;

        tracing::debug!(entity = index, generation = handle.generation(), "entity created");
        Ok(EntityId::from_handle(handle))
    }

    /// Destroys an entity and, depth first, its whole subtree.
    ///
    /// Children are destroyed before their parent. Every component is removed
    /// through the registry (so `on_remove` fires) before the entity's handle
    /// is freed. Render proxies emit a [`RenderEventKind::Removed`] event.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn destroy_entity(&mut self, entity: EntityId) -> StoreResult<()> {
        self.live_index(entity)?;
        self.destroy_subtree(entity, true);
        Ok(())
    }

    /// Post-order walk without a stack: freeing the deepest first child
    /// detaches it, which promotes its next sibling to `first_child`.
    fn destroy_subtree(&mut self, root: EntityId, notify_render: bool) {
        let mut node = root;
        loop {
            loop {
                let first = self.family[node.index()].first_child;
                if first.is_null() {
                    break;
                }
                node = first;
            }

            let parent = self.family[node.index()].parent;
            self.destroy_node(node, notify_render);
            if node == root || parent.is_null() {
                break;
            }
            node = parent;
        }
    }

    fn destroy_node(&mut self, entity: EntityId, notify_render: bool) {
        let index = entity.index();
        self.detach(index);
        self.remove_all_components(index);

        if notify_render
            && self
                .entities
                .get(entity.handle())
                .is_some_and(EntityMeta::is_render_proxy)
        {
            self.stream.retract(index, RenderEventKind::Transform);
            self.stream.push(RenderEvent::removed(index));
        }

        self.entities.remove(entity.handle());
        self.family.reset(index);
        self.dirty.reset(index);
        tracing::debug!(entity = index, generation = entity.generation(), "entity destroyed");
    }

    fn remove_all_components(&mut self, index: u32) {
        let row = std::mem::take(&mut self.rows[index]);
        for component in &row {
            match self.registry.storage_and_chunks(component.type_id) {
                Ok((storage, chunks)) => {
                    storage.remove(component.handle, chunks);
                }
                Err(err) => tracing::warn!(%err, entity = index, "component row refers to unknown type"),
            }
        }
    }

    /// Descriptive record of an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_meta(&self, entity: EntityId) -> StoreResult<&EntityMeta> {
        self.live_index(entity)?;
        self.entities
            .get(entity.handle())
            .ok_or(StoreError::StaleEntity(entity))
    }

    /// Hierarchy links of an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_family(&self, entity: EntityId) -> StoreResult<EntityFamily> {
        let index = self.live_index(entity)?;
        Ok(self.family[index])
    }

    /// Renames an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_name(&mut self, entity: EntityId, name: impl Into<String>) -> StoreResult<()> {
        self.live_index(entity)?;
        let meta = self
            .entities
            .get_mut(entity.handle())
            .ok_or(StoreError::StaleEntity(entity))?;
        meta.name = name.into();
        Ok(())
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Makes `child` the last child of `parent`, detaching it from any
    /// previous parent first. The child keeps its local transform.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if either handle is not live
    /// - [`StoreError::HierarchyCycle`] if `parent` is `child` or one of its descendants
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> StoreResult<()> {
        self.live_index(parent)?;
        let child_index = self.live_index(child)?;

        if parent == child || self.is_ancestor(child, parent) {
            return Err(StoreError::HierarchyCycle);
        }
        if self.family[child_index].parent == parent {
            return Ok(());
        }

        self.detach(child_index);
        self.attach(parent, child);
        self.local_changed(child_index);
        Ok(())
    }

    /// Detaches `child` from `parent`, making it a root.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if either handle is not live
    /// - [`StoreError::NotAChild`] if `child`'s parent is not `parent`
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> StoreResult<()> {
        self.live_index(parent)?;
        let child_index = self.live_index(child)?;

        if self.family[child_index].parent != parent {
            return Err(StoreError::NotAChild);
        }

        self.detach(child_index);
        self.local_changed(child_index);
        Ok(())
    }

    /// Direct children of an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn children(&self, entity: EntityId) -> StoreResult<Children<'_>> {
        let index = self.live_index(entity)?;
        Ok(Children {
            family: &self.family,
            cursor: self.family[index].first_child,
        })
    }

    /// True if `ancestor` appears on `entity`'s parent chain.
    fn is_ancestor(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let mut cursor = self.family[entity.index()].parent;
        while !cursor.is_null() {
            if cursor == ancestor {
                return true;
            }
            cursor = self.family[cursor.index()].parent;
        }
        false
    }

    fn attach(&mut self, parent: EntityId, child: EntityId) {
        let mut last = EntityId::NULL;
        let mut cursor = self.family[parent.index()].first_child;
        while !cursor.is_null() {
            last = cursor;
            cursor = self.family[cursor.index()].next_sibling;
        }

        if last.is_null() {
            self.family[parent.index()].first_child = child;
        } else {
            self.family[last.index()].next_sibling = child;
        }

        let links = &mut self.family[child.index()];
        links.parent = parent;
        links.prev_sibling = last;
        links.next_sibling = EntityId::NULL;
    }

    fn detach(&mut self, index: u32) {
        let EntityFamily {
            parent,
            prev_sibling,
            next_sibling,
            ..
        } = self.family[index];
        if parent.is_null() {
            return;
        }

        if prev_sibling.is_null() {
            self.family[parent.index()].first_child = next_sibling;
        } else {
            self.family[prev_sibling.index()].next_sibling = next_sibling;
        }
        if !next_sibling.is_null() {
            self.family[next_sibling.index()].prev_sibling = prev_sibling;
        }

        let links = &mut self.family[index];
        links.parent = EntityId::NULL;
        links.prev_sibling = EntityId::NULL;
        links.next_sibling = EntityId::NULL;
    }

    // =========================================================================
    // Dirty flags and resolve
    // =========================================================================

    fn local_changed(&mut self, index: u32) {
        self.dirty[index].insert(DirtyFlags::LOCAL_CHANGED);
        self.mark_dirty(index);
    }

    /// Marks an entity and its subtree dirty, skipping subtrees that already are.
    fn mark_dirty(&mut self, index: u32) {
        if self.dirty[index].contains(DirtyFlags::ABS_TRANSFORM) {
            return;
        }

        let mut stack = std::mem::take(&mut self.scratch);
        stack.clear();
        stack.push(index);
        while let Some(current) = stack.pop() {
            let flags = &mut self.dirty[current];
            if flags.contains(DirtyFlags::ABS_TRANSFORM) {
                continue;
            }
            flags.insert(DirtyFlags::ABS_TRANSFORM);

            let mut child = self.family[current].first_child;
            while !child.is_null() {
                stack.push(child.index());
                child = self.family[child.index()].next_sibling;
            }
        }
        self.scratch = stack;
    }

    fn resolve(&mut self, index: u32) {
        if !self.dirty[index].contains(DirtyFlags::ABS_TRANSFORM) {
            return;
        }

        let mut stack = std::mem::take(&mut self.scratch);
        stack.clear();
        let mut cursor = index;
        loop {
            stack.push(cursor);
            let parent = self.family[cursor].parent;
            if parent.is_null() || !self.dirty[parent.index()].contains(DirtyFlags::ABS_TRANSFORM) {
                break;
            }
            cursor = parent.index();
        }

        tracing::trace!(entity = index, depth = stack.len(), "resolving dirty chain");
        while let Some(current) = stack.pop() {
            let parent = self.family[current].parent;
            let local = &self.local[current];
            self.abs_current[current] = if parent.is_null() {
                AbsTransform::from_local(local)
            } else {
                AbsTransform::compose(&self.abs_current[parent.index()], local)
            };
            self.dirty[current].remove(DirtyFlags::ABS_TRANSFORM);
        }
        self.scratch = stack;
    }

    /// Resolves and returns an entity's absolute transform.
    ///
    /// Only the dirty part of the ancestor chain is recomputed.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn calculate_abs_transform(&mut self, entity: EntityId) -> StoreResult<AbsTransform> {
        let index = self.live_index(entity)?;
        self.resolve(index);
        Ok(self.abs_current[index])
    }

    /// True while the cached absolute transform is stale.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn is_transform_dirty(&self, entity: EntityId) -> StoreResult<bool> {
        let index = self.live_index(entity)?;
        Ok(self.dirty[index].contains(DirtyFlags::ABS_TRANSFORM))
    }

    /// True if the entity's local transform or parent changed since the
    /// current tick began.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn changed_since_tick(&self, entity: EntityId) -> StoreResult<bool> {
        let index = self.live_index(entity)?;
        Ok(self.dirty[index].contains(DirtyFlags::LOCAL_CHANGED))
    }

    // =========================================================================
    // Local transforms
    // =========================================================================

    /// Local position.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_position(&self, entity: EntityId) -> StoreResult<Vec3> {
        Ok(self.local[self.live_index(entity)?].position)
    }

    /// Sets the local position.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_position(&mut self, entity: EntityId, position: Vec3) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        self.local[index].position = position;
        self.local_changed(index);
        Ok(())
    }

    /// Local rotation.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_rotation(&self, entity: EntityId) -> StoreResult<Quat> {
        Ok(self.local[self.live_index(entity)?].rotation)
    }

    /// Sets the local rotation.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_rotation(&mut self, entity: EntityId, rotation: Quat) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        self.local[index].rotation = rotation.normalize();
        self.local_changed(index);
        Ok(())
    }

    /// Local scale.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_scale(&self, entity: EntityId) -> StoreResult<Vec3> {
        Ok(self.local[self.live_index(entity)?].scale)
    }

    /// Sets the local scale.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_scale(&mut self, entity: EntityId, scale: Vec3) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        self.local[index].scale = scale;
        self.local_changed(index);
        Ok(())
    }

    /// Full local transform.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_transform(&self, entity: EntityId) -> StoreResult<LocalTransform> {
        Ok(self.local[self.live_index(entity)?])
    }

    /// Replaces position, rotation and scale at once.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_transform(&mut self, entity: EntityId, transform: LocalTransform) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        self.local[index] = LocalTransform {
            rotation: transform.rotation.normalize(),
            ..transform
        };
        self.local_changed(index);
        Ok(())
    }

    // =========================================================================
    // Absolute transforms
    // =========================================================================

    fn parent_abs(&mut self, index: u32) -> Option<AbsTransform> {
        let parent = self.family[index].parent;
        if parent.is_null() {
            return None;
        }
        self.resolve(parent.index());
        Some(self.abs_current[parent.index()])
    }

    /// Full absolute transform.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_transform_abs(&mut self, entity: EntityId) -> StoreResult<AbsTransform> {
        self.calculate_abs_transform(entity)
    }

    /// Absolute 4x3 matrix.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_matrix_abs(&mut self, entity: EntityId) -> StoreResult<Affine> {
        Ok(self.calculate_abs_transform(entity)?.matrix)
    }

    /// Absolute transform as of the start of the current tick.
    ///
    /// Only maintained for render proxies.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_previous_transform_abs(&self, entity: EntityId) -> StoreResult<AbsTransform> {
        Ok(self.abs_previous[self.live_index(entity)?])
    }

    /// World position.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_position_abs(&mut self, entity: EntityId) -> StoreResult<Vec3> {
        Ok(self.calculate_abs_transform(entity)?.position())
    }

    /// Moves the entity to a world position by rewriting its local position.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if the handle is not live
    /// - [`StoreError::DegenerateTransform`] if the parent's matrix has no inverse
    pub fn set_entity_position_abs(&mut self, entity: EntityId, position: Vec3) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let local = match self.parent_abs(index) {
            Some(parent) => parent
                .matrix
                .try_inverse()
                .ok_or_else(|| degenerate(entity))?
                .transform_point(position),
            None => position,
        };
        self.local[index].position = local;
        self.local_changed(index);
        Ok(())
    }

    /// World rotation.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_rotation_abs(&mut self, entity: EntityId) -> StoreResult<Quat> {
        Ok(self.calculate_abs_transform(entity)?.rotation)
    }

    /// Sets the world rotation by rewriting the local rotation.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_rotation_abs(&mut self, entity: EntityId, rotation: Quat) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let local = match self.parent_abs(index) {
            Some(parent) => parent.rotation.inverse() * rotation,
            None => rotation,
        };
        self.local[index].rotation = local.normalize();
        self.local_changed(index);
        Ok(())
    }

    /// World scale.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn get_entity_scale_abs(&mut self, entity: EntityId) -> StoreResult<Vec3> {
        Ok(self.calculate_abs_transform(entity)?.scale)
    }

    /// Sets the world scale by rewriting the local scale.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if the handle is not live
    /// - [`StoreError::DegenerateTransform`] if the parent has a zero scale axis
    pub fn set_entity_scale_abs(&mut self, entity: EntityId, scale: Vec3) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let local = match self.parent_abs(index) {
            Some(parent) => {
                let s = parent.scale;
                if s.x == 0.0 || s.y == 0.0 || s.z == 0.0 {
                    return Err(degenerate(entity));
                }
                scale.div_elem(s)
            }
            None => scale,
        };
        self.local[index].scale = local;
        self.local_changed(index);
        Ok(())
    }

    // =========================================================================
    // Tick lifecycle and render proxies
    // =========================================================================

    fn collect_proxies(&mut self, visible_only: bool) {
        self.proxies.clear();
        self.proxies.extend(
            self.entities
                .iter()
                .filter(|(_, meta)| meta.is_render_proxy() && (meta.visible || !visible_only))
                .map(|(handle, _)| EntityId::from_handle(handle)),
        );
    }

    /// Starts a simulation tick.
    ///
    /// Every render proxy's current absolute transform becomes its previous
    /// one, then every live entity is marked dirty.
    pub fn begin_tick(&mut self) {
        self.tick += 1;

        self.collect_proxies(false);
        let proxies = std::mem::take(&mut self.proxies);
        for entity in &proxies {
            let index = entity.index();
            self.resolve(index);
            self.abs_previous[index] = self.abs_current[index];
        }
        self.proxies = proxies;

        for handle in self.entities.handles() {
            let flags = &mut self.dirty[handle.index()];
            flags.insert(DirtyFlags::ABS_TRANSFORM);
            flags.remove(DirtyFlags::LOCAL_CHANGED);
        }
        tracing::trace!(tick = self.tick, entities = self.entities.len(), "tick started");
    }

    /// Pushes one blended transform event per visible render proxy.
    ///
    /// Position and scale are lerped, rotation slerped, between the previous
    /// and current absolute transforms. Returns the number of events pushed.
    pub fn push_render_events(&mut self, alpha: f32) -> usize {
        let alpha = alpha.clamp(0.0, 1.0);

        self.collect_proxies(true);
        let proxies = std::mem::take(&mut self.proxies);
        for entity in &proxies {
            let index = entity.index();
            self.resolve(index);
            let pose = AbsTransform::blend(&self.abs_previous[index], &self.abs_current[index], alpha);
            self.stream.push(RenderEvent::transform(
                index,
                TransformPayload {
                    position: pose.position(),
                    rotation: pose.rotation,
                    matrix: pose.matrix,
                },
            ));
        }
        let pushed = proxies.len();
        self.proxies = proxies;
        pushed
    }

    /// Hands the events pushed so far to the render thread.
    ///
    /// # Errors
    ///
    /// [`StoreError::StreamClosed`] if the render side went away.
    pub fn submit_frame(&mut self, alpha: f32) -> StoreResult<()> {
        self.stream.submit(self.tick, alpha)
    }

    /// Registers interest in mirroring the entity to the renderer.
    ///
    /// The first registration seeds the previous transform with the resolved
    /// current one, so blending starts from a real pose.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn add_render_proxy(&mut self, entity: EntityId) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let meta = self
            .entities
            .get_mut(entity.handle())
            .ok_or(StoreError::StaleEntity(entity))?;
        let first = !meta.is_render_proxy();
        meta.render_proxy_refs = meta.render_proxy_refs.saturating_add(1);

        if first {
            self.resolve(index);
            self.abs_previous[index] = self.abs_current[index];
            self.stream.retract(index, RenderEventKind::Removed);
        }
        Ok(())
    }

    /// Drops one render proxy registration. The last one emits
    /// [`RenderEventKind::Removed`].
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn remove_render_proxy(&mut self, entity: EntityId) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let meta = self
            .entities
            .get_mut(entity.handle())
            .ok_or(StoreError::StaleEntity(entity))?;
        if !meta.is_render_proxy() {
            tracing::warn!(?entity, "render proxy released more often than added");
            return Ok(());
        }
        meta.render_proxy_refs -= 1;

        if !meta.is_render_proxy() {
            self.stream.retract(index, RenderEventKind::Transform);
            self.stream.push(RenderEvent::removed(index));
        }
        Ok(())
    }

    /// Shows or hides an entity. Hiding retracts any transform event already
    /// pushed for it this frame.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn set_entity_visible(&mut self, entity: EntityId, visible: bool) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let meta = self
            .entities
            .get_mut(entity.handle())
            .ok_or(StoreError::StaleEntity(entity))?;
        meta.visible = visible;

        if !visible {
            self.stream.retract(index, RenderEventKind::Transform);
        }
        Ok(())
    }

    /// Simulation end of the render stream.
    #[inline]
    #[must_use]
    pub fn render_stream(&self) -> &RenderStreamWriter {
        &self.stream
    }

    /// Hands out the render end of the stream. Returns `None` after the first call.
    pub fn take_render_reader(&mut self) -> Option<RenderStreamReader> {
        self.reader.take()
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// The component registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The component registry, mutably.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    fn row_position(&self, index: u32, type_id: ComponentTypeId) -> Option<usize> {
        self.rows[index]
            .iter()
            .position(|component| component.type_id == type_id)
    }

    /// Attaches a default-constructed `C`.
    ///
    /// # Errors
    ///
    /// Same as [`add_component_with`](Self::add_component_with).
    pub fn add_component<C: Component>(&mut self, entity: EntityId) -> StoreResult<PoolHandle> {
        self.add_component_with(entity, C::default())
    }

    /// Attaches `value` and runs its `on_add` hook.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if the handle is not live
    /// - [`StoreError::UnregisteredComponent`] if `C` has no storage
    /// - [`StoreError::DuplicateComponent`] if the entity already has a `C`
    /// - [`StoreError::PoolExhausted`] if the `C` cache is full
    pub fn add_component_with<C: Component>(&mut self, entity: EntityId, value: C) -> StoreResult<PoolHandle> {
        let index = self.live_index(entity)?;
        if self.row_position(index, C::TYPE_ID).is_some() {
            return Err(StoreError::DuplicateComponent { type_name: C::NAME });
        }

        let (cache, chunks) = self.registry.cache_and_chunks::<C>()?;
        let handle = cache.insert(entity, value, chunks)?;
        self.rows[index].push(ComponentRef {
            type_id: C::TYPE_ID,
            handle,
        });
        Ok(handle)
    }

    /// Attaches a default-constructed component chosen by type id.
    ///
    /// # Errors
    ///
    /// Same as [`add_component_with`](Self::add_component_with).
    pub fn add_component_by_type(&mut self, entity: EntityId, type_id: ComponentTypeId) -> StoreResult<PoolHandle> {
        let index = self.live_index(entity)?;
        let (storage, chunks) = self.registry.storage_and_chunks(type_id)?;
        if self.rows[index].iter().any(|component| component.type_id == type_id) {
            return Err(StoreError::DuplicateComponent {
                type_name: storage.type_name(),
            });
        }

        let handle = storage.add(entity, chunks)?;
        self.rows[index].push(ComponentRef { type_id, handle });
        Ok(handle)
    }

    /// Runs `on_remove` and detaches the entity's `C`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleEntity`] if the handle is not live
    /// - [`StoreError::UnregisteredComponent`] if `C` has no storage
    /// - [`StoreError::StaleComponent`] if the entity has no `C`
    pub fn remove_component<C: Component>(&mut self, entity: EntityId) -> StoreResult<()> {
        self.remove_component_by_type(entity, C::TYPE_ID)
    }

    /// Removes a component chosen by type id.
    ///
    /// # Errors
    ///
    /// Same as [`remove_component`](Self::remove_component).
    pub fn remove_component_by_type(&mut self, entity: EntityId, type_id: ComponentTypeId) -> StoreResult<()> {
        let index = self.live_index(entity)?;
        let position = self.row_position(index, type_id);
        let (storage, chunks) = self.registry.storage_and_chunks(type_id)?;
        let Some(position) = position else {
            return Err(StoreError::StaleComponent {
                type_name: storage.type_name(),
            });
        };

        let component = self.rows[index].remove(position);
        if storage.remove(component.handle, chunks) {
            Ok(())
        } else {
            Err(StoreError::StaleComponent {
                type_name: storage.type_name(),
            })
        }
    }

    /// Component by handle.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnregisteredComponent`] if `C` has no storage
    /// - [`StoreError::StaleComponent`] if the handle is not live
    pub fn get_component<C: Component>(&self, handle: PoolHandle) -> StoreResult<&C> {
        self.registry
            .cache::<C>()?
            .get(handle)
            .ok_or_else(|| stale_component::<C>(handle))
    }

    /// Component by handle, mutably.
    ///
    /// # Errors
    ///
    /// Same as [`get_component`](Self::get_component).
    pub fn get_component_mut<C: Component>(&mut self, handle: PoolHandle) -> StoreResult<&mut C> {
        self.registry
            .cache_mut::<C>()?
            .get_mut(handle)
            .ok_or_else(|| stale_component::<C>(handle))
    }

    /// Handle of the entity's `C`, if it has one.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn entity_component<C: Component>(&self, entity: EntityId) -> StoreResult<Option<PoolHandle>> {
        let index = self.live_index(entity)?;
        Ok(self
            .row_position(index, C::TYPE_ID)
            .map(|position| self.rows[index][position].handle))
    }

    /// Checks whether a `C` handle is live.
    #[must_use]
    pub fn is_valid<C: Component>(&self, handle: PoolHandle) -> bool {
        self.registry
            .cache::<C>()
            .is_ok_and(|cache| cache.is_valid(handle))
    }

    /// Visits every live `C` until the visitor returns [`IterFlow::Stop`].
    ///
    /// # Errors
    ///
    /// [`StoreError::UnregisteredComponent`] if `C` has no storage.
    pub fn view<C, F>(&mut self, visitor: F) -> StoreResult<IterFlow>
    where
        C: Component,
        F: FnMut(ComponentHeader, &mut C) -> IterFlow,
    {
        Ok(self.registry.cache_mut::<C>()?.view(visitor))
    }

    /// The entity's component row, in attach order.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleEntity`] if the handle is not live.
    pub fn components_of(&self, entity: EntityId) -> StoreResult<&[ComponentRef]> {
        let index = self.live_index(entity)?;
        Ok(&self.rows[index])
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Destroys every entity (hooks fire), resets all storages and the chunk
    /// arena, and closes the render stream. No `Removed` events are emitted;
    /// the closed stream tells the renderer everything is gone. Safe to call
    /// more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        let family = &self.family;
        let roots: Vec<EntityId> = self
            .entities
            .handles()
            .filter(|handle| family[handle.index()].parent.is_null())
            .map(EntityId::from_handle)
            .collect();
        // The stream closes below, so no removal events are queued.
        for root in roots {
            self.destroy_subtree(root, false);
        }

        self.registry.reset_all();
        self.stream.close();
        self.shut_down = true;
        tracing::debug!(tick = self.tick, "world shut down");
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn degenerate(entity: EntityId) -> StoreError {
    tracing::warn!(?entity, "parent transform is not invertible");
    StoreError::DegenerateTransform
}

fn stale_component<C: Component>(handle: PoolHandle) -> StoreError {
    tracing::warn!(component = C::NAME, ?handle, "stale component handle");
    StoreError::StaleComponent { type_name: C::NAME }
}
