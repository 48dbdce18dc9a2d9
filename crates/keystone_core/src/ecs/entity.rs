//! # Entity Records
//!
//! An entity is only a handle into the entity pool. Everything else about it
//! lives in side tables indexed by the handle's slot index:
//! - meta (name, render proxy refcount, visibility)
//! - family links (intrusive sibling list per parent)
//! - dirty bits
//! - the component registry row

use smallvec::SmallVec;

use crate::ecs::component::ComponentTypeId;
use crate::memory::PoolHandle;

/// Unique identifier for an entity.
///
/// A thin wrapper over a [`PoolHandle`]: slot index plus generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntityId(PoolHandle);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(PoolHandle::NULL);

    /// Creates an entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(PoolHandle::new(index, generation))
    }

    /// Wraps a pool handle.
    #[inline]
    #[must_use]
    pub const fn from_handle(handle: PoolHandle) -> Self {
        Self(handle)
    }

    /// The underlying pool handle.
    #[inline]
    #[must_use]
    pub const fn handle(self) -> PoolHandle {
        self.0
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.index()
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0.generation()
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Packs into 64 bits: generation high, index low.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation() as u64) << 32) | (self.index() as u64)
    }

    /// Unpacks from [`to_bits`](Self::to_bits).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bits(bits: u64) -> Self {
        Self::new(bits as u32, (bits >> 32) as u32)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Descriptive per-entity state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityMeta {
    /// Display name.
    pub name: String,
    /// How many systems asked for this entity to be mirrored to the renderer.
    pub render_proxy_refs: u16,
    /// Hidden entities are skipped by the render event pass.
    pub visible: bool,
}

impl EntityMeta {
    /// Meta record for a freshly created entity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            render_proxy_refs: 0,
            visible: true,
        }
    }

    /// True while at least one render proxy registration is held.
    #[inline]
    #[must_use]
    pub const fn is_render_proxy(&self) -> bool {
        self.render_proxy_refs > 0
    }
}

/// Hierarchy links. Siblings form an intrusive doubly linked list per parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFamily {
    /// Parent entity, or null for roots.
    pub parent: EntityId,
    /// Head of the child list.
    pub first_child: EntityId,
    /// Previous sibling under the same parent.
    pub prev_sibling: EntityId,
    /// Next sibling under the same parent.
    pub next_sibling: EntityId,
}

/// Per-entity dirty bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    /// Cached absolute transform is stale.
    pub const ABS_TRANSFORM: Self = Self(1 << 0);
    /// Local transform was written since the last tick began.
    pub const LOCAL_CHANGED: Self = Self(1 << 1);

    /// No bits set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Checks whether all bits of `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// One `{type, handle}` pair in an entity's component row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentRef {
    /// Component type.
    pub type_id: ComponentTypeId,
    /// Handle into that type's storage.
    pub handle: PoolHandle,
}

/// Ordered list of components attached to one entity.
pub type ComponentRow = SmallVec<[ComponentRef; 4]>;
