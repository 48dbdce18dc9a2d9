//! # Store Error Types
//!
//! All errors that can occur in the entity/component store.
//!
//! None of these are transient: every variant is either a budget decision
//! (capacity) or a defect at the call site (stale handle, unknown type).
//! Nothing in the store retries.

use thiserror::Error;

use crate::ecs::{ComponentTypeId, EntityId};

/// Errors that can occur in the entity/component store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A fixed-capacity pool has no free slot left.
    #[error("pool exhausted: {pool} holds at most {capacity} items")]
    PoolExhausted {
        /// Which pool ran out (entity pool or component type name).
        pool: &'static str,
        /// The pool's fixed capacity.
        capacity: usize,
    },

    /// The entity handle's generation no longer matches its slot.
    #[error("stale or null entity handle: {0:?}")]
    StaleEntity(EntityId),

    /// A component handle no longer refers to a live component.
    #[error("stale component handle for {type_name}")]
    StaleComponent {
        /// Component type name.
        type_name: &'static str,
    },

    /// No storage was registered for this component type.
    #[error("component type {type_id:?} was never registered")]
    UnregisteredComponent {
        /// The requested type identifier.
        type_id: ComponentTypeId,
    },

    /// Two storages were registered under the same type identifier.
    #[error("component type {type_id:?} registered twice")]
    DuplicateComponentType {
        /// The conflicting type identifier.
        type_id: ComponentTypeId,
    },

    /// The entity already owns a component of this type.
    #[error("entity already has a {type_name} component")]
    DuplicateComponent {
        /// Component type name.
        type_name: &'static str,
    },

    /// The requested parent is the child itself or one of its descendants.
    #[error("reparenting would create a cycle in the hierarchy")]
    HierarchyCycle,

    /// `remove_child` was called with an entity that is not a child of `parent`.
    #[error("entity is not a child of the given parent")]
    NotAChild,

    /// A parent's absolute transform cannot be inverted (zero scale).
    #[error("parent transform is degenerate and cannot be inverted")]
    DegenerateTransform,

    /// The chunk arena cannot fit the requested allocation.
    #[error("chunk arena exhausted: requested {requested} bytes, {available} available")]
    ChunkArenaExhausted {
        /// Requested size in bytes.
        requested: usize,
        /// Free bytes left after compaction.
        available: usize,
    },

    /// The chunk handle was freed or invalidated by a reset.
    #[error("stale chunk handle")]
    StaleChunk,

    /// The render side of the event stream has gone away.
    #[error("render event stream is closed")]
    StreamClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
