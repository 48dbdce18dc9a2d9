//! # Memory Management
//!
//! Fixed-capacity pools and the chunk arena.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once at startup. During a tick:
//! - No pool grows past its budget
//! - Objects are addressed by generation-checked handles
//! - A stale handle is detected in O(1), never dereferenced

mod chunk;
mod pool;

pub use chunk::{ChunkAllocator, ChunkHandle};
pub use pool::{GenPool, PoolHandle};
