//! # Chunk Allocator
//!
//! A bump-pointer byte arena for variable-length component payloads
//! (skin joint index lists, per-instance parameter blocks, ...).
//!
//! Callers never see raw pointers or offsets. Every allocation is addressed
//! through a generation-checked [`ChunkHandle`], which lets the arena
//! compact itself without invalidating anyone, and lets a reset between
//! scene loads invalidate every outstanding handle at once.

use bytemuck::Pod;

use super::pool::{GenPool, PoolHandle};
use crate::error::{StoreError, StoreResult};

/// Handle to a chunk inside a [`ChunkAllocator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ChunkHandle(PoolHandle);

impl ChunkHandle {
    /// Null chunk handle.
    pub const NULL: Self = Self(PoolHandle::NULL);

    /// Checks for the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }
}

#[derive(Clone, Copy, Debug)]
struct ChunkRecord {
    offset: usize,
    len: usize,
}

/// Byte arena addressed by chunk handles.
///
/// Allocation bumps a cursor. Freed space is reclaimed immediately when the
/// freed chunk sits at the top of the arena, otherwise on the next
/// [`defragment`](Self::defragment) (run automatically when a request does
/// not fit at the cursor but would fit after compaction).
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. It is owned by the component registry.
pub struct ChunkAllocator {
    /// The backing storage.
    storage: Box<[u8]>,
    /// Current bump offset.
    cursor: usize,
    /// Bytes held by live chunks.
    live_bytes: usize,
    /// Chunk bookkeeping.
    chunks: GenPool<ChunkRecord>,
}

impl ChunkAllocator {
    /// Creates a new arena.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes
    /// * `max_chunks` - Maximum number of simultaneously live chunks
    ///
    /// # Panics
    ///
    /// Panics if `max_chunks` is zero.
    #[must_use]
    pub fn new(capacity: usize, max_chunks: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            live_bytes: 0,
            chunks: GenPool::with_capacity(max_chunks),
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the bump offset (bytes touched since the last compaction).
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.cursor
    }

    /// Returns the bytes held by live chunks.
    #[inline]
    #[must_use]
    pub const fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Returns the bytes available after compaction.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.live_bytes
    }

    /// Returns the number of live chunks.
    #[inline]
    #[must_use]
    pub fn live_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Allocates a zeroed chunk of `len` bytes.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChunkArenaExhausted`] if the bytes do not fit even after
    /// compaction, [`StoreError::PoolExhausted`] if the chunk table is full.
    pub fn alloc(&mut self, len: usize) -> StoreResult<ChunkHandle> {
        if self.cursor + len > self.capacity() {
            if self.remaining() < len {
                tracing::warn!(requested = len, available = self.remaining(), "chunk arena exhausted");
                return Err(StoreError::ChunkArenaExhausted {
                    requested: len,
                    available: self.remaining(),
                });
            }
            self.defragment();
        }

        let offset = self.cursor;
        let handle = self
            .chunks
            .add(ChunkRecord { offset, len })
            .ok_or(StoreError::PoolExhausted {
                pool: "chunks",
                capacity: self.chunks.capacity(),
            })?;

        self.storage[offset..offset + len].fill(0);
        self.cursor += len;
        self.live_bytes += len;

        Ok(ChunkHandle(handle))
    }

    /// Allocates a chunk holding a copy of `values`.
    ///
    /// # Errors
    ///
    /// Same as [`alloc`](Self::alloc).
    pub fn alloc_pod<T: Pod>(&mut self, values: &[T]) -> StoreResult<ChunkHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let handle = self.alloc(bytes.len())?;
        if let Some(dst) = self.get_mut(handle) {
            dst.copy_from_slice(bytes);
        }
        Ok(handle)
    }

    /// Frees a chunk.
    ///
    /// # Returns
    ///
    /// `false` if the handle was stale or null.
    pub fn free(&mut self, handle: ChunkHandle) -> bool {
        let Some(record) = self.chunks.remove(handle.0) else {
            return false;
        };
        self.live_bytes -= record.len;
        if record.offset + record.len == self.cursor {
            self.cursor = record.offset;
        }
        true
    }

    /// Checks whether the handle refers to a live chunk.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, handle: ChunkHandle) -> bool {
        self.chunks.is_valid(handle.0)
    }

    /// Returns the bytes of a live chunk.
    #[must_use]
    pub fn get(&self, handle: ChunkHandle) -> Option<&[u8]> {
        let record = self.chunks.get(handle.0)?;
        self.storage.get(record.offset..record.offset + record.len)
    }

    /// Returns the bytes of a live chunk, mutably.
    pub fn get_mut(&mut self, handle: ChunkHandle) -> Option<&mut [u8]> {
        let record = *self.chunks.get(handle.0)?;
        self.storage.get_mut(record.offset..record.offset + record.len)
    }

    /// Reads a chunk back as a list of `T`.
    ///
    /// Trailing bytes that do not form a whole `T` are ignored.
    ///
    /// # Errors
    ///
    /// [`StoreError::StaleChunk`] if the handle was freed or reset.
    pub fn read_pod<T: Pod>(&self, handle: ChunkHandle) -> StoreResult<Vec<T>> {
        let Some(bytes) = self.get(handle) else {
            tracing::warn!(?handle, "stale chunk handle");
            return Err(StoreError::StaleChunk);
        };
        let size = std::mem::size_of::<T>().max(1);
        Ok(bytes
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }

    /// Compacts live chunks to the bottom of the arena.
    ///
    /// Handles stay valid; only the internal offsets move.
    pub fn defragment(&mut self) {
        let mut live: Vec<(PoolHandle, ChunkRecord)> =
            self.chunks.iter().map(|(h, r)| (h, *r)).collect();
        live.sort_unstable_by_key(|(_, record)| record.offset);

        let mut cursor = 0;
        for (handle, record) in live {
            if record.offset != cursor {
                self.storage
                    .copy_within(record.offset..record.offset + record.len, cursor);
                if let Some(stored) = self.chunks.get_mut(handle) {
                    stored.offset = cursor;
                }
            }
            cursor += record.len;
        }

        tracing::trace!(reclaimed = self.cursor - cursor, "chunk arena compacted");
        self.cursor = cursor;
    }

    /// Resets the arena, invalidating every outstanding chunk handle.
    ///
    /// No memory is freed or reallocated.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.cursor = 0;
        self.live_bytes = 0;
    }
}
