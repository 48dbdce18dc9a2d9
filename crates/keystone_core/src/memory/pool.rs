//! # Generational Pool
//!
//! Fixed-capacity slot allocator that hands out `{index, generation}` handles.
//!
//! A handle stays valid until its slot is removed. Removal bumps the slot's
//! generation, so every handle issued before the removal is detected as stale
//! in O(1), even after the slot has been reused.
//!
//! Generations are `u32` and wrap. A handle kept across 2^32 reuses of the
//! same slot would alias the current occupant. That risk is accepted; no
//! tombstoning is applied.

/// Handle to an object in a [`GenPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    /// Slot index. `u32::MAX` is the null sentinel.
    index: u32,
    /// Generation of the slot when this handle was issued.
    generation: u32,
}

impl PoolHandle {
    /// Null handle. Never valid in any pool.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Creates a handle from raw parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation at issue time.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Checks for the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for PoolHandle {
    fn default() -> Self {
        Self::NULL
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A generation-checked pool for fixed-capacity object storage.
///
/// Slots are reserved once at creation and never grow past `capacity`.
/// `add` reuses the most recently freed slot before touching a fresh one.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is owned by the simulation thread.
///
/// # Example
///
/// ```rust
/// use keystone_core::memory::GenPool;
///
/// let mut pool: GenPool<u32> = GenPool::with_capacity(16);
/// let handle = pool.add(7).unwrap();
/// assert!(pool.is_valid(handle));
/// pool.remove(handle);
/// assert!(!pool.is_valid(handle));
/// ```
pub struct GenPool<T> {
    /// Slots up to the high-water mark. Reserved to `capacity` up front.
    slots: Vec<Slot<T>>,
    /// Freed slot indices, last freed on top.
    free_list: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
    /// Total capacity.
    capacity: usize,
}

impl<T> GenPool<T> {
    /// Creates a new pool with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero or does not fit below the null sentinel.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(
            capacity < u32::MAX as usize,
            "Capacity must be below u32::MAX"
        );

        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity),
            len: 0,
            capacity,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of live objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is allocated.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `add` would fail.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_list.is_empty() && self.slots.len() == self.capacity
    }

    /// Number of slots ever touched.
    #[inline]
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.slots.len()
    }

    /// Stores `value` in a free slot.
    ///
    /// Recycled slots are preferred, most recently freed first.
    ///
    /// # Returns
    ///
    /// A handle to the new object, or None if the pool is full.
    pub fn add(&mut self, value: T) -> Option<PoolHandle> {
        let index = if let Some(index) = self.free_list.pop() {
            index
        } else if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                generation: 0,
                value: None,
            });
            u32::try_from(self.slots.len() - 1).ok()?
        } else {
            return None;
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;

        Some(PoolHandle::new(index, slot.generation))
    }

    /// Removes an object, invalidating every handle to it.
    ///
    /// # Returns
    ///
    /// The removed object, or None if the handle was stale or null.
    pub fn remove(&mut self, handle: PoolHandle) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }

        let slot = &mut self.slots[handle.index as usize];
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;

        value
    }

    /// Checks whether the handle still refers to a live object. O(1).
    #[inline]
    #[must_use]
    pub fn is_valid(&self, handle: PoolHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.value.is_some() && slot.generation == handle.generation)
    }

    /// Gets a reference to a live object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a live object.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns the live handle currently occupying `index`, if any.
    #[must_use]
    pub fn handle_at(&self, index: u32) -> Option<PoolHandle> {
        let slot = self.slots.get(index as usize)?;
        slot.value
            .as_ref()
            .map(|_| PoolHandle::new(index, slot.generation))
    }

    /// Removes every object. Generations of occupied slots advance.
    ///
    /// No memory is freed.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            #[allow(clippy::cast_possible_truncation)]
            self.free_list.push(index as u32);
        }
        self.len = 0;
    }

    /// Iterates over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let handle = PoolHandle::new(index as u32, slot.generation);
            slot.value.as_ref().map(|v| (handle, v))
        })
    }

    /// Iterates mutably over all live objects.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let handle = PoolHandle::new(index as u32, slot.generation);
            slot.value.as_mut().map(|v| (handle, v))
        })
    }

    /// Iterates over live handles only.
    pub fn handles(&self) -> impl Iterator<Item = PoolHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }
}
