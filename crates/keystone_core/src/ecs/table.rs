//! # Dense Side Tables
//!
//! Pre-allocated per-entity arrays indexed by entity slot index.
//!
//! The entity pool decides which indices are live; side tables just hold one
//! value per slot so that hierarchy walks and transform resolves touch
//! contiguous memory.

/// Pre-allocated storage with one value per entity slot.
///
/// This table guarantees:
/// - Zero allocations after initialization
/// - O(1) access by entity index
///
/// # Example
///
/// ```rust,ignore
/// let mut table: DenseTable<LocalTransform> = DenseTable::new(4096);
/// table.set(0, LocalTransform::IDENTITY);
/// ```
pub struct DenseTable<T> {
    data: Box<[T]>,
}

impl<T: Clone + Default> DenseTable<T> {
    /// Creates a table with `capacity` default-initialized slots.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        Self {
            data: vec![T::default(); capacity].into_boxed_slice(),
        }
    }

    /// Resets a slot to its default value.
    #[inline]
    pub fn reset(&mut self, index: u32) {
        if let Some(slot) = self.data.get_mut(index as usize) {
            *slot = T::default();
        }
    }

    /// Resets every slot.
    pub fn clear(&mut self) {
        for slot in self.data.iter_mut() {
            *slot = T::default();
        }
    }
}

impl<T> DenseTable<T> {
    /// Returns the capacity of this table.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Gets a value by entity index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&T> {
        self.data.get(index as usize)
    }

    /// Gets a mutable value by entity index.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.data.get_mut(index as usize)
    }

    /// Overwrites a slot.
    ///
    /// # Returns
    ///
    /// `false` if the index is out of bounds.
    #[inline]
    pub fn set(&mut self, index: u32, value: T) -> bool {
        if let Some(slot) = self.data.get_mut(index as usize) {
            *slot = value;
            true
        } else {
            false
        }
    }

    /// Returns a slice of all slots.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns a mutable slice of all slots.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> std::ops::Index<u32> for DenseTable<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: u32) -> &T {
        &self.data[index as usize]
    }
}

impl<T> std::ops::IndexMut<u32> for DenseTable<T> {
    #[inline]
    fn index_mut(&mut self, index: u32) -> &mut T {
        &mut self.data[index as usize]
    }
}
