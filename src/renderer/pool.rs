//! Generation-counted resource pool
//!
//! Backends keep their GPU resources (buffers, shader programs, textures) in
//! a [`Pool`]. Slots are recycled through a free list, and every slot carries
//! a generation counter that is bumped on release, so a handle to a released
//! resource never resolves to whatever later reuses the slot.
//!
//! # Example
//!
//! ```ignore
//! let mut pool: Pool<GpuBuffer> = Pool::new();
//! let index = pool.insert(buffer);
//! pool.remove(index);
//! assert!(pool.get(index).is_none()); // stale, even if the slot is reused
//! ```

// ============================================================================
// Pool Index
// ============================================================================

/// Index into a pool, identifying a slot and the generation it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIndex {
    index: u32,
    generation: u32,
}

impl PoolIndex {
    /// Get the raw slot index.
    #[must_use]
    #[inline]
    pub const fn raw(self) -> usize {
        self.index as usize
    }

    /// Get the generation this index was issued for.
    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

// ============================================================================
// Pool Slot
// ============================================================================

#[derive(Debug)]
enum Entry<T> {
    Occupied(T),
    /// Points to the next free slot (or `NONE` at the end of the list)
    Vacant(usize),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

// ============================================================================
// Pool
// ============================================================================

/// A slot pool with O(1) insert/remove/get and stale-handle detection.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_head: usize,
    active_count: usize,
}

impl<T> Pool<T> {
    /// Sentinel value indicating end of free list.
    const NONE: usize = usize::MAX;

    /// Create a new empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: Self::NONE,
            active_count: 0,
        }
    }

    /// Store a value, reusing a free slot when one exists.
    pub fn insert(&mut self, value: T) -> PoolIndex {
        self.active_count += 1;

        if self.free_head != Self::NONE {
            let index = self.free_head;
            let slot = &mut self.slots[index];
            if let Entry::Vacant(next) = slot.entry {
                self.free_head = next;
            }
            slot.entry = Entry::Occupied(value);

            PoolIndex {
                index: index as u32,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len();
            self.slots.push(Slot {
                generation: 0,
                entry: Entry::Occupied(value),
            });

            PoolIndex {
                index: index as u32,
                generation: 0,
            }
        }
    }

    /// Remove a value and return it.
    ///
    /// Returns `None` for stale or out-of-range indices, so a double
    /// release is harmless at this level.
    pub fn remove(&mut self, index: PoolIndex) -> Option<T> {
        if !self.contains(index) {
            return None;
        }

        let idx = index.raw();
        let slot = &mut self.slots[idx];
        let entry = std::mem::replace(&mut slot.entry, Entry::Vacant(self.free_head));
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = idx;
        self.active_count -= 1;

        match entry {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        }
    }

    /// Get a reference to a live value.
    #[must_use]
    #[inline]
    pub fn get(&self, index: PoolIndex) -> Option<&T> {
        self.slots.get(index.raw()).and_then(|slot| match &slot.entry {
            Entry::Occupied(value) if slot.generation == index.generation => Some(value),
            _ => None,
        })
    }

    /// Get a mutable reference to a live value.
    #[inline]
    pub fn get_mut(&mut self, index: PoolIndex) -> Option<&mut T> {
        self.slots
            .get_mut(index.raw())
            .and_then(|slot| match &mut slot.entry {
                Entry::Occupied(value) if slot.generation == index.generation => Some(value),
                _ => None,
            })
    }

    /// Check if an index refers to a live value.
    #[must_use]
    #[inline]
    pub fn contains(&self, index: PoolIndex) -> bool {
        self.get(index).is_some()
    }

    /// Number of live values.
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.active_count
    }

    /// Check if the pool has no live values.
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.active_count == 0
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_insert_and_remove() {
        let mut pool: Pool<i32> = Pool::new();

        let a = pool.insert(1);
        let b = pool.insert(2);
        let c = pool.insert(3);
        assert_eq!(pool.len(), 3);

        assert_eq!(pool.remove(b), Some(2));
        assert_eq!(pool.len(), 2);
        assert!(pool.get(b).is_none());

        assert_eq!(pool.get(a), Some(&1));
        assert_eq!(pool.get(c), Some(&3));
    }

    #[test]
    fn test_pool_reused_slot_rejects_stale_index() {
        let mut pool: Pool<&str> = Pool::new();

        let old = pool.insert("old");
        pool.remove(old);
        let new = pool.insert("new");

        assert_eq!(old.raw(), new.raw(), "Should reuse the same slot");
        assert_ne!(old.generation(), new.generation());
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new), Some(&"new"));
    }

    #[test]
    fn test_pool_double_remove() {
        let mut pool: Pool<i32> = Pool::new();

        let idx = pool.insert(7);
        assert!(pool.remove(idx).is_some());
        assert!(pool.remove(idx).is_none(), "Double remove should be rejected");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_free_list_is_lifo() {
        let mut pool: Pool<i32> = Pool::new();

        let i0 = pool.insert(0);
        let i1 = pool.insert(1);
        pool.remove(i0);
        pool.remove(i1);

        assert_eq!(pool.insert(10).raw(), 1);
        assert_eq!(pool.insert(20).raw(), 0);
    }

    #[test]
    fn test_pool_get_mut() {
        let mut pool: Pool<i32> = Pool::new();
        let idx = pool.insert(42);

        if let Some(value) = pool.get_mut(idx) {
            *value = 100;
        }

        assert_eq!(pool.get(idx), Some(&100));
    }
}
