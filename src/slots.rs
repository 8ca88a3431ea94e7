//! Fixed-capacity slot pool with a lock-free occupancy mask.

use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-size arena handing out slot indices through a single atomic bitmask.
///
/// Bit `i` set means slot `i` is acquired. [`SlotPool::acquire`] claims the
/// lowest free bit with a CAS loop, so two concurrent callers can never
/// receive the same index. The slot values themselves are created once at
/// construction and reused across acquire/release cycles; callers reset the
/// value's state on acquire.
pub struct SlotPool<T> {
    slots: Box<[T]>,
    occupied: AtomicU64,
}

impl<T> SlotPool<T> {
    /// Builds a pool of `capacity` slots (at most 64) from the factory.
    pub fn new(capacity: usize, mut init: impl FnMut(usize) -> T) -> Self {
        assert!(capacity > 0 && capacity <= 64);
        let slots: Vec<T> = (0..capacity).map(&mut init).collect();
        Self {
            slots: slots.into_boxed_slice(),
            occupied: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn full_mask(&self) -> u64 {
        if self.slots.len() == 64 {
            u64::MAX
        } else {
            (1u64 << self.slots.len()) - 1
        }
    }

    /// Claims a free slot, or `None` when the pool is exhausted.
    pub fn acquire(&self) -> Option<usize> {
        let full = self.full_mask();
        let mut current = self.occupied.load(Ordering::Relaxed);
        loop {
            let free = !current & full;
            if free == 0 {
                return None;
            }
            let index = free.trailing_zeros() as usize;
            let bit = 1u64 << index;
            match self.occupied.compare_exchange_weak(
                current,
                current | bit,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(index),
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns a slot to the pool.
    pub fn release(&self, index: usize) {
        debug_assert!(index < self.slots.len());
        let bit = 1u64 << index;
        let prev = self.occupied.fetch_and(!bit, Ordering::AcqRel);
        debug_assert!(prev & bit != 0, "releasing a slot that was not acquired");
    }

    pub fn is_acquired(&self, index: usize) -> bool {
        debug_assert!(index < self.slots.len());
        self.occupied.load(Ordering::Acquire) & (1u64 << index) != 0
    }

    pub fn acquired_count(&self) -> usize {
        self.occupied.load(Ordering::Acquire).count_ones() as usize
    }

    /// Access to a slot's value. Valid for both acquired and free slots;
    /// the occupancy mask only governs index handout.
    pub fn get(&self, index: usize) -> &T {
        &self.slots[index]
    }

    /// Iterates all slot values regardless of occupancy.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_acquire_release() {
        let pool = SlotPool::new(4, |_| ());
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.acquired_count(), 2);
        assert!(pool.is_acquired(a));

        pool.release(a);
        assert!(!pool.is_acquired(a));
        assert_eq!(pool.acquire(), Some(a));
    }

    #[test]
    fn test_exhaustion() {
        let pool = SlotPool::new(2, |_| ());
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_some());
        assert_eq!(pool.acquire(), None);
    }

    #[test]
    fn test_full_capacity_64() {
        let pool = SlotPool::new(64, |i| i);
        for _ in 0..64 {
            assert!(pool.acquire().is_some());
        }
        assert_eq!(pool.acquire(), None);
    }

    #[test]
    #[should_panic(expected = "releasing a slot that was not acquired")]
    fn test_double_release_panics() {
        let pool = SlotPool::new(4, |_| ());
        let a = pool.acquire().unwrap();
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn test_concurrent_acquire_unique() {
        let pool = Arc::new(SlotPool::new(64, |_| ()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                let mut acquired = Vec::new();
                for _ in 0..8 {
                    if let Some(idx) = pool.acquire() {
                        acquired.push(idx);
                    }
                }
                acquired
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for idx in handle.join().unwrap() {
                assert!(seen.insert(idx), "index {} handed out twice", idx);
            }
        }
        assert_eq!(seen.len(), 64);
    }
}
