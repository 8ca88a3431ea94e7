//! Frame identifiers for the in-flight frame ring.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{MAX_FRAMES, MIN_FRAMES};

/// Identifier of one CPU-recorded frame.
///
/// Carries a monotonically increasing unique value together with the ring
/// modulus, so both the unique frame number and its ring slot can be derived
/// from one copyable value. Frame number `0` means "no frame started yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId {
    value: u64,
    max_frames: u32,
}

impl FrameId {
    /// Initial id, before the first `begin_frame`.
    pub fn initial(max_frames: u32) -> Self {
        debug_assert!((MIN_FRAMES..=MAX_FRAMES).contains(&(max_frames as usize)));
        Self {
            value: 0,
            max_frames,
        }
    }

    /// Monotonic frame number. `0` when no frame has started.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Ring slot index in `0..max_frames()`.
    pub fn index(&self) -> usize {
        (self.value % self.max_frames as u64) as usize
    }

    /// Number of frames in flight.
    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }

    /// True once at least one frame has started.
    pub fn is_valid(&self) -> bool {
        self.value != 0
    }

    /// The following frame.
    pub fn next(&self) -> Self {
        Self {
            value: self.value + 1,
            max_frames: self.max_frames,
        }
    }

    /// The frame `n` steps back, or `None` if that underflows frame 0.
    pub fn sub(&self, n: u64) -> Option<Self> {
        if self.value <= n {
            return None;
        }
        Some(Self {
            value: self.value - n,
            max_frames: self.max_frames,
        })
    }

    /// The previous frame that occupied the same ring slot.
    pub fn prev_cycle(&self) -> Option<Self> {
        self.sub(self.max_frames as u64)
    }
}

/// Atomic cell holding a [`FrameId`] value.
///
/// The modulus is fixed at construction; only the frame number is atomic.
#[derive(Debug)]
pub struct AtomicFrameId {
    value: AtomicU64,
    max_frames: u32,
}

impl AtomicFrameId {
    pub fn new(id: FrameId) -> Self {
        Self {
            value: AtomicU64::new(id.value),
            max_frames: id.max_frames,
        }
    }

    pub fn load(&self) -> FrameId {
        FrameId {
            value: self.value.load(Ordering::Acquire),
            max_frames: self.max_frames,
        }
    }

    pub fn store(&self, id: FrameId) {
        debug_assert_eq!(id.max_frames, self.max_frames);
        self.value.store(id.value, Ordering::Release);
    }

    /// Advances to the next frame and returns the new id.
    pub fn increment(&self) -> FrameId {
        let value = self.value.fetch_add(1, Ordering::AcqRel) + 1;
        FrameId {
            value,
            max_frames: self.max_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_invalid() {
        let id = FrameId::initial(2);
        assert!(!id.is_valid());
        assert_eq!(id.value(), 0);
    }

    #[test]
    fn test_ring_index_wraps() {
        let mut id = FrameId::initial(3);
        for expected in [1, 2, 0, 1, 2, 0] {
            id = id.next();
            assert_eq!(id.index(), expected);
        }
    }

    #[test]
    fn test_index_sequence() {
        let mut id = FrameId::initial(2);
        let mut indices = Vec::new();
        for _ in 0..5 {
            id = id.next();
            indices.push(id.index());
        }
        assert_eq!(indices, vec![1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_prev_cycle() {
        let mut id = FrameId::initial(2);
        for _ in 0..3 {
            id = id.next();
        }
        let prev = id.prev_cycle().unwrap();
        assert_eq!(prev.value(), 1);
        assert_eq!(prev.index(), id.index());

        let early = FrameId::initial(2).next();
        assert!(early.prev_cycle().is_none());
    }

    #[test]
    fn test_atomic_increment() {
        let atomic = AtomicFrameId::new(FrameId::initial(2));
        let a = atomic.increment();
        let b = atomic.increment();
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 2);
        assert_eq!(atomic.load().value(), 2);
    }
}
