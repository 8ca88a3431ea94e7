//! Deferred destruction of GPU resources.
//!
//! Resources released while a frame may still be executing are parked in a
//! per-frame ring and destroyed only once that frame slot's GPU work is
//! confirmed complete.

use parking_lot::Mutex;

use crate::backend::{GpuCommandPool, GpuDevice, GpuFence, GpuSemaphore};
use crate::config::MAX_FRAMES;
use crate::frame::FrameId;

/// A GPU resource awaiting safe destruction.
#[derive(Debug)]
pub enum ExpiredResource {
    Fence(GpuFence),
    Semaphore(GpuSemaphore),
    CommandPool(GpuCommandPool),
    /// Backend buffer by raw handle.
    Buffer(u64),
    /// Backend image by raw handle.
    Image(u64),
}

/// Per-frame ring of resources pending destruction.
pub struct ExpiredResources {
    rings: [Mutex<Vec<ExpiredResource>>; MAX_FRAMES],
}

impl ExpiredResources {
    pub fn new() -> Self {
        Self {
            rings: Default::default(),
        }
    }

    /// Parks a resource until `frame`'s ring slot is reclaimed.
    pub fn defer(&self, frame: FrameId, resource: ExpiredResource) {
        self.rings[frame.index()].lock().push(resource);
    }

    /// Destroys everything parked for `frame`'s ring slot.
    ///
    /// Caller guarantees the slot's previous GPU work has completed.
    pub fn reclaim(&self, frame: FrameId, device: &dyn GpuDevice) {
        let drained: Vec<_> = std::mem::take(&mut *self.rings[frame.index()].lock());
        if !drained.is_empty() {
            log::trace!(
                "Reclaiming {} expired resources for frame slot {}",
                drained.len(),
                frame.index()
            );
        }
        for resource in drained {
            device.destroy_expired(resource);
        }
    }

    /// Destroys everything in every slot. Caller guarantees the device is
    /// idle.
    pub fn flush_all(&self, device: &dyn GpuDevice) {
        for ring in &self.rings {
            let drained: Vec<_> = std::mem::take(&mut *ring.lock());
            for resource in drained {
                device.destroy_expired(resource);
            }
        }
    }

    pub fn pending_count(&self, frame: FrameId) -> usize {
        self.rings[frame.index()].lock().len()
    }
}

impl Default for ExpiredResources {
    fn default() -> Self {
        Self::new()
    }
}
