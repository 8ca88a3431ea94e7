//! Batch completion signals.
//!
//! Two completion paths exist behind one type: recycled fences for devices
//! without timeline semaphores, and per-batch timeline values where the
//! device supports them. The path is chosen once at scheduler construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{GpuDevice, GpuFence, GpuSemaphore, SemaphoreSignal};
use crate::error::GraphicsError;
use crate::slots::SlotPool;

/// A fence leased from a [`FencePool`].
///
/// Completion is cached in an atomic flag shared with the pool slot, so a
/// signaled fence is queried on the device at most once.
#[derive(Debug, Clone)]
pub struct PooledFence {
    index: usize,
    fence: GpuFence,
    completed: Arc<AtomicBool>,
}

impl PooledFence {
    pub fn gpu_fence(&self) -> &GpuFence {
        &self.fence
    }

    pub fn is_complete(&self, device: &dyn GpuDevice) -> Result<bool, GraphicsError> {
        if self.completed.load(Ordering::Acquire) {
            return Ok(true);
        }
        let signaled = device.is_fence_signaled(&self.fence)?;
        if signaled {
            self.completed.store(true, Ordering::Release);
        }
        Ok(signaled)
    }

    pub fn wait(&self, device: &dyn GpuDevice, timeout: Duration) -> Result<bool, GraphicsError> {
        if self.completed.load(Ordering::Acquire) {
            return Ok(true);
        }
        let signaled = device.wait_fence(&self.fence, timeout)?;
        if signaled {
            self.completed.store(true, Ordering::Release);
        }
        Ok(signaled)
    }
}

struct FenceSlot {
    fence: Mutex<Option<GpuFence>>,
    completed: Arc<AtomicBool>,
}

/// Pool of reusable fences.
///
/// Fences are created lazily on first acquire of a slot and reset on every
/// reuse.
pub struct FencePool {
    slots: SlotPool<FenceSlot>,
}

impl FencePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: SlotPool::new(capacity, |_| FenceSlot {
                fence: Mutex::new(None),
                completed: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn acquire(&self, device: &dyn GpuDevice) -> Result<PooledFence, GraphicsError> {
        let index = self.slots.acquire().ok_or(GraphicsError::OutOfBatches)?;
        let slot = self.slots.get(index);

        let fence = {
            let mut guard = slot.fence.lock();
            match &*guard {
                Some(fence) => {
                    device.reset_fence(fence)?;
                    fence.clone()
                }
                None => {
                    let fence = device.create_fence()?;
                    *guard = Some(fence.clone());
                    fence
                }
            }
        };
        slot.completed.store(false, Ordering::Release);

        Ok(PooledFence {
            index,
            fence,
            completed: Arc::clone(&slot.completed),
        })
    }

    /// Returns a fence to the pool for reuse.
    pub fn recycle(&self, fence: PooledFence) {
        self.slots.release(fence.index);
    }

    /// Destroys all pooled fences. Caller guarantees none are in flight.
    pub fn destroy_all(&self, device: &dyn GpuDevice) {
        for slot in self.slots.iter() {
            if let Some(fence) = slot.fence.lock().take() {
                device.destroy_fence(fence);
            }
        }
    }
}

/// How a batch's GPU completion is observed.
#[derive(Debug, Clone)]
pub enum CompletionSignal {
    Fence(PooledFence),
    Timeline { semaphore: GpuSemaphore, value: u64 },
}

impl CompletionSignal {
    pub fn is_complete(&self, device: &dyn GpuDevice) -> Result<bool, GraphicsError> {
        match self {
            CompletionSignal::Fence(fence) => fence.is_complete(device),
            CompletionSignal::Timeline { semaphore, value } => {
                Ok(device.timeline_value(semaphore)? >= *value)
            }
        }
    }

    pub fn wait(&self, device: &dyn GpuDevice, timeout: Duration) -> Result<bool, GraphicsError> {
        match self {
            CompletionSignal::Fence(fence) => fence.wait(device, timeout),
            CompletionSignal::Timeline { semaphore, value } => {
                device.wait_timeline(semaphore, *value, timeout)
            }
        }
    }

    /// Fence to attach to the submission, for the fence path.
    pub fn submit_fence(&self) -> Option<&GpuFence> {
        match self {
            CompletionSignal::Fence(fence) => Some(fence.gpu_fence()),
            CompletionSignal::Timeline { .. } => None,
        }
    }

    /// Semaphore signal to attach to the submission, for the timeline path.
    pub fn submit_signal(&self) -> Option<SemaphoreSignal> {
        match self {
            CompletionSignal::Fence(_) => None,
            CompletionSignal::Timeline { semaphore, value } => Some(SemaphoreSignal {
                semaphore: semaphore.clone(),
                value: *value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;

    #[test]
    fn test_fence_pool_acquire_recycle() {
        let device = DummyDevice::new();
        let pool = FencePool::new(2);

        let a = pool.acquire(&device).unwrap();
        let b = pool.acquire(&device).unwrap();
        assert!(pool.acquire(&device).is_err());

        assert!(!a.is_complete(&device).unwrap());
        pool.recycle(a);
        pool.recycle(b);

        // Reacquired fence is reset, not signaled.
        let c = pool.acquire(&device).unwrap();
        assert!(!c.is_complete(&device).unwrap());
    }

    #[test]
    fn test_fence_completion_cached() {
        let device = DummyDevice::new();
        let pool = FencePool::new(1);
        let fence = pool.acquire(&device).unwrap();

        device.signal_fence(fence.gpu_fence());
        assert!(fence.is_complete(&device).unwrap());
        // Cached result survives even without further device queries.
        assert!(fence.completed.load(Ordering::Acquire));
    }

    #[test]
    fn test_timeline_signal_complete() {
        let device = DummyDevice::new();
        let semaphore = device.create_timeline_semaphore(0).unwrap();
        let signal = CompletionSignal::Timeline {
            semaphore: semaphore.clone(),
            value: 3,
        };

        assert!(!signal.is_complete(&device).unwrap());
        device.advance_timeline(&semaphore, 3);
        assert!(signal.is_complete(&device).unwrap());
    }

    #[test]
    fn test_timeline_wait_timeout() {
        let device = DummyDevice::new();
        let semaphore = device.create_timeline_semaphore(0).unwrap();
        let signal = CompletionSignal::Timeline {
            semaphore,
            value: 1,
        };

        let done = signal.wait(&device, Duration::from_millis(5)).unwrap();
        assert!(!done);
    }
}
