//! Dummy backend for tests and headless use.
//!
//! Simulates a device in-process: submissions are appended to a log and
//! complete only when the test asks for it, so completion-order and
//! frame-pacing behavior can be driven deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{
    CommandBufferKind, GpuCommandBuffer, GpuCommandPool, GpuDevice, GpuFence, GpuSemaphore,
    SubmitRequest,
};
use crate::barrier::BarrierSet;
use crate::draw_batch::RenderPassState;
use crate::error::GraphicsError;
use crate::expired::ExpiredResource;
use crate::queue::{QueueCaps, QueueMask, QueueType};

/// Dummy semaphore handle. Timeline semaphores carry their counter inline.
#[derive(Debug, Clone)]
pub struct DummySemaphore {
    pub id: u64,
    timeline: Option<Arc<AtomicU64>>,
}

/// One queue submission as seen by the dummy device.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub queue: QueueType,
    pub command_buffer_count: usize,
    pub wait_count: usize,
    pub signal_count: usize,
    pub debug_name: String,
}

struct PendingCompletion {
    fence: Option<Arc<AtomicBool>>,
    timeline_signals: Vec<(Arc<AtomicU64>, u64)>,
}

#[allow(unreachable_patterns)]
fn fence_state(fence: &GpuFence) -> Result<&Arc<AtomicBool>, GraphicsError> {
    match fence {
        GpuFence::Dummy(state) => Ok(state),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign fence handle".to_string(),
        )),
    }
}

#[allow(unreachable_patterns)]
fn semaphore_state(semaphore: &GpuSemaphore) -> Result<&DummySemaphore, GraphicsError> {
    match semaphore {
        GpuSemaphore::Dummy(sem) => Ok(sem),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign semaphore handle".to_string(),
        )),
    }
}

/// In-process device simulation.
pub struct DummyDevice {
    timeline_support: bool,
    next_id: AtomicU64,
    submissions: Mutex<Vec<SubmissionRecord>>,
    pending: Mutex<VecDeque<PendingCompletion>>,
    destroyed: AtomicUsize,
    barrier_calls: AtomicUsize,
    fail_next_submit: AtomicBool,
    fail_next_pool_reset: AtomicBool,
}

impl DummyDevice {
    /// Device on the fence completion path.
    pub fn new() -> Self {
        Self {
            timeline_support: false,
            next_id: AtomicU64::new(1),
            submissions: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            destroyed: AtomicUsize::new(0),
            barrier_calls: AtomicUsize::new(0),
            fail_next_submit: AtomicBool::new(false),
            fail_next_pool_reset: AtomicBool::new(false),
        }
    }

    /// Device on the timeline completion path.
    pub fn with_timeline() -> Self {
        Self {
            timeline_support: true,
            ..Self::new()
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Everything submitted so far, in driver order.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Completes the oldest `count` still-pending submissions.
    pub fn complete_submissions(&self, count: usize) {
        let mut pending = self.pending.lock();
        for _ in 0..count {
            let Some(completion) = pending.pop_front() else {
                break;
            };
            Self::finish(completion);
        }
    }

    /// Completes every pending submission.
    pub fn complete_all(&self) {
        let mut pending = self.pending.lock();
        while let Some(completion) = pending.pop_front() {
            Self::finish(completion);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn finish(completion: PendingCompletion) {
        if let Some(fence) = completion.fence {
            fence.store(true, Ordering::Release);
        }
        for (counter, value) in completion.timeline_signals {
            counter.fetch_max(value, Ordering::AcqRel);
        }
    }

    /// Signals a fence directly, bypassing the submission queue.
    pub fn signal_fence(&self, fence: &GpuFence) {
        if let Ok(state) = fence_state(fence) {
            state.store(true, Ordering::Release);
        }
    }

    /// Advances a timeline semaphore directly.
    pub fn advance_timeline(&self, semaphore: &GpuSemaphore, value: u64) {
        if let Ok(sem) = semaphore_state(semaphore) {
            if let Some(counter) = &sem.timeline {
                counter.fetch_max(value, Ordering::AcqRel);
            }
        }
    }

    /// Makes the next `submit` call fail with a driver error.
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::Release);
    }

    /// Makes the next `reset_command_pool` call fail.
    pub fn fail_next_pool_reset(&self) {
        self.fail_next_pool_reset.store(true, Ordering::Release);
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn barrier_call_count(&self) -> usize {
        self.barrier_calls.load(Ordering::Acquire)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn available_queues(&self) -> QueueMask {
        QueueMask::all()
    }

    fn queue_caps(&self, queue: QueueType) -> QueueCaps {
        match queue {
            QueueType::Graphics => QueueCaps::graphics(),
            QueueType::AsyncCompute => QueueCaps::compute(),
            QueueType::AsyncTransfer => QueueCaps::transfer(),
        }
    }

    fn queue_family_index(&self, queue: QueueType) -> u32 {
        queue.index() as u32
    }

    fn supports_timeline(&self) -> bool {
        self.timeline_support
    }

    fn create_fence(&self) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy(Arc::new(AtomicBool::new(false))))
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        fence_state(fence)?.store(false, Ordering::Release);
        Ok(())
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError> {
        Ok(fence_state(fence)?.load(Ordering::Acquire))
    }

    fn wait_fence(&self, fence: &GpuFence, timeout: Duration) -> Result<bool, GraphicsError> {
        let state = fence_state(fence)?;
        let deadline = Instant::now() + timeout;
        while !state.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_micros(100));
        }
        Ok(true)
    }

    fn destroy_fence(&self, _fence: GpuFence) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        Ok(GpuSemaphore::Dummy(DummySemaphore {
            id: self.alloc_id(),
            timeline: None,
        }))
    }

    fn create_timeline_semaphore(&self, initial: u64) -> Result<GpuSemaphore, GraphicsError> {
        Ok(GpuSemaphore::Dummy(DummySemaphore {
            id: self.alloc_id(),
            timeline: Some(Arc::new(AtomicU64::new(initial))),
        }))
    }

    fn timeline_value(&self, semaphore: &GpuSemaphore) -> Result<u64, GraphicsError> {
        let sem = semaphore_state(semaphore)?;
        let counter = sem.timeline.as_ref().ok_or_else(|| {
            GraphicsError::InvalidParameter("not a timeline semaphore".to_string())
        })?;
        Ok(counter.load(Ordering::Acquire))
    }

    fn wait_timeline(
        &self,
        semaphore: &GpuSemaphore,
        value: u64,
        timeout: Duration,
    ) -> Result<bool, GraphicsError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.timeline_value(semaphore)? >= value {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    fn destroy_semaphore(&self, _semaphore: GpuSemaphore) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
    }

    fn create_command_pool(&self, _queue: QueueType) -> Result<GpuCommandPool, GraphicsError> {
        Ok(GpuCommandPool::Dummy { id: self.alloc_id() })
    }

    fn reset_command_pool(&self, _pool: &GpuCommandPool) -> Result<(), GraphicsError> {
        if self.fail_next_pool_reset.swap(false, Ordering::AcqRel) {
            return Err(GraphicsError::DeviceLost);
        }
        Ok(())
    }

    fn destroy_command_pool(&self, _pool: GpuCommandPool) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
    }

    fn allocate_command_buffer(
        &self,
        _pool: &GpuCommandPool,
        _kind: CommandBufferKind,
    ) -> Result<GpuCommandBuffer, GraphicsError> {
        Ok(GpuCommandBuffer::Dummy { id: self.alloc_id() })
    }

    fn begin_command_buffer(
        &self,
        _cmd: &GpuCommandBuffer,
        _kind: CommandBufferKind,
        _inherit: Option<&RenderPassState>,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn cmd_pipeline_barrier(
        &self,
        _cmd: &GpuCommandBuffer,
        _barriers: &BarrierSet<'_>,
    ) -> Result<(), GraphicsError> {
        self.barrier_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn cmd_execute_commands(
        &self,
        _primary: &GpuCommandBuffer,
        _secondaries: &[GpuCommandBuffer],
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn submit(&self, queue: QueueType, request: SubmitRequest<'_>) -> Result<(), GraphicsError> {
        if self.fail_next_submit.swap(false, Ordering::AcqRel) {
            return Err(GraphicsError::SubmissionFailed(
                "simulated driver failure".to_string(),
            ));
        }
        let mut timeline_signals = Vec::new();
        for signal in request.signals {
            let sem = semaphore_state(&signal.semaphore)?;
            if let Some(counter) = &sem.timeline {
                timeline_signals.push((Arc::clone(counter), signal.value));
            }
        }
        let fence = match request.fence {
            Some(fence) => Some(Arc::clone(fence_state(fence)?)),
            None => None,
        };

        self.submissions.lock().push(SubmissionRecord {
            queue,
            command_buffer_count: request.command_buffers.len(),
            wait_count: request.waits.len(),
            signal_count: request.signals.len(),
            debug_name: request.debug_name.to_string(),
        });
        self.pending.lock().push_back(PendingCompletion {
            fence,
            timeline_signals,
        });

        log::trace!(
            "Dummy submit on {:?}: {} command buffers ({})",
            queue,
            request.command_buffers.len(),
            request.debug_name
        );
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.complete_all();
        Ok(())
    }

    fn destroy_expired(&self, _resource: ExpiredResource) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
    }
}
