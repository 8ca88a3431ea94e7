//! Pooled command batches.
//!
//! A batch collects command buffers recorded by one or more threads,
//! together with its GPU semaphore dependencies and CPU-side hooks, and is
//! submitted to its queue as one unit at a fixed submit index. Batches are
//! pooled and reset for reuse once the GPU has finished them and no caller
//! holds a reference anymore.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{
    GpuCommandBuffer, GpuDevice, GpuSemaphore, SemaphoreSignal, SemaphoreWait, SubmitRequest,
};
use crate::barrier::StageMask;
use crate::config::{MAX_BATCH_DEPS, MAX_CMD_BUFS_PER_BATCH};
use crate::error::GraphicsError;
use crate::frame::{AtomicFrameId, FrameId};
use crate::queue::QueueType;
use crate::sync::CompletionSignal;

/// Lifecycle of a [`CommandBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BatchStatus {
    /// Free in the pool.
    Initial = 0,
    /// Acquired; command buffers may be recorded into it.
    Recording = 1,
    /// Recording is frozen; no new slots can be acquired.
    Recorded = 2,
    /// Queued for submission at its submit index.
    Pending = 3,
    /// Handed to the driver.
    Submitted = 4,
    /// GPU execution confirmed finished.
    Completed = 5,
    /// Submission failed; the batch never reached the GPU.
    Failed = 6,
}

impl BatchStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BatchStatus::Initial,
            1 => BatchStatus::Recording,
            2 => BatchStatus::Recorded,
            3 => BatchStatus::Pending,
            4 => BatchStatus::Submitted,
            5 => BatchStatus::Completed,
            _ => BatchStatus::Failed,
        }
    }
}

/// What a CPU hook observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch was handed to the driver.
    Submitted,
    /// GPU execution finished.
    Completed,
    /// The batch failed before the event could happen.
    Cancelled,
}

type Hook = Box<dyn FnOnce(BatchOutcome) + Send>;

/// Per-batch command buffer slots.
///
/// Slot indices are allocated atomically so several recording threads get
/// stable positions; gathering preserves index order. A slot left empty
/// (`complete_slot`) becomes a tolerated gap.
struct CmdBufSlots {
    /// Low bits count allocated slots, the high bit freezes allocation.
    counter: AtomicU32,
    slots: [Mutex<Option<GpuCommandBuffer>>; MAX_CMD_BUFS_PER_BATCH],
}

const SLOTS_LOCKED: u32 = 1 << 31;

impl CmdBufSlots {
    fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            slots: std::array::from_fn(|_| Mutex::new(None)),
        }
    }

    fn acquire(&self) -> Result<usize, GraphicsError> {
        let result = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current & SLOTS_LOCKED != 0 {
                    return None;
                }
                if current as usize >= MAX_CMD_BUFS_PER_BATCH {
                    return None;
                }
                Some(current + 1)
            });
        match result {
            Ok(previous) => Ok(previous as usize),
            Err(current) if current & SLOTS_LOCKED != 0 => Err(GraphicsError::InvalidState(
                "batch is no longer recording".to_string(),
            )),
            Err(_) => Err(GraphicsError::OutOfCommandBuffers),
        }
    }

    fn set(&self, index: usize, cmd: GpuCommandBuffer) {
        debug_assert!(index < self.count());
        *self.slots[index].lock() = Some(cmd);
    }

    fn lock_allocation(&self) {
        self.counter.fetch_or(SLOTS_LOCKED, Ordering::AcqRel);
    }

    fn count(&self) -> usize {
        (self.counter.load(Ordering::Acquire) & !SLOTS_LOCKED) as usize
    }

    /// Drains all filled slots in index order; empty slots are skipped.
    fn take_commands(&self) -> Vec<GpuCommandBuffer> {
        let count = self.count();
        let mut commands = Vec::with_capacity(count);
        for slot in &self.slots[..count] {
            if let Some(cmd) = slot.lock().take() {
                commands.push(cmd);
            }
        }
        commands
    }

    fn reset(&self) {
        for slot in &self.slots {
            *slot.lock() = None;
        }
        self.counter.store(0, Ordering::Release);
    }
}

/// One unit of GPU work on one queue.
pub struct CommandBatch {
    device: Arc<dyn GpuDevice>,
    pool_index: usize,
    status: AtomicU8,
    frame: AtomicFrameId,
    queue: AtomicU8,
    submit_index: AtomicU32,
    debug_name: Mutex<String>,
    slots: CmdBufSlots,
    /// Completion of the current submission; set while submitting.
    signal: Mutex<Option<CompletionSignal>>,
    /// Per-batch timeline semaphore, created once on the timeline path.
    timeline: Mutex<Option<GpuSemaphore>>,
    /// Target timeline value of the current use of this batch.
    timeline_target: AtomicU64,
    input_waits: Mutex<Vec<SemaphoreWait>>,
    output_signals: Mutex<Vec<SemaphoreSignal>>,
    /// Binary semaphores created for fence-path dependencies; destroyed by
    /// the scheduler when the batch is recycled.
    owned_semaphores: Mutex<Vec<GpuSemaphore>>,
    on_submit: Mutex<Vec<Hook>>,
    on_complete: Mutex<Vec<Hook>>,
}

impl CommandBatch {
    pub(crate) fn new(device: Arc<dyn GpuDevice>, pool_index: usize, max_frames: u32) -> Self {
        Self {
            device,
            pool_index,
            status: AtomicU8::new(BatchStatus::Initial as u8),
            frame: AtomicFrameId::new(FrameId::initial(max_frames)),
            queue: AtomicU8::new(0),
            submit_index: AtomicU32::new(0),
            debug_name: Mutex::new(String::new()),
            slots: CmdBufSlots::new(),
            signal: Mutex::new(None),
            timeline: Mutex::new(None),
            timeline_target: AtomicU64::new(0),
            input_waits: Mutex::new(Vec::new()),
            output_signals: Mutex::new(Vec::new()),
            owned_semaphores: Mutex::new(Vec::new()),
            on_submit: Mutex::new(Vec::new()),
            on_complete: Mutex::new(Vec::new()),
        }
    }

    /// Prepares a freshly acquired pool slot for recording.
    pub(crate) fn init(
        &self,
        frame: FrameId,
        queue: QueueType,
        submit_index: u32,
        debug_name: &str,
        use_timeline: bool,
    ) -> Result<(), GraphicsError> {
        debug_assert_eq!(self.status(), BatchStatus::Initial);
        self.frame.store(frame);
        self.queue.store(queue.index() as u8, Ordering::Release);
        self.submit_index.store(submit_index, Ordering::Release);
        *self.debug_name.lock() = debug_name.to_string();

        if use_timeline {
            let mut timeline = self.timeline.lock();
            if timeline.is_none() {
                *timeline = Some(self.device.create_timeline_semaphore(0)?);
            }
            self.timeline_target.fetch_add(1, Ordering::AcqRel);
        }

        self.set_status(BatchStatus::Recording);
        log::trace!(
            "Batch {} acquired for {:?} submit index {} ({})",
            self.pool_index,
            queue,
            submit_index,
            debug_name
        );
        Ok(())
    }

    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// True once GPU execution was confirmed finished.
    pub fn is_completed(&self) -> bool {
        self.status() == BatchStatus::Completed
    }

    fn set_status(&self, status: BatchStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame.load()
    }

    pub fn queue_type(&self) -> QueueType {
        QueueType::from_index(self.queue.load(Ordering::Acquire) as usize)
            .unwrap_or(QueueType::Graphics)
    }

    pub fn submit_index(&self) -> u32 {
        self.submit_index.load(Ordering::Acquire)
    }

    pub fn debug_name(&self) -> String {
        self.debug_name.lock().clone()
    }

    pub(crate) fn pool_index(&self) -> usize {
        self.pool_index
    }

    /// Reserves the next command buffer position in this batch.
    pub fn acquire_slot(&self) -> Result<usize, GraphicsError> {
        if self.status() != BatchStatus::Recording {
            return Err(GraphicsError::InvalidState(
                "batch is not recording".to_string(),
            ));
        }
        self.slots.acquire()
    }

    /// Stores a finished command buffer at a reserved position.
    pub fn set_commands(&self, index: usize, cmd: GpuCommandBuffer) {
        self.slots.set(index, cmd);
    }

    /// Marks a reserved position as intentionally empty.
    pub fn complete_slot(&self, _index: usize) {
        // The slot stays `None`; gathering skips it.
    }

    /// Wait on another batch's GPU completion before this batch executes.
    ///
    /// On the timeline path this waits for the other batch's current target
    /// value. On the fence path a binary semaphore is spliced between the
    /// two submissions; the other batch must not have been submitted yet.
    pub fn add_input_dependency(&self, other: &CommandBatch) -> Result<(), GraphicsError> {
        let other_timeline = other.timeline.lock().clone();
        match other_timeline {
            Some(semaphore) => self.add_input_semaphore(
                semaphore,
                other.timeline_target.load(Ordering::Acquire),
            ),
            None => {
                if other.status() >= BatchStatus::Submitted {
                    return Err(GraphicsError::InvalidState(
                        "dependency target already submitted".to_string(),
                    ));
                }
                let semaphore = self.device.create_semaphore()?;
                other.add_output_semaphore(semaphore.clone(), 0)?;
                self.add_input_semaphore(semaphore.clone(), 0)?;
                self.owned_semaphores.lock().push(semaphore);
                Ok(())
            }
        }
    }

    /// Adds a semaphore this batch waits on before executing.
    pub fn add_input_semaphore(
        &self,
        semaphore: GpuSemaphore,
        value: u64,
    ) -> Result<(), GraphicsError> {
        if self.status() >= BatchStatus::Submitted {
            return Err(GraphicsError::InvalidState(
                "batch already submitted".to_string(),
            ));
        }
        let mut waits = self.input_waits.lock();
        if waits.len() >= MAX_BATCH_DEPS {
            return Err(GraphicsError::TooManyDependencies);
        }
        waits.push(SemaphoreWait {
            semaphore,
            value,
            stages: StageMask::TOP_OF_PIPE,
        });
        Ok(())
    }

    /// Adds a semaphore this batch signals when it finishes.
    pub fn add_output_semaphore(
        &self,
        semaphore: GpuSemaphore,
        value: u64,
    ) -> Result<(), GraphicsError> {
        if self.status() >= BatchStatus::Submitted {
            return Err(GraphicsError::InvalidState(
                "batch already submitted".to_string(),
            ));
        }
        let mut signals = self.output_signals.lock();
        if signals.len() >= MAX_BATCH_DEPS {
            return Err(GraphicsError::TooManyDependencies);
        }
        signals.push(SemaphoreSignal { semaphore, value });
        Ok(())
    }

    /// Runs `hook` when the batch is handed to the driver, or immediately
    /// if that already happened. A failed batch cancels the hook.
    pub fn on_submit(&self, hook: impl FnOnce(BatchOutcome) + Send + 'static) {
        match self.status() {
            BatchStatus::Submitted | BatchStatus::Completed => hook(BatchOutcome::Submitted),
            BatchStatus::Failed => hook(BatchOutcome::Cancelled),
            _ => self.on_submit.lock().push(Box::new(hook)),
        }
    }

    /// Runs `hook` when GPU execution finishes, or immediately if it
    /// already did. A failed batch cancels the hook.
    pub fn on_complete(&self, hook: impl FnOnce(BatchOutcome) + Send + 'static) {
        match self.status() {
            BatchStatus::Completed => hook(BatchOutcome::Completed),
            BatchStatus::Failed => hook(BatchOutcome::Cancelled),
            _ => self.on_complete.lock().push(Box::new(hook)),
        }
    }

    /// Freezes slot allocation. Called by the scheduler on `submit`.
    pub(crate) fn finalize_recording(&self) -> Result<(), GraphicsError> {
        if self.status() != BatchStatus::Recording {
            return Err(GraphicsError::InvalidState(
                "batch is not recording".to_string(),
            ));
        }
        self.slots.lock_allocation();
        self.set_status(BatchStatus::Recorded);
        Ok(())
    }

    pub(crate) fn mark_pending(&self) {
        debug_assert_eq!(self.status(), BatchStatus::Recorded);
        self.set_status(BatchStatus::Pending);
    }

    /// Submits the batch to its queue. Caller holds the per-queue driver
    /// lock and has built the completion signal.
    pub(crate) fn submit_to_device(
        &self,
        signal: CompletionSignal,
    ) -> Result<(), GraphicsError> {
        debug_assert_eq!(self.status(), BatchStatus::Pending);

        let commands = self.slots.take_commands();
        let waits = self.input_waits.lock().clone();
        let mut signals = self.output_signals.lock().clone();
        if let Some(own) = signal.submit_signal() {
            signals.push(own);
        }

        let name = self.debug_name.lock().clone();
        let result = self.device.submit(
            self.queue_type(),
            SubmitRequest {
                command_buffers: &commands,
                waits: &waits,
                signals: &signals,
                fence: signal.submit_fence(),
                debug_name: &name,
            },
        );

        match result {
            Ok(()) => {
                *self.signal.lock() = Some(signal);
                self.set_status(BatchStatus::Submitted);
                self.fire_hooks(&self.on_submit, BatchOutcome::Submitted);
                log::trace!(
                    "Batch {} submitted on {:?} at index {}",
                    self.pool_index,
                    self.queue_type(),
                    self.submit_index()
                );
                Ok(())
            }
            Err(err) => {
                self.set_status(BatchStatus::Failed);
                self.cancel_hooks();
                log::error!("Batch {} submission failed: {}", self.pool_index, err);
                Err(err)
            }
        }
    }

    /// True once the GPU is confirmed done (or the batch never reached it).
    pub fn is_complete_on_device(&self) -> Result<bool, GraphicsError> {
        match self.status() {
            BatchStatus::Completed | BatchStatus::Failed => Ok(true),
            BatchStatus::Submitted => {
                let signal = self.signal.lock().clone();
                match signal {
                    Some(signal) => signal.is_complete(self.device.as_ref()),
                    None => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    /// Blocks until GPU execution finishes or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<bool, GraphicsError> {
        match self.status() {
            BatchStatus::Completed | BatchStatus::Failed => Ok(true),
            BatchStatus::Submitted => {
                let signal = self.signal.lock().clone();
                match signal {
                    Some(signal) => signal.wait(self.device.as_ref(), timeout),
                    None => Ok(false),
                }
            }
            _ => Err(GraphicsError::InvalidState(
                "batch was not submitted".to_string(),
            )),
        }
    }

    /// Transitions Submitted to Completed and fires completion hooks.
    pub(crate) fn mark_completed(&self) {
        let previous = self.status.compare_exchange(
            BatchStatus::Submitted as u8,
            BatchStatus::Completed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if previous.is_ok() {
            self.fire_hooks(&self.on_complete, BatchOutcome::Completed);
        }
    }

    /// Fails a batch that will never reach the driver, cancelling its
    /// hooks.
    pub(crate) fn fail_cancelled(&self) {
        self.set_status(BatchStatus::Failed);
        self.cancel_hooks();
    }

    /// Cancels every pending hook. Used when the batch fails.
    pub(crate) fn cancel_hooks(&self) {
        self.fire_hooks(&self.on_submit, BatchOutcome::Cancelled);
        self.fire_hooks(&self.on_complete, BatchOutcome::Cancelled);
    }

    fn fire_hooks(&self, hooks: &Mutex<Vec<Hook>>, outcome: BatchOutcome) {
        let drained: Vec<Hook> = std::mem::take(&mut *hooks.lock());
        for hook in drained {
            hook(outcome);
        }
    }

    /// Returns the batch to its pooled state. The scheduler calls this only
    /// when the GPU is done and no external references remain.
    pub(crate) fn reset_for_reuse(&self) -> (Option<CompletionSignal>, Vec<GpuSemaphore>) {
        debug_assert!(matches!(
            self.status(),
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Initial
        ));
        let signal = self.signal.lock().take();
        let owned = std::mem::take(&mut *self.owned_semaphores.lock());
        self.slots.reset();
        self.input_waits.lock().clear();
        self.output_signals.lock().clear();
        self.on_submit.lock().clear();
        self.on_complete.lock().clear();
        self.debug_name.lock().clear();
        self.set_status(BatchStatus::Initial);
        (signal, owned)
    }

    /// Destroys the per-batch timeline semaphore. Called at shutdown.
    pub(crate) fn destroy_timeline(&self) {
        if let Some(semaphore) = self.timeline.lock().take() {
            self.device.destroy_semaphore(semaphore);
        }
    }

    /// The timeline value this use of the batch will signal, if on the
    /// timeline path.
    pub(crate) fn completion_signal_for_submit(&self) -> Option<CompletionSignal> {
        let timeline = self.timeline.lock().clone();
        timeline.map(|semaphore| CompletionSignal::Timeline {
            semaphore,
            value: self.timeline_target.load(Ordering::Acquire),
        })
    }
}

impl fmt::Debug for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBatch")
            .field("pool_index", &self.pool_index)
            .field("status", &self.status())
            .field("queue", &self.queue_type())
            .field("submit_index", &self.submit_index())
            .field("frame", &self.frame.load())
            .field("debug_name", &*self.debug_name.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use std::sync::atomic::AtomicUsize;

    fn batch(device: Arc<DummyDevice>) -> CommandBatch {
        let batch = CommandBatch::new(device, 0, 2);
        batch
            .init(
                FrameId::initial(2).next(),
                QueueType::Graphics,
                0,
                "test",
                false,
            )
            .unwrap();
        batch
    }

    fn dummy_cmd(device: &DummyDevice) -> GpuCommandBuffer {
        use crate::backend::CommandBufferKind;
        let pool = device.create_command_pool(QueueType::Graphics).unwrap();
        device
            .allocate_command_buffer(&pool, CommandBufferKind::Primary)
            .unwrap()
    }

    #[test]
    fn test_slot_allocation_order() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device);
        assert_eq!(batch.acquire_slot().unwrap(), 0);
        assert_eq!(batch.acquire_slot().unwrap(), 1);
        assert_eq!(batch.acquire_slot().unwrap(), 2);
    }

    #[test]
    fn test_slots_frozen_after_finalize() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device);
        batch.acquire_slot().unwrap();
        batch.finalize_recording().unwrap();
        assert!(batch.acquire_slot().is_err());
    }

    #[test]
    fn test_gather_skips_gaps() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        let a = batch.acquire_slot().unwrap();
        let gap = batch.acquire_slot().unwrap();
        let b = batch.acquire_slot().unwrap();

        batch.set_commands(a, dummy_cmd(&device));
        batch.complete_slot(gap);
        batch.set_commands(b, dummy_cmd(&device));

        batch.finalize_recording().unwrap();
        batch.mark_pending();
        let signal = CompletionSignal::Fence(
            crate::sync::FencePool::new(1).acquire(device.as_ref()).unwrap(),
        );
        batch.submit_to_device(signal).unwrap();

        let log = device.submissions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].command_buffer_count, 2);
    }

    #[test]
    fn test_submit_hook_fires_once() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        batch.on_submit(move |outcome| {
            assert_eq!(outcome, BatchOutcome::Submitted);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        batch.finalize_recording().unwrap();
        batch.mark_pending();
        let signal = CompletionSignal::Fence(
            crate::sync::FencePool::new(1).acquire(device.as_ref()).unwrap(),
        );
        batch.submit_to_device(signal).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Late registration observes the event immediately.
        let counter = Arc::clone(&fired);
        batch.on_submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_submit_cancels_hooks() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let sink = Arc::clone(&outcomes);
            batch.on_submit(move |outcome| sink.lock().push(outcome));
        }
        let sink = Arc::clone(&outcomes);
        batch.on_complete(move |outcome| sink.lock().push(outcome));

        batch.finalize_recording().unwrap();
        batch.mark_pending();
        device.fail_next_submit();
        let signal = CompletionSignal::Fence(
            crate::sync::FencePool::new(1).acquire(device.as_ref()).unwrap(),
        );
        let err = batch.submit_to_device(signal).unwrap_err();
        assert!(matches!(err, GraphicsError::SubmissionFailed(_)));
        assert_eq!(batch.status(), BatchStatus::Failed);

        let fired = outcomes.lock().clone();
        assert_eq!(fired.len(), 3);
        assert!(fired.iter().all(|o| *o == BatchOutcome::Cancelled));
    }

    #[test]
    fn test_completion_via_fence() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        batch.finalize_recording().unwrap();
        batch.mark_pending();

        let pool = crate::sync::FencePool::new(1);
        let signal = CompletionSignal::Fence(pool.acquire(device.as_ref()).unwrap());
        batch.submit_to_device(signal).unwrap();

        assert!(!batch.is_complete_on_device().unwrap());
        device.complete_all();
        assert!(batch.is_complete_on_device().unwrap());

        batch.mark_completed();
        assert_eq!(batch.status(), BatchStatus::Completed);
    }

    #[test]
    fn test_timeline_dependency_between_batches() {
        let device = Arc::new(DummyDevice::with_timeline());
        let producer = CommandBatch::new(device.clone(), 0, 2);
        let consumer = CommandBatch::new(device.clone(), 1, 2);
        let frame = FrameId::initial(2).next();
        producer
            .init(frame, QueueType::Graphics, 0, "producer", true)
            .unwrap();
        consumer
            .init(frame, QueueType::AsyncCompute, 0, "consumer", true)
            .unwrap();

        consumer.add_input_dependency(&producer).unwrap();
        assert_eq!(consumer.input_waits.lock().len(), 1);
        // Producer keeps no extra output; its own timeline is the signal.
        assert_eq!(producer.output_signals.lock().len(), 0);
    }

    #[test]
    fn test_dependency_limit() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        for _ in 0..MAX_BATCH_DEPS {
            let sem = device.create_semaphore().unwrap();
            batch.add_input_semaphore(sem, 0).unwrap();
        }
        let sem = device.create_semaphore().unwrap();
        assert_eq!(
            batch.add_input_semaphore(sem, 0),
            Err(GraphicsError::TooManyDependencies)
        );
    }

    #[test]
    fn test_debug_output_names_the_batch() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device);
        let text = format!("{:?}", batch);
        assert!(text.contains("CommandBatch"));
        assert!(text.contains("Recording"));
        assert!(text.contains("test"));
    }

    #[test]
    fn test_reset_for_reuse() {
        let device = Arc::new(DummyDevice::new());
        let batch = batch(device.clone());
        batch.acquire_slot().unwrap();
        batch.on_submit(|_| {});
        batch.finalize_recording().unwrap();
        batch.mark_pending();

        let pool = crate::sync::FencePool::new(1);
        let signal = CompletionSignal::Fence(pool.acquire(device.as_ref()).unwrap());
        batch.submit_to_device(signal).unwrap();
        device.complete_all();
        batch.mark_completed();

        let (signal, owned) = batch.reset_for_reuse();
        assert!(signal.is_some());
        assert!(owned.is_empty());
        assert_eq!(batch.status(), BatchStatus::Initial);
        assert_eq!(batch.slots.count(), 0);
    }
}
