//! Render task scheduler.
//!
//! Owns the frame ring and, per queue, a packed bitfield tracking which
//! submit indices are declared (`required`), handed in (`pending`) and
//! already given to the driver (`submitted`). Batches reach the driver in
//! ascending submit index order; a missing index blocks everything behind
//! it until end of frame, where the configured policy decides between
//! strict verification and forced out-of-order submission.
//!
//! Bit layout of the per-queue word:
//!
//! ```text
//!  63..48   47..32     31..16    15..0
//!  unused   submitted  pending   required
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{CommandBufferKind, GpuDevice};
use crate::batch::{BatchStatus, CommandBatch};
use crate::command_pool::{CommandPoolManager, CommandRecorder};
use crate::config::{
    BATCH_POOL_CAPACITY, DRAW_BATCH_POOL_CAPACITY, MAX_FRAMES, MAX_PENDING_BATCHES,
    MAX_SUBMITTED_BATCHES, MIN_FRAMES,
};
use crate::draw_batch::{DrawCommandBatch, RenderPassState};
use crate::error::GraphicsError;
use crate::expired::{ExpiredResource, ExpiredResources};
use crate::frame::{AtomicFrameId, FrameId};
use crate::queue::QueueType;
use crate::slots::SlotPool;
use crate::sync::{CompletionSignal, FencePool};

/// What `end_frame` does about submit indices that never became pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFramePolicy {
    /// Submit everything pending even past gaps, then verify.
    ForceOutOfOrder,
    /// Fail `end_frame` if any required index never became pending.
    Strict,
}

/// Scheduler construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerDesc {
    pub frames_in_flight: u32,
    pub end_frame_policy: EndFramePolicy,
}

impl Default for SchedulerDesc {
    fn default() -> Self {
        Self {
            frames_in_flight: MIN_FRAMES as u32,
            end_frame_policy: EndFramePolicy::ForceOutOfOrder,
        }
    }
}

/// When a submitted batch is pushed toward the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Wait for a later flush or end of frame.
    Deferred,
    /// Try to flush now; skip silently if another thread is flushing.
    Immediately,
    /// Flush now, waiting for the queue lock if needed.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SchedulerStatus {
    Idle = 0,
    BeginFrame = 1,
    RecordFrame = 2,
    Destroyed = 3,
}

const INDEX_MASK: u64 = (1 << MAX_PENDING_BATCHES) - 1;
const PENDING_SHIFT: u32 = 16;
const SUBMITTED_SHIFT: u32 = 32;

struct QueueData {
    /// Packed required/pending/submitted index bits, see module docs.
    bits: std::sync::atomic::AtomicU64,
    pending: [Mutex<Option<Arc<CommandBatch>>>; MAX_PENDING_BATCHES],
    /// Serializes driver submission for this queue.
    submit_lock: Mutex<()>,
}

impl QueueData {
    fn new() -> Self {
        Self {
            bits: std::sync::atomic::AtomicU64::new(0),
            pending: std::array::from_fn(|_| Mutex::new(None)),
            submit_lock: Mutex::new(()),
        }
    }
}

struct FrameData {
    /// Batches handed to the driver for this frame, awaiting completion.
    submitted: Mutex<Vec<Arc<CommandBatch>>>,
    /// Draw batch pool indices in flight for this frame.
    draw_batches: Mutex<Vec<usize>>,
}

impl FrameData {
    fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            draw_batches: Mutex::new(Vec::new()),
        }
    }
}

/// Frame-pipelined multi-queue command batch scheduler.
pub struct RenderScheduler {
    device: Arc<dyn GpuDevice>,
    desc: SchedulerDesc,
    status: AtomicU8,
    frame: AtomicFrameId,
    use_timeline: bool,
    batches: SlotPool<Arc<CommandBatch>>,
    retired_batches: Mutex<Vec<usize>>,
    draw_batches: SlotPool<Arc<DrawCommandBatch>>,
    retired_draws: Mutex<Vec<usize>>,
    fences: FencePool,
    queues: [QueueData; QueueType::COUNT],
    frames: Vec<FrameData>,
    cmd_pools: CommandPoolManager,
    expired: ExpiredResources,
    last_frame_start: Mutex<Option<Instant>>,
    frame_delta: Mutex<Duration>,
}

impl RenderScheduler {
    pub fn new(device: Arc<dyn GpuDevice>, desc: SchedulerDesc) -> Result<Self, GraphicsError> {
        let frames = desc.frames_in_flight;
        if !(MIN_FRAMES..=MAX_FRAMES).contains(&(frames as usize)) {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames_in_flight must be in {}..={}, got {}",
                MIN_FRAMES, MAX_FRAMES, frames
            )));
        }

        let use_timeline = device.supports_timeline();
        log::info!(
            "Scheduler on '{}': {} frames in flight, {} completion",
            device.name(),
            frames,
            if use_timeline { "timeline" } else { "fence" }
        );

        let batch_device = Arc::clone(&device);
        Ok(Self {
            desc,
            status: AtomicU8::new(SchedulerStatus::Idle as u8),
            frame: AtomicFrameId::new(FrameId::initial(frames)),
            use_timeline,
            batches: SlotPool::new(BATCH_POOL_CAPACITY, |i| {
                Arc::new(CommandBatch::new(Arc::clone(&batch_device), i, frames))
            }),
            retired_batches: Mutex::new(Vec::new()),
            draw_batches: SlotPool::new(DRAW_BATCH_POOL_CAPACITY, |i| {
                Arc::new(DrawCommandBatch::new(i, frames))
            }),
            retired_draws: Mutex::new(Vec::new()),
            fences: FencePool::new(BATCH_POOL_CAPACITY),
            queues: std::array::from_fn(|_| QueueData::new()),
            frames: (0..frames).map(|_| FrameData::new()).collect(),
            cmd_pools: CommandPoolManager::new(Arc::clone(&device), frames as usize),
            expired: ExpiredResources::new(),
            last_frame_start: Mutex::new(None),
            frame_delta: Mutex::new(Duration::ZERO),
            device,
        })
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn current_frame(&self) -> FrameId {
        self.frame.load()
    }

    /// CPU time between the two most recent `begin_frame` calls.
    pub fn frame_time_delta(&self) -> Duration {
        *self.frame_delta.lock()
    }

    /// Parks a resource for destruction once the current frame's ring slot
    /// is reused.
    pub fn defer_destroy(&self, resource: ExpiredResource) {
        self.expired.defer(self.frame.load(), resource);
    }

    fn status_enum(&self) -> SchedulerStatus {
        match self.status.load(Ordering::Acquire) {
            0 => SchedulerStatus::Idle,
            1 => SchedulerStatus::BeginFrame,
            2 => SchedulerStatus::RecordFrame,
            _ => SchedulerStatus::Destroyed,
        }
    }

    fn transition(
        &self,
        from: SchedulerStatus,
        to: SchedulerStatus,
    ) -> Result<(), GraphicsError> {
        self.status
            .compare_exchange(
                from as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| {
                GraphicsError::InvalidState(format!(
                    "scheduler status is {}, expected {}",
                    actual, from as u8
                ))
            })
    }

    /// Starts the next frame.
    ///
    /// Fails with [`GraphicsError::FrameNotReady`] while the target ring
    /// slot's previous occupant is still executing; callers either retry or
    /// block in [`RenderScheduler::wait_next_frame`] first.
    pub fn begin_frame(&self) -> Result<FrameId, GraphicsError> {
        self.transition(SchedulerStatus::Idle, SchedulerStatus::BeginFrame)?;

        let next = self.frame.load().next();
        if let Some(previous) = next.prev_cycle() {
            if previous.is_valid() && !self.is_frame_complete(previous) {
                self.status
                    .store(SchedulerStatus::Idle as u8, Ordering::Release);
                return Err(GraphicsError::FrameNotReady);
            }
        }

        let frame = self.frame.increment();
        debug_assert_eq!(frame, next);

        if let Err(err) = self.cmd_pools.next_frame(frame) {
            self.status
                .store(SchedulerStatus::Idle as u8, Ordering::Release);
            return Err(err);
        }
        self.expired.reclaim(frame, self.device.as_ref());
        self.sweep_retired();

        let now = Instant::now();
        let mut last = self.last_frame_start.lock();
        if let Some(previous) = *last {
            *self.frame_delta.lock() = now - previous;
        }
        *last = Some(now);
        drop(last);

        self.status
            .store(SchedulerStatus::RecordFrame as u8, Ordering::Release);
        log::trace!("Frame {} started (slot {})", frame.value(), frame.index());
        Ok(frame)
    }

    /// Blocks until the next frame's ring slot is free, or the timeout
    /// elapses. Returns `true` when `begin_frame` can proceed.
    pub fn wait_next_frame(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let next = self.frame.load().next();
            let ready = match next.prev_cycle() {
                Some(previous) if previous.is_valid() => self.is_frame_complete(previous),
                _ => true,
            };
            if ready {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Declares and acquires a batch for `submit_index` on `queue`.
    ///
    /// Declaring the same index twice in one frame is a contract violation
    /// and fails with [`GraphicsError::InvalidState`].
    pub fn begin_cmd_batch(
        &self,
        queue: QueueType,
        submit_index: u32,
        debug_name: &str,
    ) -> Result<Arc<CommandBatch>, GraphicsError> {
        if self.status_enum() != SchedulerStatus::RecordFrame {
            return Err(GraphicsError::InvalidState(
                "no frame is being recorded".to_string(),
            ));
        }
        if submit_index as usize >= MAX_PENDING_BATCHES {
            return Err(GraphicsError::InvalidParameter(format!(
                "submit index {} exceeds {}",
                submit_index,
                MAX_PENDING_BATCHES - 1
            )));
        }
        if !self.device.available_queues().contains(queue.mask()) {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "queue {:?} is not available",
                queue
            )));
        }

        let queue_data = &self.queues[queue.index()];
        let bit = 1u64 << submit_index;
        let previous = queue_data.bits.fetch_or(bit, Ordering::AcqRel);
        if previous & bit != 0 {
            return Err(GraphicsError::InvalidState(format!(
                "submit index {} already declared on {:?}",
                submit_index, queue
            )));
        }

        let index = match self.batches.acquire() {
            Some(index) => index,
            None => {
                self.sweep_retired();
                match self.batches.acquire() {
                    Some(index) => index,
                    None => {
                        queue_data.bits.fetch_and(!bit, Ordering::AcqRel);
                        return Err(GraphicsError::OutOfBatches);
                    }
                }
            }
        };

        let batch = Arc::clone(self.batches.get(index));
        batch.init(
            self.frame.load(),
            queue,
            submit_index,
            debug_name,
            self.use_timeline,
        )?;
        Ok(batch)
    }

    /// Acquires a draw batch bound to one render pass configuration.
    pub fn begin_draw_batch(
        &self,
        state: RenderPassState,
        debug_name: &str,
    ) -> Result<Arc<DrawCommandBatch>, GraphicsError> {
        if self.status_enum() != SchedulerStatus::RecordFrame {
            return Err(GraphicsError::InvalidState(
                "no frame is being recorded".to_string(),
            ));
        }
        let index = match self.draw_batches.acquire() {
            Some(index) => index,
            None => {
                self.sweep_retired();
                self.draw_batches
                    .acquire()
                    .ok_or(GraphicsError::OutOfBatches)?
            }
        };
        let frame = self.frame.load();
        let draw = Arc::clone(self.draw_batches.get(index));
        draw.init(frame, state, debug_name);
        self.frames[frame.index()].draw_batches.lock().push(index);
        Ok(draw)
    }

    /// Leases a primary command buffer for `batch`'s queue and wraps it in
    /// a recorder.
    pub fn record(&self, batch: &CommandBatch) -> Result<CommandRecorder<'_>, GraphicsError> {
        if batch.status() != BatchStatus::Recording {
            return Err(GraphicsError::InvalidState(
                "batch is not recording".to_string(),
            ));
        }
        let lease = self.cmd_pools.get_command_buffer(
            batch.frame_id(),
            batch.queue_type(),
            CommandBufferKind::Primary,
            None,
        )?;
        Ok(CommandRecorder::new(Arc::clone(&self.device), lease))
    }

    /// Leases a secondary command buffer inheriting `draw`'s render pass
    /// state.
    pub fn record_draws(
        &self,
        draw: &DrawCommandBatch,
    ) -> Result<CommandRecorder<'_>, GraphicsError> {
        let state = draw.render_state().ok_or_else(|| {
            GraphicsError::InvalidState("draw batch is not initialized".to_string())
        })?;
        let lease = self.cmd_pools.get_command_buffer(
            draw.frame_id(),
            QueueType::Graphics,
            CommandBufferKind::Secondary,
            Some(&state),
        )?;
        Ok(CommandRecorder::new(Arc::clone(&self.device), lease))
    }

    /// Finishes a batch's recording and queues it at its submit index.
    pub fn submit(
        &self,
        batch: &Arc<CommandBatch>,
        mode: SubmitMode,
    ) -> Result<(), GraphicsError> {
        batch.finalize_recording()?;
        batch.mark_pending();

        let queue = batch.queue_type();
        let queue_data = &self.queues[queue.index()];
        let index = batch.submit_index() as usize;
        *queue_data.pending[index].lock() = Some(Arc::clone(batch));

        let bit = 1u64 << index;
        let previous = queue_data.bits.fetch_or(bit << PENDING_SHIFT, Ordering::AcqRel);
        debug_assert!(previous & bit != 0, "submit without begin_cmd_batch");

        match mode {
            SubmitMode::Deferred => Ok(()),
            SubmitMode::Immediately => self.flush_queue(queue, false),
            SubmitMode::Force => self.flush_queue(queue, true),
        }
    }

    /// Declares `mask`'s submit indices as intentionally unused this frame.
    ///
    /// Indices already declared through `begin_cmd_batch` are left alone;
    /// their batches must still come in.
    pub fn skip_submit_indices(&self, queue: QueueType, mask: u16) -> Result<(), GraphicsError> {
        let mask = mask as u64;
        if mask & !INDEX_MASK != 0 {
            return Err(GraphicsError::InvalidParameter(
                "skip mask exceeds the submit index range".to_string(),
            ));
        }
        if !self.device.available_queues().contains(queue.mask()) {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "queue {:?} is not available",
                queue
            )));
        }
        let queue_data = &self.queues[queue.index()];
        // Skipped indices become required and pending with no batch; the
        // flush marks them submitted without touching the driver.
        let _ = queue_data
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let skip = mask & !(bits & INDEX_MASK);
                Some(bits | skip | (skip << PENDING_SHIFT))
            });
        Ok(())
    }

    /// Pushes pending batches to the driver in ascending submit index
    /// order.
    ///
    /// Without `force` only the contiguous prefix goes out: a declared but
    /// not yet pending index blocks everything behind it, and the queue
    /// lock is only tried. With `force` the lock is waited on and every
    /// pending batch is submitted, gaps included.
    pub fn flush_queue(&self, queue: QueueType, force: bool) -> Result<(), GraphicsError> {
        let queue_data = &self.queues[queue.index()];

        let guard = if force {
            queue_data.submit_lock.lock()
        } else {
            match queue_data.submit_lock.try_lock() {
                Some(guard) => guard,
                None => return Ok(()),
            }
        };

        loop {
            let bits = queue_data.bits.load(Ordering::Acquire);
            let pending = (bits >> PENDING_SHIFT) & INDEX_MASK;
            let submitted = (bits >> SUBMITTED_SHIFT) & INDEX_MASK;

            let ready = pending & !submitted;
            let to_submit = if force {
                ready
            } else {
                // Everything below the first index that is not yet pending.
                let first_gap = (!pending).trailing_zeros();
                let below_gap = if first_gap as usize >= MAX_PENDING_BATCHES {
                    INDEX_MASK
                } else {
                    (1u64 << first_gap) - 1
                };
                ready & below_gap
            };
            if to_submit == 0 {
                break;
            }

            queue_data
                .bits
                .fetch_or(to_submit << SUBMITTED_SHIFT, Ordering::AcqRel);

            let mut remaining = to_submit;
            while remaining != 0 {
                let index = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;

                let batch = queue_data.pending[index].lock().take();
                let Some(batch) = batch else {
                    // Skipped index.
                    continue;
                };

                let frame = batch.frame_id();
                let submit_result = self
                    .make_signal(&batch)
                    .and_then(|signal| batch.submit_to_device(signal));
                if let Err(err) = submit_result {
                    // This index and everything behind it never reached the
                    // driver; unmark them so end_frame reports the hole, and
                    // return the batch slot to the pool.
                    let bit = 1u64 << index;
                    let unsubmitted = (bit | remaining) << SUBMITTED_SHIFT;
                    queue_data
                        .bits
                        .fetch_and(!(unsubmitted | (bit << PENDING_SHIFT)), Ordering::AcqRel);
                    batch.fail_cancelled();
                    let pool_index = batch.pool_index();
                    drop(batch);
                    self.try_recycle_batch(pool_index, frame);
                    return Err(err);
                }

                let mut submitted_list = self.frames[frame.index()].submitted.lock();
                debug_assert!(submitted_list.len() < MAX_SUBMITTED_BATCHES);
                submitted_list.push(batch);
            }
        }

        drop(guard);
        Ok(())
    }

    /// Force-flushes every queue, verifies all declared indices went out
    /// and closes the frame.
    pub fn end_frame(&self) -> Result<(), GraphicsError> {
        self.transition(SchedulerStatus::RecordFrame, SchedulerStatus::BeginFrame)?;

        let result = self.end_frame_inner();
        self.status
            .store(SchedulerStatus::Idle as u8, Ordering::Release);
        result
    }

    fn end_frame_inner(&self) -> Result<(), GraphicsError> {
        let frame = self.frame.load();
        let mut result = Ok(());

        for queue in QueueType::ALL {
            let queue_data = &self.queues[queue.index()];
            let bits = queue_data.bits.load(Ordering::Acquire);
            let required = bits & INDEX_MASK;
            let pending = (bits >> PENDING_SHIFT) & INDEX_MASK;

            let strict_gap =
                self.desc.end_frame_policy == EndFramePolicy::Strict && required != pending;
            if !strict_gap {
                if let Err(err) = self.flush_queue(queue, true) {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }

            let bits = queue_data.bits.load(Ordering::Acquire);
            let required = bits & INDEX_MASK;
            let pending = (bits >> PENDING_SHIFT) & INDEX_MASK;
            let submitted = (bits >> SUBMITTED_SHIFT) & INDEX_MASK;
            if (required != pending || pending != submitted) && result.is_ok() {
                result = Err(GraphicsError::InvalidState(format!(
                    "frame ended inconsistently on {:?}: required {:#x} pending {:#x} submitted {:#x}",
                    queue, required, pending, submitted
                )));
            }

            // Close out the queue regardless, so later frames start clean.
            // Anything still parked here never reached the driver.
            queue_data.bits.store(0, Ordering::Release);
            for slot in &queue_data.pending {
                if let Some(batch) = slot.lock().take() {
                    batch.fail_cancelled();
                    let index = batch.pool_index();
                    drop(batch);
                    self.try_recycle_batch(index, frame);
                }
            }
        }

        // Reclaim slots of batches that were declared but never handed in.
        // Their callers may still hold references; the retired list catches
        // those.
        for (index, slot) in self.batches.iter().enumerate() {
            if !self.batches.is_acquired(index) {
                continue;
            }
            let status = slot.status();
            if slot.frame_id() == frame
                && (status == BatchStatus::Recording || status == BatchStatus::Recorded)
            {
                slot.fail_cancelled();
                self.try_recycle_batch(index, frame);
            }
        }

        if result.is_ok() {
            log::trace!("Frame {} ended", frame.value());
        }
        result
    }

    /// True once every batch submitted for `frame` has finished on the
    /// GPU. Completed batches are drained, their hooks fired and their
    /// pool slots recycled.
    pub fn is_frame_complete(&self, frame: FrameId) -> bool {
        if !frame.is_valid() || frame.value() > self.frame.load().value() {
            return !frame.is_valid();
        }
        let frame_data = &self.frames[frame.index()];

        {
            let submitted = frame_data.submitted.lock();
            for batch in submitted.iter() {
                match batch.is_complete_on_device() {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(err) => {
                        log::warn!("Completion query failed: {}", err);
                        return false;
                    }
                }
            }
        }

        // Everything finished; drain and recycle.
        let drained: Vec<_> = std::mem::take(&mut *frame_data.submitted.lock());
        for batch in drained {
            batch.mark_completed();
            let index = batch.pool_index();
            drop(batch);
            self.try_recycle_batch(index, frame);
        }
        let draws: Vec<_> = std::mem::take(&mut *frame_data.draw_batches.lock());
        for index in draws {
            self.try_recycle_draw(index);
        }
        true
    }

    /// Flushes every queue and blocks until all in-flight frames complete,
    /// or the timeout elapses.
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            for queue in QueueType::ALL {
                if let Err(err) = self.flush_queue(queue, true) {
                    log::error!("Flush during wait_all failed: {}", err);
                }
            }

            let current = self.frame.load();
            let all_complete = (0..current.max_frames() as u64).all(|back| {
                match current.sub(back) {
                    Some(frame) if frame.is_valid() => self.is_frame_complete(frame),
                    _ => true,
                }
            });
            if all_complete {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Waits for the GPU and destroys every pooled resource. Called from
    /// `Drop` as well; later calls are no-ops.
    pub fn deinitialize(&self) {
        let previous = self
            .status
            .swap(SchedulerStatus::Destroyed as u8, Ordering::AcqRel);
        if previous == SchedulerStatus::Destroyed as u8 {
            return;
        }

        for queue in QueueType::ALL {
            if let Err(err) = self.flush_queue(queue, true) {
                log::error!("Flush during shutdown failed: {}", err);
            }
        }
        if let Err(err) = self.device.wait_idle() {
            log::error!("Device wait_idle failed during shutdown: {}", err);
        }
        if !self.wait_all(Duration::from_secs(5)) {
            log::error!("Scheduler shutdown timed out waiting for the GPU");
        }

        self.sweep_retired();
        self.cmd_pools.destroy_all(self.desc.frames_in_flight);
        self.fences.destroy_all(self.device.as_ref());
        for batch in self.batches.iter() {
            batch.destroy_timeline();
        }
        self.expired.flush_all(self.device.as_ref());
        log::info!("Scheduler destroyed");
    }

    fn make_signal(&self, batch: &CommandBatch) -> Result<CompletionSignal, GraphicsError> {
        if self.use_timeline {
            batch.completion_signal_for_submit().ok_or_else(|| {
                GraphicsError::InvalidState("batch has no timeline semaphore".to_string())
            })
        } else {
            Ok(CompletionSignal::Fence(
                self.fences.acquire(self.device.as_ref())?,
            ))
        }
    }

    /// Recycles a batch slot if no external references remain; otherwise
    /// parks the index for a later sweep.
    fn try_recycle_batch(&self, index: usize, frame: FrameId) {
        let slot = self.batches.get(index);
        if Arc::strong_count(slot) == 1 {
            let (signal, owned) = slot.reset_for_reuse();
            if let Some(CompletionSignal::Fence(fence)) = signal {
                self.fences.recycle(fence);
            }
            for semaphore in owned {
                self.expired.defer(frame, ExpiredResource::Semaphore(semaphore));
            }
            self.batches.release(index);
        } else {
            self.retired_batches.lock().push(index);
        }
    }

    fn try_recycle_draw(&self, index: usize) {
        let slot = self.draw_batches.get(index);
        if Arc::strong_count(slot) == 1 {
            slot.reset_for_reuse();
            self.draw_batches.release(index);
        } else {
            self.retired_draws.lock().push(index);
        }
    }

    /// Retries recycling of batches whose callers still held references at
    /// frame completion.
    fn sweep_retired(&self) {
        let frame = self.frame.load();
        let retired: Vec<_> = std::mem::take(&mut *self.retired_batches.lock());
        for index in retired {
            self.try_recycle_batch(index, frame);
        }
        let retired: Vec<_> = std::mem::take(&mut *self.retired_draws.lock());
        for index in retired {
            self.try_recycle_draw(index);
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
