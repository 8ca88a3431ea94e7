//! Command pool leasing per frame slot and queue.
//!
//! Pools are leased to one thread at a time through an atomic bit per pool.
//! A leased pool serves command buffers until its per-frame budget runs out,
//! then the caller moves on to the next pool or creates one, up to a fixed
//! cap. Pools are reset wholesale when their frame slot is reused.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuCommandBuffer, GpuCommandPool, GpuDevice};
use crate::barrier::{BarrierAccumulator, BufferId, ImageId, ResourceState};
use crate::config::{MAX_CMD_BUFFERS_PER_POOL, MAX_CMD_POOLS_PER_QUEUE};
use crate::draw_batch::RenderPassState;
use crate::error::GraphicsError;
use crate::frame::FrameId;
use crate::queue::QueueType;

pub use crate::backend::CommandBufferKind;

struct PoolEntry {
    pool: Mutex<Option<GpuCommandPool>>,
    /// Buffers allocated from this pool, reused across frames.
    buffers: Mutex<Vec<GpuCommandBuffer>>,
    next_buffer: AtomicU32,
}

struct QueuePools {
    /// Bit `i` set means pool `i` is leased to a thread.
    leased: AtomicU32,
    /// Number of pools created so far. Only grows under `create_lock`.
    created: AtomicU32,
    create_lock: Mutex<()>,
    pools: [PoolEntry; MAX_CMD_POOLS_PER_QUEUE],
}

impl QueuePools {
    fn new() -> Self {
        Self {
            leased: AtomicU32::new(0),
            created: AtomicU32::new(0),
            create_lock: Mutex::new(()),
            pools: std::array::from_fn(|_| PoolEntry {
                pool: Mutex::new(None),
                buffers: Mutex::new(Vec::new()),
                next_buffer: AtomicU32::new(0),
            }),
        }
    }

    fn try_lease(&self, index: usize) -> bool {
        let bit = 1u32 << index;
        self.leased.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    fn unlease(&self, index: usize) {
        let bit = 1u32 << index;
        let prev = self.leased.fetch_and(!bit, Ordering::AcqRel);
        debug_assert!(prev & bit != 0);
    }
}

/// Manages native command pools for every frame slot and queue.
pub struct CommandPoolManager {
    device: Arc<dyn GpuDevice>,
    frames: Vec<[QueuePools; QueueType::COUNT]>,
}

impl CommandPoolManager {
    pub fn new(device: Arc<dyn GpuDevice>, max_frames: usize) -> Self {
        let frames = (0..max_frames)
            .map(|_| std::array::from_fn(|_| QueuePools::new()))
            .collect();
        Self { device, frames }
    }

    /// Leases a pool and allocates a command buffer from it, beginning
    /// recording before returning.
    ///
    /// Secondary buffers inherit `render_state`.
    pub fn get_command_buffer(
        &self,
        frame: FrameId,
        queue: QueueType,
        kind: CommandBufferKind,
        render_state: Option<&RenderPassState>,
    ) -> Result<CommandBufferLease<'_>, GraphicsError> {
        let queue_pools = &self.frames[frame.index()][queue.index()];

        loop {
            let created = queue_pools.created.load(Ordering::Acquire) as usize;
            for index in 0..created {
                if !queue_pools.try_lease(index) {
                    continue;
                }
                match self.take_buffer(queue_pools, index, kind, render_state) {
                    Ok(Some(cmd)) => {
                        return Ok(self.make_lease(frame, queue, index, cmd, kind));
                    }
                    Ok(None) => {
                        // Pool budget exhausted for this frame.
                        queue_pools.unlease(index);
                    }
                    Err(err) => {
                        queue_pools.unlease(index);
                        return Err(err);
                    }
                }
            }

            match self.create_pool(queue_pools, queue)? {
                Some(index) => {
                    match self.take_buffer(queue_pools, index, kind, render_state) {
                        Ok(Some(cmd)) => {
                            return Ok(self.make_lease(frame, queue, index, cmd, kind));
                        }
                        Ok(None) => {
                            queue_pools.unlease(index);
                            return Err(GraphicsError::OutOfCommandBuffers);
                        }
                        Err(err) => {
                            queue_pools.unlease(index);
                            return Err(err);
                        }
                    }
                }
                None => {
                    // All pools exist already; if every one is both leased
                    // and drained there is nothing left to serve.
                    let leased = queue_pools.leased.load(Ordering::Acquire);
                    let full = (1u32 << created) - 1;
                    if leased & full == full {
                        return Err(GraphicsError::OutOfCommandBuffers);
                    }
                    let all_drained = (0..created).all(|i| {
                        queue_pools.pools[i].next_buffer.load(Ordering::Acquire) as usize
                            >= MAX_CMD_BUFFERS_PER_POOL
                    });
                    if all_drained {
                        return Err(GraphicsError::OutOfCommandBuffers);
                    }
                    // A pool was released between the scan and here; retry.
                }
            }
        }
    }

    /// Resets all pools of `frame`'s ring slot for reuse.
    ///
    /// Caller guarantees the slot's previous GPU work has completed.
    pub fn next_frame(&self, frame: FrameId) -> Result<(), GraphicsError> {
        for queue_pools in &self.frames[frame.index()] {
            debug_assert_eq!(
                queue_pools.leased.load(Ordering::Acquire),
                0,
                "pool leased across frame boundary"
            );
            let created = queue_pools.created.load(Ordering::Acquire) as usize;
            for entry in &queue_pools.pools[..created] {
                if let Some(pool) = &*entry.pool.lock() {
                    self.device.reset_command_pool(pool)?;
                }
                entry.next_buffer.store(0, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Destroys all pools of `frame`'s ring slot.
    pub fn release_resources(&self, frame: FrameId) {
        for queue_pools in &self.frames[frame.index()] {
            let created = queue_pools.created.swap(0, Ordering::AcqRel) as usize;
            queue_pools.leased.store(0, Ordering::Release);
            for entry in &queue_pools.pools[..created] {
                entry.buffers.lock().clear();
                entry.next_buffer.store(0, Ordering::Release);
                if let Some(pool) = entry.pool.lock().take() {
                    self.device.destroy_command_pool(pool);
                }
            }
        }
    }

    /// Destroys everything. Caller guarantees the device is idle.
    pub fn destroy_all(&self, max_frames: u32) {
        let mut frame = FrameId::initial(max_frames);
        for _ in 0..max_frames {
            frame = frame.next();
            self.release_resources(frame);
        }
    }

    fn make_lease<'a>(
        &'a self,
        frame: FrameId,
        queue: QueueType,
        pool_index: usize,
        cmd: GpuCommandBuffer,
        kind: CommandBufferKind,
    ) -> CommandBufferLease<'a> {
        CommandBufferLease {
            manager: self,
            frame_index: frame.index(),
            queue,
            pool_index,
            cmd,
            kind,
            ended: false,
            #[cfg(debug_assertions)]
            owner: std::thread::current().id(),
        }
    }

    /// Takes the next buffer from a leased pool, or `None` when the pool's
    /// frame budget is used up. Recording is begun before returning.
    fn take_buffer(
        &self,
        queue_pools: &QueuePools,
        index: usize,
        kind: CommandBufferKind,
        render_state: Option<&RenderPassState>,
    ) -> Result<Option<GpuCommandBuffer>, GraphicsError> {
        let entry = &queue_pools.pools[index];
        let buffer_index = entry.next_buffer.fetch_add(1, Ordering::AcqRel) as usize;
        if buffer_index >= MAX_CMD_BUFFERS_PER_POOL {
            entry.next_buffer.store(MAX_CMD_BUFFERS_PER_POOL as u32, Ordering::Release);
            return Ok(None);
        }

        let cmd = {
            let pool_guard = entry.pool.lock();
            let pool = pool_guard.as_ref().ok_or_else(|| {
                GraphicsError::InvalidState("leased pool was not created".to_string())
            })?;
            let mut buffers = entry.buffers.lock();
            match buffers.get(buffer_index) {
                Some(cmd) => cmd.clone(),
                None => {
                    let cmd = self.device.allocate_command_buffer(pool, kind)?;
                    buffers.push(cmd.clone());
                    cmd
                }
            }
        };

        self.device.begin_command_buffer(&cmd, kind, render_state)?;
        Ok(Some(cmd))
    }

    /// Creates and leases a new pool, or returns `None` when the cap is
    /// already reached.
    fn create_pool(
        &self,
        queue_pools: &QueuePools,
        queue: QueueType,
    ) -> Result<Option<usize>, GraphicsError> {
        let _guard = queue_pools.create_lock.lock();
        let index = queue_pools.created.load(Ordering::Acquire) as usize;
        if index >= MAX_CMD_POOLS_PER_QUEUE {
            return Ok(None);
        }

        let pool = self.device.create_command_pool(queue)?;
        *queue_pools.pools[index].pool.lock() = Some(pool);

        // Lease before publishing so scanners cannot grab the fresh pool.
        let leased = queue_pools.try_lease(index);
        debug_assert!(leased);
        queue_pools
            .created
            .store(index as u32 + 1, Ordering::Release);

        log::trace!("Created command pool {} for {:?}", index, queue);
        Ok(Some(index))
    }
}

/// Exclusive use of one command pool while recording one command buffer.
///
/// Dropping the lease releases the pool; [`CommandBufferLease::end_and_release`]
/// additionally ends recording and hands the buffer back.
pub struct CommandBufferLease<'a> {
    manager: &'a CommandPoolManager,
    frame_index: usize,
    queue: QueueType,
    pool_index: usize,
    cmd: GpuCommandBuffer,
    kind: CommandBufferKind,
    ended: bool,
    #[cfg(debug_assertions)]
    owner: std::thread::ThreadId,
}

impl<'a> CommandBufferLease<'a> {
    pub fn command_buffer(&self) -> &GpuCommandBuffer {
        &self.cmd
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    pub fn kind(&self) -> CommandBufferKind {
        self.kind
    }

    /// Ends recording and returns the finished command buffer. The pool
    /// lease is released when the guard drops.
    pub fn end_and_release(mut self) -> Result<GpuCommandBuffer, GraphicsError> {
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.owner,
            std::thread::current().id(),
            "command buffer lease crossed threads"
        );
        self.manager.device.end_command_buffer(&self.cmd)?;
        self.ended = true;
        Ok(self.cmd.clone())
    }
}

impl fmt::Debug for CommandBufferLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferLease")
            .field("frame_index", &self.frame_index)
            .field("queue", &self.queue)
            .field("pool_index", &self.pool_index)
            .field("kind", &self.kind)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl Drop for CommandBufferLease<'_> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!("Command buffer lease dropped while still recording");
        }
        self.manager.frames[self.frame_index][self.queue.index()].unlease(self.pool_index);
    }
}

/// Records one command buffer: a pool lease plus a barrier accumulator.
///
/// Barrier pushes that overflow the accumulator commit the pending set to
/// the command buffer and retry, keeping the batched-barrier call count low
/// without hidden flushes inside the accumulator itself.
pub struct CommandRecorder<'a> {
    device: Arc<dyn GpuDevice>,
    lease: CommandBufferLease<'a>,
    barriers: BarrierAccumulator,
}

impl<'a> CommandRecorder<'a> {
    pub fn new(device: Arc<dyn GpuDevice>, lease: CommandBufferLease<'a>) -> Self {
        let queue = lease.queue_type();
        let caps = device.queue_caps(queue);
        let family = device.queue_family_index(queue);
        Self {
            device,
            lease,
            barriers: BarrierAccumulator::new(caps, family),
        }
    }

    pub fn command_buffer(&self) -> &GpuCommandBuffer {
        self.lease.command_buffer()
    }

    /// Direct access to the accumulator for callers that manage commits
    /// themselves.
    pub fn barriers(&mut self) -> &mut BarrierAccumulator {
        &mut self.barriers
    }

    /// Writes the accumulated barriers into the command buffer and clears
    /// the accumulator.
    pub fn commit_barriers(&mut self) -> Result<(), GraphicsError> {
        if let Some(set) = self.barriers.get_barriers() {
            self.device
                .cmd_pipeline_barrier(self.lease.command_buffer(), &set)?;
        }
        self.barriers.clear_barriers();
        Ok(())
    }

    pub fn buffer_barrier(
        &mut self,
        buffer: BufferId,
        src: ResourceState,
        dst: ResourceState,
    ) -> Result<(), GraphicsError> {
        if self.barriers.buffer_barrier(buffer, src, dst).is_ok() {
            return Ok(());
        }
        self.commit_barriers()?;
        self.barriers
            .buffer_barrier(buffer, src, dst)
            .map_err(|_| GraphicsError::InvalidState("barrier capacity".to_string()))
    }

    pub fn image_barrier(
        &mut self,
        image: ImageId,
        src: ResourceState,
        dst: ResourceState,
    ) -> Result<(), GraphicsError> {
        if self.barriers.image_barrier(image, src, dst).is_ok() {
            return Ok(());
        }
        self.commit_barriers()?;
        self.barriers
            .image_barrier(image, src, dst)
            .map_err(|_| GraphicsError::InvalidState("barrier capacity".to_string()))
    }

    /// Executes secondary command buffers, committing pending barriers
    /// first so they apply before the nested work.
    pub fn execute_secondaries(
        &mut self,
        secondaries: &[GpuCommandBuffer],
    ) -> Result<(), GraphicsError> {
        self.commit_barriers()?;
        self.device
            .cmd_execute_commands(self.lease.command_buffer(), secondaries)
    }

    /// Commits pending barriers, ends recording and returns the buffer.
    pub fn finish(mut self) -> Result<GpuCommandBuffer, GraphicsError> {
        self.commit_barriers()?;
        self.lease.end_and_release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::config::MAX_CMD_POOLS_PER_QUEUE;

    fn manager() -> (Arc<DummyDevice>, CommandPoolManager) {
        let device = Arc::new(DummyDevice::new());
        let manager = CommandPoolManager::new(device.clone(), 2);
        (device, manager)
    }

    fn frame1() -> FrameId {
        FrameId::initial(2).next()
    }

    #[test]
    fn test_lease_and_release() {
        let (_device, manager) = manager();
        let lease = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        let cmd = lease.end_and_release().unwrap();
        assert!(matches!(cmd, GpuCommandBuffer::Dummy { .. }));

        // Pool is free again.
        let lease2 = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        lease2.end_and_release().unwrap();
    }

    #[test]
    fn test_concurrent_leases_use_distinct_pools() {
        let (_device, manager) = manager();
        let a = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        let b = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        assert_ne!(a.pool_index, b.pool_index);
        a.end_and_release().unwrap();
        b.end_and_release().unwrap();
    }

    #[test]
    fn test_pool_exhaustion() {
        let (_device, manager) = manager();
        // Hold a lease on every possible pool.
        let leases: Vec<_> = (0..MAX_CMD_POOLS_PER_QUEUE)
            .map(|_| {
                manager
                    .get_command_buffer(
                        frame1(),
                        QueueType::Graphics,
                        CommandBufferKind::Primary,
                        None,
                    )
                    .unwrap()
            })
            .collect();

        let err = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap_err();
        assert_eq!(err, GraphicsError::OutOfCommandBuffers);
        drop(leases);
    }

    #[test]
    fn test_lease_debug_output() {
        let (_device, manager) = manager();
        let lease = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        let text = format!("{:?}", lease);
        assert!(text.contains("CommandBufferLease"));
        assert!(text.contains("Graphics"));
        lease.end_and_release().unwrap();
    }

    #[test]
    fn test_next_frame_resets_budget() {
        let (_device, manager) = manager();
        let frame = frame1();
        for _ in 0..MAX_CMD_BUFFERS_PER_POOL {
            let lease = manager
                .get_command_buffer(frame, QueueType::Graphics, CommandBufferKind::Primary, None)
                .unwrap();
            lease.end_and_release().unwrap();
        }

        // Third frame reuses slot of frame 1.
        let same_slot = frame.next().next();
        manager.next_frame(same_slot).unwrap();
        let lease = manager
            .get_command_buffer(same_slot, QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        // Budget restarted, so the first pool serves again.
        assert_eq!(lease.pool_index, 0);
        lease.end_and_release().unwrap();
    }

    #[test]
    fn test_release_resources_destroys_pools() {
        let (device, manager) = manager();
        let lease = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        lease.end_and_release().unwrap();

        manager.release_resources(frame1());
        assert_eq!(device.destroyed_count(), 1);
    }

    #[test]
    fn test_recorder_commits_on_overflow() {
        let (device, manager) = manager();
        let lease = manager
            .get_command_buffer(frame1(), QueueType::Graphics, CommandBufferKind::Primary, None)
            .unwrap();
        let mut recorder = CommandRecorder::new(device.clone(), lease);

        for i in 0..crate::config::MAX_BARRIERS + 1 {
            recorder
                .buffer_barrier(
                    BufferId(i as u64),
                    ResourceState::CopyDst,
                    ResourceState::ShaderStorageRead,
                )
                .unwrap();
        }
        // One commit happened when the accumulator overflowed.
        assert_eq!(device.barrier_call_count(), 1);

        recorder.finish().unwrap();
        assert_eq!(device.barrier_call_count(), 2);
    }
}
