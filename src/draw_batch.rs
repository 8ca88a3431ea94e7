//! Draw command batches for parallel render pass recording.
//!
//! Several threads record secondary command buffers for the same render
//! pass; each claims a draw index up front so the final execution order is
//! deterministic regardless of which thread finishes first. A cancelled
//! index leaves a gap that is never reassigned.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::backend::GpuCommandBuffer;
use crate::config::MAX_DRAWS_PER_BATCH;
use crate::error::GraphicsError;
use crate::frame::{AtomicFrameId, FrameId};

/// Render pass configuration a secondary command buffer inherits.
///
/// Two batches with equal state can share recorded secondaries; the
/// scheduler checks this on reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassState {
    /// Backend render pass or pipeline-compatibility identifier.
    pub pass_id: u64,
    pub subpass: u32,
}

impl RenderPassState {
    pub fn matches(&self, other: &RenderPassState) -> bool {
        self == other
    }
}

const DRAWS_LOCKED: u32 = 1 << 31;

/// Collects secondary command buffers for one render pass.
pub struct DrawCommandBatch {
    pool_index: usize,
    frame: AtomicFrameId,
    state: Mutex<Option<RenderPassState>>,
    debug_name: Mutex<String>,
    /// Low bits count allocated draw indices, the high bit freezes them.
    draw_count: AtomicU32,
    slots: [Mutex<Option<GpuCommandBuffer>>; MAX_DRAWS_PER_BATCH],
}

impl DrawCommandBatch {
    pub(crate) fn new(pool_index: usize, max_frames: u32) -> Self {
        Self {
            pool_index,
            frame: AtomicFrameId::new(FrameId::initial(max_frames)),
            state: Mutex::new(None),
            debug_name: Mutex::new(String::new()),
            draw_count: AtomicU32::new(0),
            slots: std::array::from_fn(|_| Mutex::new(None)),
        }
    }

    pub(crate) fn init(&self, frame: FrameId, state: RenderPassState, debug_name: &str) {
        self.frame.store(frame);
        *self.state.lock() = Some(state);
        *self.debug_name.lock() = debug_name.to_string();
        log::trace!("Draw batch {} acquired ({})", self.pool_index, debug_name);
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame.load()
    }

    pub fn debug_name(&self) -> String {
        self.debug_name.lock().clone()
    }

    /// The render pass state secondaries must inherit.
    pub fn render_state(&self) -> Option<RenderPassState> {
        *self.state.lock()
    }

    /// True when this batch records for the given pass configuration.
    pub fn matches_state(&self, state: &RenderPassState) -> bool {
        self.state.lock().map(|s| s.matches(state)).unwrap_or(false)
    }

    /// Claims the next draw position. Indices are monotonic within one use
    /// of the batch and never reassigned, even after `cancel`.
    pub fn alloc_draw_index(&self) -> Result<usize, GraphicsError> {
        let result = self
            .draw_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current & DRAWS_LOCKED != 0 {
                    return None;
                }
                if current as usize >= MAX_DRAWS_PER_BATCH {
                    return None;
                }
                Some(current + 1)
            });
        match result {
            Ok(previous) => Ok(previous as usize),
            Err(current) if current & DRAWS_LOCKED != 0 => Err(GraphicsError::InvalidState(
                "draw batch is no longer recording".to_string(),
            )),
            Err(_) => Err(GraphicsError::OutOfCommandBuffers),
        }
    }

    /// Stores the secondary command buffer recorded for a claimed index.
    pub fn set_commands(&self, index: usize, cmd: GpuCommandBuffer) {
        debug_assert!(index < self.draw_count());
        *self.slots[index].lock() = Some(cmd);
    }

    /// Abandons a claimed index. Its slot stays empty and the index is not
    /// handed out again.
    pub fn cancel(&self, index: usize) {
        debug_assert!(index < self.draw_count());
        *self.slots[index].lock() = None;
    }

    pub fn draw_count(&self) -> usize {
        (self.draw_count.load(Ordering::Acquire) & !DRAWS_LOCKED) as usize
    }

    fn lock_allocation(&self) {
        self.draw_count.fetch_or(DRAWS_LOCKED, Ordering::AcqRel);
    }

    /// All recorded secondaries in draw index order; cancelled indices are
    /// absent. Gathering freezes index allocation until the batch is
    /// recycled.
    pub fn cmd_buffers(&self) -> Vec<GpuCommandBuffer> {
        self.lock_allocation();
        let count = self.draw_count();
        let mut commands = Vec::with_capacity(count);
        for slot in &self.slots[..count] {
            if let Some(cmd) = &*slot.lock() {
                commands.push(cmd.clone());
            }
        }
        commands
    }

    pub(crate) fn reset_for_reuse(&self) {
        for slot in &self.slots[..self.draw_count()] {
            *slot.lock() = None;
        }
        *self.state.lock() = None;
        self.debug_name.lock().clear();
        self.draw_count.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::backend::{CommandBufferKind, GpuDevice};
    use crate::queue::QueueType;
    use std::sync::Arc;

    fn cmd(device: &DummyDevice) -> GpuCommandBuffer {
        let pool = device.create_command_pool(QueueType::Graphics).unwrap();
        device
            .allocate_command_buffer(&pool, CommandBufferKind::Secondary)
            .unwrap()
    }

    fn cmd_id(cmd: &GpuCommandBuffer) -> u64 {
        match cmd {
            GpuCommandBuffer::Dummy { id } => *id,
            #[allow(unreachable_patterns)]
            _ => panic!("expected dummy handle"),
        }
    }

    fn draw_batch() -> DrawCommandBatch {
        let batch = DrawCommandBatch::new(0, 2);
        batch.init(
            FrameId::initial(2).next(),
            RenderPassState {
                pass_id: 1,
                subpass: 0,
            },
            "shadow pass",
        );
        batch
    }

    #[test]
    fn test_indices_monotonic() {
        let batch = draw_batch();
        assert_eq!(batch.alloc_draw_index().unwrap(), 0);
        assert_eq!(batch.alloc_draw_index().unwrap(), 1);
        assert_eq!(batch.alloc_draw_index().unwrap(), 2);
    }

    #[test]
    fn test_gather_in_index_order() {
        let device = DummyDevice::new();
        let batch = draw_batch();
        let i0 = batch.alloc_draw_index().unwrap();
        let i1 = batch.alloc_draw_index().unwrap();
        let i2 = batch.alloc_draw_index().unwrap();

        // Filled out of order.
        let c2 = cmd(&device);
        let c0 = cmd(&device);
        let c1 = cmd(&device);
        batch.set_commands(i2, c2.clone());
        batch.set_commands(i0, c0.clone());
        batch.set_commands(i1, c1.clone());

        let gathered = batch.cmd_buffers();
        let ids: Vec<_> = gathered.iter().map(cmd_id).collect();
        assert_eq!(ids, vec![cmd_id(&c0), cmd_id(&c1), cmd_id(&c2)]);
    }

    #[test]
    fn test_cancelled_index_absent_not_reused() {
        let device = DummyDevice::new();
        let batch = draw_batch();
        let i0 = batch.alloc_draw_index().unwrap();
        let i1 = batch.alloc_draw_index().unwrap();
        batch.set_commands(i0, cmd(&device));
        batch.cancel(i1);

        // The cancelled index is not handed out again.
        assert_eq!(batch.alloc_draw_index().unwrap(), 2);

        let gathered = batch.cmd_buffers();
        assert_eq!(gathered.len(), 1);
        assert_eq!(batch.draw_count(), 3);
    }

    #[test]
    fn test_gather_freezes_allocation() {
        let device = DummyDevice::new();
        let batch = draw_batch();
        let i0 = batch.alloc_draw_index().unwrap();
        batch.set_commands(i0, cmd(&device));

        assert_eq!(batch.cmd_buffers().len(), 1);
        let err = batch.alloc_draw_index().unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidState(_)));
    }

    #[test]
    fn test_state_matching() {
        let batch = draw_batch();
        assert!(batch.matches_state(&RenderPassState {
            pass_id: 1,
            subpass: 0
        }));
        assert!(!batch.matches_state(&RenderPassState {
            pass_id: 2,
            subpass: 0
        }));
    }

    #[test]
    fn test_concurrent_index_allocation() {
        let batch = Arc::new(draw_batch());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let batch = Arc::clone(&batch);
            handles.push(std::thread::spawn(move || {
                (0..8)
                    .map(|_| batch.alloc_draw_index().unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<usize> = (0..32).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_reset_clears_state() {
        let device = DummyDevice::new();
        let batch = draw_batch();
        let i0 = batch.alloc_draw_index().unwrap();
        batch.set_commands(i0, cmd(&device));
        batch.lock_allocation();

        batch.reset_for_reuse();
        assert_eq!(batch.draw_count(), 0);
        assert!(batch.render_state().is_none());
        assert_eq!(batch.alloc_draw_index().unwrap(), 0);
    }
}
