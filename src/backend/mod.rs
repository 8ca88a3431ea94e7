//! GPU backend abstraction.
//!
//! The scheduler talks to the device exclusively through [`GpuDevice`].
//! Handle types are enums with one variant per backend, so the scheduler
//! core stays free of backend-specific types.

#[cfg(feature = "dummy")]
use std::sync::atomic::AtomicBool;
#[cfg(feature = "dummy")]
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use crate::barrier::{BarrierSet, StageMask};
use crate::draw_batch::RenderPassState;
use crate::error::GraphicsError;
use crate::expired::ExpiredResource;
use crate::queue::{QueueCaps, QueueMask, QueueType};

/// Primary or secondary command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferKind {
    Primary,
    Secondary,
}

/// Backend fence handle.
#[derive(Debug, Clone)]
pub enum GpuFence {
    /// Signal state shared with the dummy device's submission log.
    #[cfg(feature = "dummy")]
    Dummy(Arc<AtomicBool>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(ash::vk::Fence),
}

/// Backend semaphore handle, binary or timeline.
#[derive(Debug, Clone)]
pub enum GpuSemaphore {
    #[cfg(feature = "dummy")]
    Dummy(dummy::DummySemaphore),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(ash::vk::Semaphore),
}

/// Backend command pool handle.
#[derive(Debug, Clone)]
pub enum GpuCommandPool {
    #[cfg(feature = "dummy")]
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan(ash::vk::CommandPool),
}

/// Backend command buffer handle.
#[derive(Debug, Clone)]
pub enum GpuCommandBuffer {
    #[cfg(feature = "dummy")]
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan(ash::vk::CommandBuffer),
}

/// One semaphore wait of a submission. `value` is ignored for binary
/// semaphores.
#[derive(Debug, Clone)]
pub struct SemaphoreWait {
    pub semaphore: GpuSemaphore,
    pub value: u64,
    pub stages: StageMask,
}

/// One semaphore signal of a submission. `value` is ignored for binary
/// semaphores.
#[derive(Debug, Clone)]
pub struct SemaphoreSignal {
    pub semaphore: GpuSemaphore,
    pub value: u64,
}

/// A single queue submission.
pub struct SubmitRequest<'a> {
    pub command_buffers: &'a [GpuCommandBuffer],
    pub waits: &'a [SemaphoreWait],
    pub signals: &'a [SemaphoreSignal],
    pub fence: Option<&'a GpuFence>,
    pub debug_name: &'a str,
}

/// Trait implemented by graphics backends.
///
/// All methods take `&self`; implementations are internally synchronized.
/// The scheduler additionally serializes `submit` per queue.
pub trait GpuDevice: Send + Sync {
    fn name(&self) -> &str;

    fn available_queues(&self) -> QueueMask;
    fn queue_caps(&self, queue: QueueType) -> QueueCaps;
    /// Queue family index used for ownership transfer barriers.
    fn queue_family_index(&self, queue: QueueType) -> u32;
    /// True when timeline semaphores are usable for batch completion.
    fn supports_timeline(&self) -> bool;

    // Fences
    fn create_fence(&self) -> Result<GpuFence, GraphicsError>;
    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;
    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError>;
    /// Returns `true` if the fence signaled before the timeout.
    fn wait_fence(&self, fence: &GpuFence, timeout: Duration) -> Result<bool, GraphicsError>;
    fn destroy_fence(&self, fence: GpuFence);

    // Semaphores
    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError>;
    fn create_timeline_semaphore(&self, initial: u64) -> Result<GpuSemaphore, GraphicsError>;
    fn timeline_value(&self, semaphore: &GpuSemaphore) -> Result<u64, GraphicsError>;
    /// Returns `true` if the timeline reached `value` before the timeout.
    fn wait_timeline(
        &self,
        semaphore: &GpuSemaphore,
        value: u64,
        timeout: Duration,
    ) -> Result<bool, GraphicsError>;
    fn destroy_semaphore(&self, semaphore: GpuSemaphore);

    // Command pools and buffers
    fn create_command_pool(&self, queue: QueueType) -> Result<GpuCommandPool, GraphicsError>;
    fn reset_command_pool(&self, pool: &GpuCommandPool) -> Result<(), GraphicsError>;
    fn destroy_command_pool(&self, pool: GpuCommandPool);
    fn allocate_command_buffer(
        &self,
        pool: &GpuCommandPool,
        kind: CommandBufferKind,
    ) -> Result<GpuCommandBuffer, GraphicsError>;
    fn begin_command_buffer(
        &self,
        cmd: &GpuCommandBuffer,
        kind: CommandBufferKind,
        inherit: Option<&RenderPassState>,
    ) -> Result<(), GraphicsError>;
    fn end_command_buffer(&self, cmd: &GpuCommandBuffer) -> Result<(), GraphicsError>;

    // Recording
    fn cmd_pipeline_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        barriers: &BarrierSet<'_>,
    ) -> Result<(), GraphicsError>;
    fn cmd_execute_commands(
        &self,
        primary: &GpuCommandBuffer,
        secondaries: &[GpuCommandBuffer],
    ) -> Result<(), GraphicsError>;

    // Submission
    fn submit(&self, queue: QueueType, request: SubmitRequest<'_>) -> Result<(), GraphicsError>;
    fn wait_idle(&self) -> Result<(), GraphicsError>;

    /// Destroys a resource whose frame is confirmed complete.
    fn destroy_expired(&self, resource: ExpiredResource);
}
