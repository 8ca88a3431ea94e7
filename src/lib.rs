//! # frameflow
//!
//! Frame-pipelined GPU command batch scheduler.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderScheduler`] - Frame loop, per-queue submission ordering and recycling
//! - [`CommandBatch`] / [`DrawCommandBatch`] - Pooled units of recorded GPU work
//! - [`CommandPoolManager`] - Lock-free command pool leasing per frame slot
//! - [`BarrierAccumulator`] - Batched pipeline barriers with explicit overflow handling
//! - [`GpuDevice`] - Backend trait with Vulkan and Dummy (for testing) implementations
//!
//! ## Example
//!
//! ```ignore
//! use frameflow::{RenderScheduler, SchedulerDesc, SubmitMode, QueueType};
//!
//! let scheduler = RenderScheduler::new(device, SchedulerDesc::default())?;
//! let frame = scheduler.begin_frame()?;
//! let batch = scheduler.begin_cmd_batch(QueueType::Graphics, 0, "main pass")?;
//! // Record command buffers into the batch...
//! scheduler.submit(&batch, SubmitMode::Deferred)?;
//! scheduler.end_frame()?;
//! ```

pub mod backend;
pub mod barrier;
pub mod batch;
pub mod command_pool;
pub mod config;
pub mod draw_batch;
pub mod error;
pub mod expired;
pub mod frame;
pub mod queue;
pub mod scheduler;
pub mod slots;
pub mod sync;

// Re-export main types for convenience
pub use backend::{
    GpuCommandBuffer, GpuCommandPool, GpuDevice, GpuFence, GpuSemaphore, SemaphoreSignal,
    SemaphoreWait, SubmitRequest,
};
#[cfg(feature = "dummy")]
pub use backend::dummy::DummyDevice;
#[cfg(feature = "vulkan-backend")]
pub use backend::vulkan::VulkanDevice;
pub use barrier::{
    AccessMask, BarrierAccumulator, BarrierOverflow, BarrierSet, BufferId, ImageId, ImageLayout,
    ImageSubrange, ResourceState, StageMask,
};
pub use batch::{BatchOutcome, BatchStatus, CommandBatch};
pub use command_pool::{CommandBufferKind, CommandBufferLease, CommandPoolManager, CommandRecorder};
pub use draw_batch::{DrawCommandBatch, RenderPassState};
pub use error::GraphicsError;
pub use expired::ExpiredResource;
pub use frame::FrameId;
pub use queue::{QueueCaps, QueueMask, QueueType};
pub use scheduler::{EndFramePolicy, RenderScheduler, SchedulerDesc, SubmitMode};
pub use sync::CompletionSignal;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
