//! Pipeline barrier accumulation.
//!
//! Barriers are accumulated into fixed-capacity arrays and committed as one
//! batched call per flush point. Every push returns a [`BarrierOverflow`]
//! signal when its array is full; the recording context commits the
//! accumulated set and retries instead of the accumulator flushing itself.

use bitflags::bitflags;

use crate::config::MAX_BARRIERS;
use crate::queue::QueueCaps;

bitflags! {
    /// Backend-neutral pipeline stage mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageMask: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const HOST = 1 << 10;
        const BOTTOM_OF_PIPE = 1 << 11;
    }
}

bitflags! {
    /// Backend-neutral memory access mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_READ = 1 << 6;
        const COLOR_ATTACHMENT_WRITE = 1 << 7;
        const DEPTH_STENCIL_READ = 1 << 8;
        const DEPTH_STENCIL_WRITE = 1 << 9;
        const TRANSFER_READ = 1 << 10;
        const TRANSFER_WRITE = 1 << 11;
        const HOST_READ = 1 << 12;
        const HOST_WRITE = 1 << 13;
        const MEMORY_READ = 1 << 14;
        const MEMORY_WRITE = 1 << 15;
    }
}

/// Backend-neutral image layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Logical usage state of a resource, mapped to stage, access and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Undefined,
    General,
    CopySrc,
    CopyDst,
    VertexBuffer,
    IndexBuffer,
    IndirectBuffer,
    UniformBuffer,
    ShaderStorageRead,
    ShaderStorageWrite,
    ShaderSample,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilRead,
    Host,
    Present,
}

impl ResourceState {
    /// Stage and access masks for this state, before queue capability
    /// intersection.
    pub fn masks(self) -> (StageMask, AccessMask) {
        match self {
            ResourceState::Undefined => (StageMask::TOP_OF_PIPE, AccessMask::empty()),
            ResourceState::General => (
                StageMask::all(),
                AccessMask::MEMORY_READ | AccessMask::MEMORY_WRITE,
            ),
            ResourceState::CopySrc => (StageMask::TRANSFER, AccessMask::TRANSFER_READ),
            ResourceState::CopyDst => (StageMask::TRANSFER, AccessMask::TRANSFER_WRITE),
            ResourceState::VertexBuffer => {
                (StageMask::VERTEX_INPUT, AccessMask::VERTEX_ATTRIBUTE_READ)
            }
            ResourceState::IndexBuffer => (StageMask::VERTEX_INPUT, AccessMask::INDEX_READ),
            ResourceState::IndirectBuffer => {
                (StageMask::DRAW_INDIRECT, AccessMask::INDIRECT_COMMAND_READ)
            }
            ResourceState::UniformBuffer => (
                StageMask::VERTEX_SHADER | StageMask::FRAGMENT_SHADER | StageMask::COMPUTE_SHADER,
                AccessMask::UNIFORM_READ,
            ),
            ResourceState::ShaderStorageRead => (
                StageMask::VERTEX_SHADER | StageMask::FRAGMENT_SHADER | StageMask::COMPUTE_SHADER,
                AccessMask::SHADER_READ,
            ),
            ResourceState::ShaderStorageWrite => (
                StageMask::VERTEX_SHADER | StageMask::FRAGMENT_SHADER | StageMask::COMPUTE_SHADER,
                AccessMask::SHADER_READ | AccessMask::SHADER_WRITE,
            ),
            ResourceState::ShaderSample => (
                StageMask::FRAGMENT_SHADER | StageMask::COMPUTE_SHADER,
                AccessMask::SHADER_READ,
            ),
            ResourceState::ColorAttachment => (
                StageMask::COLOR_ATTACHMENT_OUTPUT,
                AccessMask::COLOR_ATTACHMENT_READ | AccessMask::COLOR_ATTACHMENT_WRITE,
            ),
            ResourceState::DepthStencilAttachment => (
                StageMask::EARLY_FRAGMENT_TESTS | StageMask::LATE_FRAGMENT_TESTS,
                AccessMask::DEPTH_STENCIL_READ | AccessMask::DEPTH_STENCIL_WRITE,
            ),
            ResourceState::DepthStencilRead => (
                StageMask::EARLY_FRAGMENT_TESTS
                    | StageMask::LATE_FRAGMENT_TESTS
                    | StageMask::FRAGMENT_SHADER,
                AccessMask::DEPTH_STENCIL_READ,
            ),
            ResourceState::Host => (
                StageMask::HOST,
                AccessMask::HOST_READ | AccessMask::HOST_WRITE,
            ),
            ResourceState::Present => (StageMask::BOTTOM_OF_PIPE, AccessMask::empty()),
        }
    }

    /// Image layout implied by this state.
    pub fn layout(self) -> ImageLayout {
        match self {
            ResourceState::Undefined => ImageLayout::Undefined,
            ResourceState::CopySrc => ImageLayout::TransferSrc,
            ResourceState::CopyDst => ImageLayout::TransferDst,
            ResourceState::ShaderSample => ImageLayout::ShaderReadOnly,
            ResourceState::ColorAttachment => ImageLayout::ColorAttachment,
            ResourceState::DepthStencilAttachment => ImageLayout::DepthStencilAttachment,
            ResourceState::DepthStencilRead => ImageLayout::DepthStencilReadOnly,
            ResourceState::Present => ImageLayout::Present,
            _ => ImageLayout::General,
        }
    }

    fn masks_for(self, caps: &QueueCaps) -> (StageMask, AccessMask) {
        let (stages, access) = self.masks();
        let stages = stages & caps.supported_stages;
        let access = access & caps.supported_access;
        // A fully filtered stage mask still needs a valid execution point.
        let stages = if stages.is_empty() {
            StageMask::TOP_OF_PIPE
        } else {
            stages
        };
        (stages, access)
    }
}

/// Raw backend buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Raw backend image handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);

/// Mip/layer window of an image barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubrange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageSubrange {
    pub fn whole() -> Self {
        Self {
            base_mip: 0,
            mip_count: u32::MAX,
            base_layer: 0,
            layer_count: u32::MAX,
        }
    }
}

/// Ignore-ownership marker for queue family indices.
pub const QUEUE_FAMILY_IGNORED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferId,
    pub src_stages: StageMask,
    pub src_access: AccessMask,
    pub dst_stages: StageMask,
    pub dst_access: AccessMask,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageId,
    pub subrange: ImageSubrange,
    pub src_stages: StageMask,
    pub src_access: AccessMask,
    pub dst_stages: StageMask,
    pub dst_access: AccessMask,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stages: StageMask,
    pub src_access: AccessMask,
    pub dst_stages: StageMask,
    pub dst_access: AccessMask,
}

/// Borrowed view of everything accumulated so far.
#[derive(Debug, Clone, Copy)]
pub struct BarrierSet<'a> {
    pub src_stages: StageMask,
    pub dst_stages: StageMask,
    pub memory: Option<MemoryBarrier>,
    pub buffers: &'a [BufferBarrier],
    pub images: &'a [ImageBarrier],
}

/// A fixed-capacity barrier array is full; commit the accumulated set first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierOverflow;

/// Accumulates barriers for one recording context.
///
/// Not shared between threads; each recorder owns one.
pub struct BarrierAccumulator {
    caps: QueueCaps,
    queue_family: u32,
    src_stages: StageMask,
    dst_stages: StageMask,
    memory: Option<MemoryBarrier>,
    buffers: Vec<BufferBarrier>,
    images: Vec<ImageBarrier>,
}

impl BarrierAccumulator {
    /// `queue_family` is the recording queue's family index, used as the
    /// local half of ownership transfers.
    pub fn new(caps: QueueCaps, queue_family: u32) -> Self {
        Self {
            caps,
            queue_family,
            src_stages: StageMask::empty(),
            dst_stages: StageMask::empty(),
            memory: None,
            buffers: Vec::with_capacity(MAX_BARRIERS),
            images: Vec::with_capacity(MAX_BARRIERS),
        }
    }

    pub fn no_pending_barriers(&self) -> bool {
        self.memory.is_none()
            && self.buffers.is_empty()
            && self.images.is_empty()
            && self.src_stages.is_empty()
            && self.dst_stages.is_empty()
    }

    /// The accumulated set, or `None` when nothing is pending. Repeated
    /// calls return the same set; nothing is duplicated or consumed.
    pub fn get_barriers(&self) -> Option<BarrierSet<'_>> {
        if self.no_pending_barriers() {
            return None;
        }
        Some(BarrierSet {
            src_stages: self.src_stages,
            dst_stages: self.dst_stages,
            memory: self.memory,
            buffers: &self.buffers,
            images: &self.images,
        })
    }

    /// Drops everything accumulated without committing it.
    pub fn clear_barriers(&mut self) {
        self.src_stages = StageMask::empty();
        self.dst_stages = StageMask::empty();
        self.memory = None;
        self.buffers.clear();
        self.images.clear();
    }

    /// Execution-only dependency between two resource states.
    pub fn execution_barrier(&mut self, src: ResourceState, dst: ResourceState) {
        let (src_stages, _) = src.masks_for(&self.caps);
        let (dst_stages, _) = dst.masks_for(&self.caps);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
    }

    /// Global memory barrier between two resource states. Merges into the
    /// single accumulated memory barrier.
    pub fn memory_barrier(&mut self, src: ResourceState, dst: ResourceState) {
        let (src_stages, src_access) = src.masks_for(&self.caps);
        let (dst_stages, dst_access) = dst.masks_for(&self.caps);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
        let merged = match self.memory {
            Some(m) => MemoryBarrier {
                src_stages: m.src_stages | src_stages,
                src_access: m.src_access | src_access,
                dst_stages: m.dst_stages | dst_stages,
                dst_access: m.dst_access | dst_access,
            },
            None => MemoryBarrier {
                src_stages,
                src_access,
                dst_stages,
                dst_access,
            },
        };
        self.memory = Some(merged);
    }

    /// Full memory barrier over everything the queue supports.
    pub fn memory_barrier_all(&mut self) {
        self.memory_barrier(ResourceState::General, ResourceState::General);
    }

    pub fn buffer_barrier(
        &mut self,
        buffer: BufferId,
        src: ResourceState,
        dst: ResourceState,
    ) -> Result<(), BarrierOverflow> {
        self.push_buffer(buffer, src, dst, QUEUE_FAMILY_IGNORED, QUEUE_FAMILY_IGNORED)
    }

    pub fn image_barrier(
        &mut self,
        image: ImageId,
        src: ResourceState,
        dst: ResourceState,
    ) -> Result<(), BarrierOverflow> {
        self.image_barrier_range(image, ImageSubrange::whole(), src, dst)
    }

    pub fn image_barrier_range(
        &mut self,
        image: ImageId,
        subrange: ImageSubrange,
        src: ResourceState,
        dst: ResourceState,
    ) -> Result<(), BarrierOverflow> {
        self.push_image(
            image,
            subrange,
            src,
            dst,
            QUEUE_FAMILY_IGNORED,
            QUEUE_FAMILY_IGNORED,
        )
    }

    /// Release half of a buffer ownership transfer to `dst_queue_family`.
    /// The matching acquire on the destination queue is the caller's
    /// responsibility; pairing is not validated here.
    pub fn release_buffer_ownership(
        &mut self,
        buffer: BufferId,
        src: ResourceState,
        dst_queue_family: u32,
    ) -> Result<(), BarrierOverflow> {
        self.push_buffer(
            buffer,
            src,
            ResourceState::Undefined,
            self.queue_family,
            dst_queue_family,
        )
    }

    /// Acquire half of a buffer ownership transfer from `src_queue_family`.
    pub fn acquire_buffer_ownership(
        &mut self,
        buffer: BufferId,
        src_queue_family: u32,
        dst: ResourceState,
    ) -> Result<(), BarrierOverflow> {
        self.push_buffer(
            buffer,
            ResourceState::Undefined,
            dst,
            src_queue_family,
            self.queue_family,
        )
    }

    /// Release half of an image ownership transfer to `dst_queue_family`.
    pub fn release_image_ownership(
        &mut self,
        image: ImageId,
        src: ResourceState,
        dst_queue_family: u32,
    ) -> Result<(), BarrierOverflow> {
        self.push_image(
            image,
            ImageSubrange::whole(),
            src,
            src,
            self.queue_family,
            dst_queue_family,
        )
    }

    /// Acquire half of an image ownership transfer from `src_queue_family`.
    pub fn acquire_image_ownership(
        &mut self,
        image: ImageId,
        src_queue_family: u32,
        dst: ResourceState,
    ) -> Result<(), BarrierOverflow> {
        self.push_image(
            image,
            ImageSubrange::whole(),
            dst,
            dst,
            src_queue_family,
            self.queue_family,
        )
    }

    /// Merges another accumulator's pending barriers into this one.
    pub fn merge(&mut self, other: &BarrierAccumulator) -> Result<(), BarrierOverflow> {
        if self.buffers.len() + other.buffers.len() > MAX_BARRIERS
            || self.images.len() + other.images.len() > MAX_BARRIERS
        {
            return Err(BarrierOverflow);
        }
        self.src_stages |= other.src_stages;
        self.dst_stages |= other.dst_stages;
        if let Some(m) = other.memory {
            let merged = match self.memory {
                Some(cur) => MemoryBarrier {
                    src_stages: cur.src_stages | m.src_stages,
                    src_access: cur.src_access | m.src_access,
                    dst_stages: cur.dst_stages | m.dst_stages,
                    dst_access: cur.dst_access | m.dst_access,
                },
                None => m,
            };
            self.memory = Some(merged);
        }
        self.buffers.extend_from_slice(&other.buffers);
        self.images.extend_from_slice(&other.images);
        Ok(())
    }

    fn push_buffer(
        &mut self,
        buffer: BufferId,
        src: ResourceState,
        dst: ResourceState,
        src_queue_family: u32,
        dst_queue_family: u32,
    ) -> Result<(), BarrierOverflow> {
        if self.buffers.len() >= MAX_BARRIERS {
            return Err(BarrierOverflow);
        }
        let (src_stages, src_access) = src.masks_for(&self.caps);
        let (dst_stages, dst_access) = dst.masks_for(&self.caps);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
        self.buffers.push(BufferBarrier {
            buffer,
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            src_queue_family,
            dst_queue_family,
        });
        Ok(())
    }

    fn push_image(
        &mut self,
        image: ImageId,
        subrange: ImageSubrange,
        src: ResourceState,
        dst: ResourceState,
        src_queue_family: u32,
        dst_queue_family: u32,
    ) -> Result<(), BarrierOverflow> {
        if self.images.len() >= MAX_BARRIERS {
            return Err(BarrierOverflow);
        }
        let (src_stages, src_access) = src.masks_for(&self.caps);
        let (dst_stages, dst_access) = dst.masks_for(&self.caps);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
        self.images.push(ImageBarrier {
            image,
            subrange,
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            old_layout: src.layout(),
            new_layout: dst.layout(),
            src_queue_family,
            dst_queue_family,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphics_acc() -> BarrierAccumulator {
        BarrierAccumulator::new(QueueCaps::graphics(), 0)
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = graphics_acc();
        assert!(acc.no_pending_barriers());
        assert!(acc.get_barriers().is_none());
    }

    #[test]
    fn test_get_barriers_stable() {
        let mut acc = graphics_acc();
        acc.buffer_barrier(BufferId(1), ResourceState::CopyDst, ResourceState::VertexBuffer)
            .unwrap();

        let first_len = acc.get_barriers().unwrap().buffers.len();
        let second_len = acc.get_barriers().unwrap().buffers.len();
        assert_eq!(first_len, 1);
        assert_eq!(second_len, 1);
    }

    #[test]
    fn test_clear_barriers() {
        let mut acc = graphics_acc();
        acc.memory_barrier_all();
        acc.image_barrier(ImageId(7), ResourceState::Undefined, ResourceState::ColorAttachment)
            .unwrap();
        assert!(!acc.no_pending_barriers());

        acc.clear_barriers();
        assert!(acc.no_pending_barriers());
        assert!(acc.get_barriers().is_none());
    }

    #[test]
    fn test_overflow_signalled() {
        let mut acc = graphics_acc();
        for i in 0..MAX_BARRIERS {
            acc.buffer_barrier(
                BufferId(i as u64),
                ResourceState::CopyDst,
                ResourceState::ShaderStorageRead,
            )
            .unwrap();
        }
        let overflow = acc.buffer_barrier(
            BufferId(99),
            ResourceState::CopyDst,
            ResourceState::ShaderStorageRead,
        );
        assert_eq!(overflow, Err(BarrierOverflow));

        // Committing (clearing) makes room again.
        acc.clear_barriers();
        acc.buffer_barrier(
            BufferId(99),
            ResourceState::CopyDst,
            ResourceState::ShaderStorageRead,
        )
        .unwrap();
    }

    #[test]
    fn test_memory_barriers_merge() {
        let mut acc = graphics_acc();
        acc.memory_barrier(ResourceState::CopyDst, ResourceState::ShaderSample);
        acc.memory_barrier(ResourceState::ColorAttachment, ResourceState::CopySrc);

        let set = acc.get_barriers().unwrap();
        let memory = set.memory.unwrap();
        assert!(memory.src_access.contains(AccessMask::TRANSFER_WRITE));
        assert!(memory.src_access.contains(AccessMask::COLOR_ATTACHMENT_WRITE));
        assert!(memory.dst_access.contains(AccessMask::SHADER_READ));
        assert!(memory.dst_access.contains(AccessMask::TRANSFER_READ));
    }

    #[test]
    fn test_transfer_queue_caps_filter_stages() {
        let mut acc = BarrierAccumulator::new(QueueCaps::transfer(), 2);
        acc.buffer_barrier(BufferId(1), ResourceState::CopyDst, ResourceState::ShaderStorageRead)
            .unwrap();

        let set = acc.get_barriers().unwrap();
        let barrier = set.buffers[0];
        // Shader stages are not supported on the transfer queue; the barrier
        // falls back to a valid execution point instead.
        assert!(!barrier.dst_stages.contains(StageMask::COMPUTE_SHADER));
        assert_eq!(barrier.dst_stages, StageMask::TOP_OF_PIPE);
        assert!(!barrier.dst_access.contains(AccessMask::SHADER_READ));
    }

    #[test]
    fn test_ownership_transfer_halves() {
        let mut release = BarrierAccumulator::new(QueueCaps::graphics(), 0);
        release
            .release_image_ownership(ImageId(3), ResourceState::ColorAttachment, 2)
            .unwrap();
        let set = release.get_barriers().unwrap();
        assert_eq!(set.images[0].src_queue_family, 0);
        assert_eq!(set.images[0].dst_queue_family, 2);

        let mut acquire = BarrierAccumulator::new(QueueCaps::transfer(), 2);
        acquire
            .acquire_image_ownership(ImageId(3), 0, ResourceState::CopySrc)
            .unwrap();
        let set = acquire.get_barriers().unwrap();
        assert_eq!(set.images[0].src_queue_family, 0);
        assert_eq!(set.images[0].dst_queue_family, 2);
    }

    #[test]
    fn test_merge() {
        let mut a = graphics_acc();
        let mut b = graphics_acc();
        a.buffer_barrier(BufferId(1), ResourceState::CopyDst, ResourceState::VertexBuffer)
            .unwrap();
        b.image_barrier(ImageId(2), ResourceState::Undefined, ResourceState::ShaderSample)
            .unwrap();

        a.merge(&b).unwrap();
        let set = a.get_barriers().unwrap();
        assert_eq!(set.buffers.len(), 1);
        assert_eq!(set.images.len(), 1);
    }
}
