//! Vulkan backend implementation using ash.

mod device;
mod instance;

use std::ffi::CStr;

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use crate::backend::{
    CommandBufferKind, GpuCommandBuffer, GpuCommandPool, GpuDevice, GpuFence, GpuSemaphore,
    SubmitRequest,
};
use crate::barrier::{AccessMask, BarrierSet, ImageLayout, StageMask};
use crate::draw_batch::RenderPassState;
use crate::error::GraphicsError;
use crate::expired::ExpiredResource;
use crate::queue::{QueueCaps, QueueMask, QueueType};

pub use device::QueueFamilies;

/// Vulkan device wrapper implementing [`GpuDevice`].
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    device: ash::Device,
    families: QueueFamilies,
    queues: [Option<vk::Queue>; QueueType::COUNT],
    /// Vulkan queues are externally synchronized; one lock per queue.
    queue_locks: [Mutex<()>; QueueType::COUNT],
    timeline: bool,
    name: String,
}

impl VulkanDevice {
    /// Creates a headless Vulkan device on the best available GPU.
    pub fn new(validation_enabled: bool) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let instance = instance::create_instance(&entry, validation_enabled)?;
        let physical = device::select_physical_device(&instance)?;
        let families = device::find_queue_families(&instance, physical)?;
        let timeline = device::supports_timeline_semaphores(&instance, physical);
        let logical = device::create_logical_device(&instance, physical, &families, timeline)?;

        let properties = unsafe { instance.get_physical_device_properties(physical) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queues = std::array::from_fn(|index| {
            QueueType::from_index(index)
                .and_then(|queue| families.family_for(queue))
                .map(|family| unsafe { logical.get_device_queue(family, 0) })
        });

        log::info!(
            "Vulkan device '{}' created (timeline semaphores: {})",
            name,
            timeline
        );

        Ok(Self {
            _entry: entry,
            instance,
            device: logical,
            families,
            queues,
            queue_locks: std::array::from_fn(|_| Mutex::new(())),
            timeline,
            name,
        })
    }

    fn queue(&self, queue: QueueType) -> Result<vk::Queue, GraphicsError> {
        self.queues[queue.index()].ok_or_else(|| {
            GraphicsError::FeatureNotSupported(format!("queue {:?} is not available", queue))
        })
    }
}

#[allow(unreachable_patterns)]
fn vk_fence(fence: &GpuFence) -> Result<vk::Fence, GraphicsError> {
    match fence {
        GpuFence::Vulkan(fence) => Ok(*fence),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign fence handle".to_string(),
        )),
    }
}

#[allow(unreachable_patterns)]
fn vk_semaphore(semaphore: &GpuSemaphore) -> Result<vk::Semaphore, GraphicsError> {
    match semaphore {
        GpuSemaphore::Vulkan(semaphore) => Ok(*semaphore),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign semaphore handle".to_string(),
        )),
    }
}

#[allow(unreachable_patterns)]
fn vk_pool(pool: &GpuCommandPool) -> Result<vk::CommandPool, GraphicsError> {
    match pool {
        GpuCommandPool::Vulkan(pool) => Ok(*pool),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign command pool handle".to_string(),
        )),
    }
}

#[allow(unreachable_patterns)]
fn vk_cmd(cmd: &GpuCommandBuffer) -> Result<vk::CommandBuffer, GraphicsError> {
    match cmd {
        GpuCommandBuffer::Vulkan(cmd) => Ok(*cmd),
        _ => Err(GraphicsError::InvalidParameter(
            "foreign command buffer handle".to_string(),
        )),
    }
}

fn stage_flags(stages: StageMask) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    if stages.contains(StageMask::TOP_OF_PIPE) {
        flags |= vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if stages.contains(StageMask::DRAW_INDIRECT) {
        flags |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if stages.contains(StageMask::VERTEX_INPUT) {
        flags |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if stages.contains(StageMask::VERTEX_SHADER) {
        flags |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if stages.contains(StageMask::FRAGMENT_SHADER) {
        flags |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(StageMask::EARLY_FRAGMENT_TESTS) {
        flags |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    }
    if stages.contains(StageMask::LATE_FRAGMENT_TESTS) {
        flags |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if stages.contains(StageMask::COLOR_ATTACHMENT_OUTPUT) {
        flags |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if stages.contains(StageMask::COMPUTE_SHADER) {
        flags |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if stages.contains(StageMask::TRANSFER) {
        flags |= vk::PipelineStageFlags::TRANSFER;
    }
    if stages.contains(StageMask::HOST) {
        flags |= vk::PipelineStageFlags::HOST;
    }
    if stages.contains(StageMask::BOTTOM_OF_PIPE) {
        flags |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    if flags.is_empty() {
        flags = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    flags
}

fn access_flags(access: AccessMask) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    if access.contains(AccessMask::INDIRECT_COMMAND_READ) {
        flags |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if access.contains(AccessMask::INDEX_READ) {
        flags |= vk::AccessFlags::INDEX_READ;
    }
    if access.contains(AccessMask::VERTEX_ATTRIBUTE_READ) {
        flags |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if access.contains(AccessMask::UNIFORM_READ) {
        flags |= vk::AccessFlags::UNIFORM_READ;
    }
    if access.contains(AccessMask::SHADER_READ) {
        flags |= vk::AccessFlags::SHADER_READ;
    }
    if access.contains(AccessMask::SHADER_WRITE) {
        flags |= vk::AccessFlags::SHADER_WRITE;
    }
    if access.contains(AccessMask::COLOR_ATTACHMENT_READ) {
        flags |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    if access.contains(AccessMask::COLOR_ATTACHMENT_WRITE) {
        flags |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if access.contains(AccessMask::DEPTH_STENCIL_READ) {
        flags |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if access.contains(AccessMask::DEPTH_STENCIL_WRITE) {
        flags |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if access.contains(AccessMask::TRANSFER_READ) {
        flags |= vk::AccessFlags::TRANSFER_READ;
    }
    if access.contains(AccessMask::TRANSFER_WRITE) {
        flags |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if access.contains(AccessMask::HOST_READ) {
        flags |= vk::AccessFlags::HOST_READ;
    }
    if access.contains(AccessMask::HOST_WRITE) {
        flags |= vk::AccessFlags::HOST_WRITE;
    }
    if access.contains(AccessMask::MEMORY_READ) {
        flags |= vk::AccessFlags::MEMORY_READ;
    }
    if access.contains(AccessMask::MEMORY_WRITE) {
        flags |= vk::AccessFlags::MEMORY_WRITE;
    }
    flags
}

fn image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

fn is_depth_layout(layout: ImageLayout) -> bool {
    matches!(
        layout,
        ImageLayout::DepthStencilAttachment | ImageLayout::DepthStencilReadOnly
    )
}

fn timeout_ns(timeout: std::time::Duration) -> u64 {
    timeout.as_nanos().min(u64::MAX as u128) as u64
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_queues(&self) -> QueueMask {
        let mut mask = QueueMask::GRAPHICS;
        if self.families.compute.is_some() {
            mask |= QueueMask::ASYNC_COMPUTE;
        }
        if self.families.transfer.is_some() {
            mask |= QueueMask::ASYNC_TRANSFER;
        }
        mask
    }

    fn queue_caps(&self, queue: QueueType) -> QueueCaps {
        match queue {
            QueueType::Graphics => QueueCaps::graphics(),
            QueueType::AsyncCompute => QueueCaps::compute(),
            QueueType::AsyncTransfer => QueueCaps::transfer(),
        }
    }

    fn queue_family_index(&self, queue: QueueType) -> u32 {
        self.families
            .family_for(queue)
            .unwrap_or(self.families.graphics)
    }

    fn supports_timeline(&self) -> bool {
        self.timeline
    }

    fn create_fence(&self) -> Result<GpuFence, GraphicsError> {
        let create_info = vk::FenceCreateInfo::default();
        let fence = unsafe { self.device.create_fence(&create_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create fence: {:?}", e))
        })?;
        Ok(GpuFence::Vulkan(fence))
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let fence = vk_fence(fence)?;
        unsafe { self.device.reset_fences(&[fence]) }
            .map_err(|e| GraphicsError::SubmissionFailed(format!("Fence reset failed: {:?}", e)))
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError> {
        let fence = vk_fence(fence)?;
        match unsafe { self.device.get_fence_status(fence) } {
            Ok(signaled) => Ok(signaled),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GraphicsError::DeviceLost),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Fence query failed: {:?}",
                e
            ))),
        }
    }

    fn wait_fence(
        &self,
        fence: &GpuFence,
        timeout: std::time::Duration,
    ) -> Result<bool, GraphicsError> {
        let fence = vk_fence(fence)?;
        match unsafe {
            self.device
                .wait_for_fences(&[fence], true, timeout_ns(timeout))
        } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GraphicsError::DeviceLost),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Fence wait failed: {:?}",
                e
            ))),
        }
    }

    fn destroy_fence(&self, fence: GpuFence) {
        if let Ok(fence) = vk_fence(&fence) {
            unsafe { self.device.destroy_fence(fence, None) };
        }
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore =
            unsafe { self.device.create_semaphore(&create_info, None) }.map_err(|e| {
                GraphicsError::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
            })?;
        Ok(GpuSemaphore::Vulkan(semaphore))
    }

    fn create_timeline_semaphore(&self, initial: u64) -> Result<GpuSemaphore, GraphicsError> {
        if !self.timeline {
            return Err(GraphicsError::FeatureNotSupported(
                "timeline semaphores".to_string(),
            ));
        }
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore =
            unsafe { self.device.create_semaphore(&create_info, None) }.map_err(|e| {
                GraphicsError::InitializationFailed(format!(
                    "Failed to create timeline semaphore: {:?}",
                    e
                ))
            })?;
        Ok(GpuSemaphore::Vulkan(semaphore))
    }

    fn timeline_value(&self, semaphore: &GpuSemaphore) -> Result<u64, GraphicsError> {
        let semaphore = vk_semaphore(semaphore)?;
        unsafe { self.device.get_semaphore_counter_value(semaphore) }.map_err(|e| {
            GraphicsError::SubmissionFailed(format!("Timeline query failed: {:?}", e))
        })
    }

    fn wait_timeline(
        &self,
        semaphore: &GpuSemaphore,
        value: u64,
        timeout: std::time::Duration,
    ) -> Result<bool, GraphicsError> {
        let semaphore = vk_semaphore(semaphore)?;
        let semaphores = [semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        match unsafe { self.device.wait_semaphores(&wait_info, timeout_ns(timeout)) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GraphicsError::DeviceLost),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Timeline wait failed: {:?}",
                e
            ))),
        }
    }

    fn destroy_semaphore(&self, semaphore: GpuSemaphore) {
        if let Ok(semaphore) = vk_semaphore(&semaphore) {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn create_command_pool(&self, queue: QueueType) -> Result<GpuCommandPool, GraphicsError> {
        let family = self.queue_family_index(queue);
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(family);
        let pool = unsafe { self.device.create_command_pool(&create_info, None) }.map_err(
            |e| {
                GraphicsError::InitializationFailed(format!(
                    "Failed to create command pool: {:?}",
                    e
                ))
            },
        )?;
        Ok(GpuCommandPool::Vulkan(pool))
    }

    fn reset_command_pool(&self, pool: &GpuCommandPool) -> Result<(), GraphicsError> {
        let pool = vk_pool(pool)?;
        unsafe {
            self.device
                .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| GraphicsError::SubmissionFailed(format!("Pool reset failed: {:?}", e)))
    }

    fn destroy_command_pool(&self, pool: GpuCommandPool) {
        if let Ok(pool) = vk_pool(&pool) {
            unsafe { self.device.destroy_command_pool(pool, None) };
        }
    }

    fn allocate_command_buffer(
        &self,
        pool: &GpuCommandPool,
        kind: CommandBufferKind,
    ) -> Result<GpuCommandBuffer, GraphicsError> {
        let pool = vk_pool(pool)?;
        let level = match kind {
            CommandBufferKind::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferKind::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        let buffers =
            unsafe { self.device.allocate_command_buffers(&allocate_info) }.map_err(|e| {
                GraphicsError::SubmissionFailed(format!(
                    "Command buffer allocation failed: {:?}",
                    e
                ))
            })?;
        Ok(GpuCommandBuffer::Vulkan(buffers[0]))
    }

    fn begin_command_buffer(
        &self,
        cmd: &GpuCommandBuffer,
        kind: CommandBufferKind,
        inherit: Option<&RenderPassState>,
    ) -> Result<(), GraphicsError> {
        let cmd = vk_cmd(cmd)?;
        let mut flags = vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;

        let mut inheritance = vk::CommandBufferInheritanceInfo::default();
        if let (CommandBufferKind::Secondary, Some(state)) = (kind, inherit) {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
            inheritance = inheritance
                .render_pass(vk::RenderPass::from_raw(state.pass_id))
                .subpass(state.subpass);
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(flags)
            .inheritance_info(&inheritance);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
            GraphicsError::SubmissionFailed(format!("Begin command buffer failed: {:?}", e))
        })
    }

    fn end_command_buffer(&self, cmd: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        let cmd = vk_cmd(cmd)?;
        unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| {
            GraphicsError::SubmissionFailed(format!("End command buffer failed: {:?}", e))
        })
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        barriers: &BarrierSet<'_>,
    ) -> Result<(), GraphicsError> {
        let cmd = vk_cmd(cmd)?;

        let memory: Vec<vk::MemoryBarrier> = barriers
            .memory
            .iter()
            .map(|m| {
                vk::MemoryBarrier::default()
                    .src_access_mask(access_flags(m.src_access))
                    .dst_access_mask(access_flags(m.dst_access))
            })
            .collect();

        let buffers: Vec<vk::BufferMemoryBarrier> = barriers
            .buffers
            .iter()
            .map(|b| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(access_flags(b.src_access))
                    .dst_access_mask(access_flags(b.dst_access))
                    .src_queue_family_index(b.src_queue_family)
                    .dst_queue_family_index(b.dst_queue_family)
                    .buffer(vk::Buffer::from_raw(b.buffer.0))
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
            })
            .collect();

        let images: Vec<vk::ImageMemoryBarrier> = barriers
            .images
            .iter()
            .map(|i| {
                let aspect = if is_depth_layout(i.old_layout) || is_depth_layout(i.new_layout) {
                    vk::ImageAspectFlags::DEPTH
                } else {
                    vk::ImageAspectFlags::COLOR
                };
                let mip_count = if i.subrange.mip_count == u32::MAX {
                    vk::REMAINING_MIP_LEVELS
                } else {
                    i.subrange.mip_count
                };
                let layer_count = if i.subrange.layer_count == u32::MAX {
                    vk::REMAINING_ARRAY_LAYERS
                } else {
                    i.subrange.layer_count
                };
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(access_flags(i.src_access))
                    .dst_access_mask(access_flags(i.dst_access))
                    .old_layout(image_layout(i.old_layout))
                    .new_layout(image_layout(i.new_layout))
                    .src_queue_family_index(i.src_queue_family)
                    .dst_queue_family_index(i.dst_queue_family)
                    .image(vk::Image::from_raw(i.image.0))
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(aspect)
                            .base_mip_level(i.subrange.base_mip)
                            .level_count(mip_count)
                            .base_array_layer(i.subrange.base_layer)
                            .layer_count(layer_count),
                    )
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                stage_flags(barriers.src_stages),
                stage_flags(barriers.dst_stages),
                vk::DependencyFlags::empty(),
                &memory,
                &buffers,
                &images,
            );
        }
        Ok(())
    }

    fn cmd_execute_commands(
        &self,
        primary: &GpuCommandBuffer,
        secondaries: &[GpuCommandBuffer],
    ) -> Result<(), GraphicsError> {
        if secondaries.is_empty() {
            return Ok(());
        }
        let primary = vk_cmd(primary)?;
        let secondaries: Vec<vk::CommandBuffer> = secondaries
            .iter()
            .map(vk_cmd)
            .collect::<Result<_, _>>()?;
        unsafe { self.device.cmd_execute_commands(primary, &secondaries) };
        Ok(())
    }

    fn submit(&self, queue: QueueType, request: SubmitRequest<'_>) -> Result<(), GraphicsError> {
        let vk_queue = self.queue(queue)?;

        let command_buffers: Vec<vk::CommandBuffer> = request
            .command_buffers
            .iter()
            .map(vk_cmd)
            .collect::<Result<_, _>>()?;
        let wait_semaphores: Vec<vk::Semaphore> = request
            .waits
            .iter()
            .map(|w| vk_semaphore(&w.semaphore))
            .collect::<Result<_, _>>()?;
        let wait_stages: Vec<vk::PipelineStageFlags> = request
            .waits
            .iter()
            .map(|w| stage_flags(w.stages))
            .collect();
        let wait_values: Vec<u64> = request.waits.iter().map(|w| w.value).collect();
        let signal_semaphores: Vec<vk::Semaphore> = request
            .signals
            .iter()
            .map(|s| vk_semaphore(&s.semaphore))
            .collect::<Result<_, _>>()?;
        let signal_values: Vec<u64> = request.signals.iter().map(|s| s.value).collect();

        let fence = match request.fence {
            Some(fence) => vk_fence(fence)?,
            None => vk::Fence::null(),
        };

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let mut submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        if self.timeline {
            submit_info = submit_info.push_next(&mut timeline_info);
        }

        let _guard = self.queue_locks[queue.index()].lock();
        match unsafe { self.device.queue_submit(vk_queue, &[submit_info], fence) } {
            Ok(()) => {
                log::trace!(
                    "Submitted {} command buffers on {:?} ({})",
                    command_buffers.len(),
                    queue,
                    request.debug_name
                );
                Ok(())
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GraphicsError::DeviceLost),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Queue submit failed: {:?}",
                e
            ))),
        }
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        match unsafe { self.device.device_wait_idle() } {
            Ok(()) => Ok(()),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GraphicsError::DeviceLost),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Device wait failed: {:?}",
                e
            ))),
        }
    }

    fn destroy_expired(&self, resource: ExpiredResource) {
        match resource {
            ExpiredResource::Fence(fence) => self.destroy_fence(fence),
            ExpiredResource::Semaphore(semaphore) => self.destroy_semaphore(semaphore),
            ExpiredResource::CommandPool(pool) => self.destroy_command_pool(pool),
            ExpiredResource::Buffer(raw) => unsafe {
                self.device.destroy_buffer(vk::Buffer::from_raw(raw), None);
            },
            ExpiredResource::Image(raw) => unsafe {
                self.device.destroy_image(vk::Image::from_raw(raw), None);
            },
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
