//! Vulkan physical and logical device management.

use std::ffi::CStr;

use ash::vk;

use crate::error::GraphicsError;
use crate::queue::QueueType;

/// Queue family indices chosen for the three queue classes.
///
/// Compute and transfer fall back to `None` when no dedicated family
/// exists; the scheduler then reports those queues as unavailable.
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilies {
    pub fn family_for(&self, queue: QueueType) -> Option<u32> {
        match queue {
            QueueType::Graphics => Some(self.graphics),
            QueueType::AsyncCompute => self.compute,
            QueueType::AsyncTransfer => self.transfer,
        }
    }
}

/// Select the best physical device.
///
/// Prefers discrete GPUs over integrated GPUs.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<vk::PhysicalDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };

        let mut score = 0;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            device_name,
            properties.device_type,
            score
        );
    }

    best_device
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

/// Find queue families for graphics plus dedicated compute and transfer
/// families when the hardware has them.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilies, GraphicsError> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let flags = family.queue_flags;

        if graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
            continue;
        }
        // Dedicated compute: compute without graphics.
        if compute.is_none()
            && flags.contains(vk::QueueFlags::COMPUTE)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
        {
            compute = Some(index);
            continue;
        }
        // Dedicated transfer: transfer without graphics or compute.
        if transfer.is_none()
            && flags.contains(vk::QueueFlags::TRANSFER)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && !flags.contains(vk::QueueFlags::COMPUTE)
        {
            transfer = Some(index);
        }
    }

    let graphics = graphics.ok_or_else(|| {
        GraphicsError::InitializationFailed("No graphics queue family found".to_string())
    })?;

    Ok(QueueFamilies {
        graphics,
        compute,
        transfer,
    })
}

/// Check whether the device supports timeline semaphores.
pub fn supports_timeline_semaphores(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> bool {
    let mut vulkan_12_features = vk::PhysicalDeviceVulkan12Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_12_features);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
    vulkan_12_features.timeline_semaphore == vk::TRUE
}

/// Create a logical device with one queue per chosen family.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilies,
    enable_timeline: bool,
) -> Result<ash::Device, GraphicsError> {
    let queue_priorities = [1.0f32];
    let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
        .queue_family_index(families.graphics)
        .queue_priorities(&queue_priorities)];
    for family in [families.compute, families.transfer].into_iter().flatten() {
        queue_create_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities),
        );
    }

    let features = vk::PhysicalDeviceFeatures::default();

    let mut vulkan_12_features =
        vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(enable_timeline);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_features(&features)
        .push_next(&mut vulkan_12_features);

    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
        })?;

    Ok(device)
}
