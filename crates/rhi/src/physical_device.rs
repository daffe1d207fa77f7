//! Physical device (GPU) selection.
//!
//! This module handles GPU enumeration and selection based on capabilities.
//!
//! # Overview
//!
//! The physical device selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Checking each GPU for required queue families (Graphics, Present)
//! 3. Selecting the most suitable GPU (preferring discrete GPUs)
//!
//! The selected device carries a [`DeviceLimits`] snapshot of the limits the
//! buffer and draw layers depend on: the minimum uniform offset alignment,
//! the maximum uniform buffer range, and the non-coherent atom size.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices for different queue types.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if the minimum required queue families are available.
    ///
    /// For rendering, we need at least graphics and present queue families.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices as a vector.
    ///
    /// This is useful when creating logical devices to avoid creating
    /// duplicate queues for the same family.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Device limits consumed by the buffer and draw layers.
///
/// Captured once at selection time so callers never have to re-query the
/// physical device on the frame path.
#[derive(Clone, Copy, Debug)]
pub struct DeviceLimits {
    /// Minimum required alignment for dynamic uniform buffer offsets.
    pub min_uniform_buffer_offset_alignment: vk::DeviceSize,
    /// Maximum range of a uniform buffer binding.
    pub max_uniform_buffer_range: u32,
    /// Granularity of non-coherent host memory flushes.
    pub non_coherent_atom_size: vk::DeviceSize,
}

impl DeviceLimits {
    /// The instance alignment for a host-visible indexed uniform buffer.
    ///
    /// Each indexed region must satisfy both the uniform offset alignment and
    /// the flush granularity, so the usable alignment is the least common
    /// multiple of the two.
    pub fn uniform_atom_alignment(&self) -> vk::DeviceSize {
        lcm(
            self.min_uniform_buffer_offset_alignment.max(1),
            self.non_coherent_atom_size.max(1),
        )
    }
}

/// Least common multiple of two nonzero device sizes.
fn lcm(a: vk::DeviceSize, b: vk::DeviceSize) -> vk::DeviceSize {
    a / gcd(a, b) * b
}

fn gcd(mut a: vk::DeviceSize, mut b: vk::DeviceSize) -> vk::DeviceSize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Information about a physical device (GPU).
///
/// This struct contains all the information needed to create a logical device
/// and perform rendering operations.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
    /// Limits snapshot for the buffer/draw layers.
    pub limits: DeviceLimits,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// This function enumerates all available GPUs and selects one based on:
/// 1. Required queue family support (graphics and present)
/// 2. Device type preference (discrete GPU preferred)
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no suitable GPU is found.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();

    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, surface, surface_loader) {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            suitable_devices.push((info, score));
        }
    }

    if suitable_devices.is_empty() {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    }

    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let (selected, score) = suitable_devices.remove(0);

    info!(
        "Selected GPU: '{}' ({}), score {}, min uniform alignment {}, max uniform range {}",
        selected.device_name(),
        selected.device_type_name(),
        score,
        selected.limits.min_uniform_buffer_offset_alignment,
        selected.limits.max_uniform_buffer_range,
    );

    Ok(selected)
}

/// Checks if a physical device is suitable for rendering.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let queue_families = find_queue_families(instance, device, surface, surface_loader);

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    let limits = DeviceLimits {
        min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
        max_uniform_buffer_range: properties.limits.max_uniform_buffer_range,
        non_coherent_atom_size: properties.limits.non_coherent_atom_size,
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
        limits,
    })
}

/// Finds queue family indices for graphics and presentation.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && indices.graphics_family.is_none()
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };

            if present_support {
                indices.present_family = Some(i);
            }
        }
    }

    indices
}

/// Rates a physical device based on its capabilities.
///
/// Higher scores indicate more desirable devices.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = 0u32;

    match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 100,
        vk::PhysicalDeviceType::CPU => score += 10,
        _ => score += 1,
    }

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_default_incomplete() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_queue_family_indices_complete() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());

        let missing_present = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!missing_present.is_complete());
    }

    #[test]
    fn test_unique_families_deduplicates() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_uniform_atom_alignment_is_lcm() {
        let limits = DeviceLimits {
            min_uniform_buffer_offset_alignment: 64,
            max_uniform_buffer_range: 65536,
            non_coherent_atom_size: 256,
        };
        assert_eq!(limits.uniform_atom_alignment(), 256);

        let odd = DeviceLimits {
            min_uniform_buffer_offset_alignment: 48,
            max_uniform_buffer_range: 65536,
            non_coherent_atom_size: 128,
        };
        // lcm(48, 128) = 384, a multiple of both
        assert_eq!(odd.uniform_atom_alignment(), 384);
        assert_eq!(odd.uniform_atom_alignment() % 48, 0);
        assert_eq!(odd.uniform_atom_alignment() % 128, 0);
    }

    #[test]
    fn test_uniform_atom_alignment_handles_zero_limits() {
        // A driver reporting 0 means "no requirement"; treat as 1
        let limits = DeviceLimits {
            min_uniform_buffer_offset_alignment: 0,
            max_uniform_buffer_range: 16384,
            non_coherent_atom_size: 64,
        };
        assert_eq!(limits.uniform_atom_alignment(), 64);
    }
}
