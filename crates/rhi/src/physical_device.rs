//! Physical device (GPU) selection.
//!
//! A device qualifies when it has a queue family that can both render and
//! present to the window surface, at least one compute-capable family, and
//! Vulkan 1.3. Among qualifying devices the highest [`rate_device`] score wins.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices used by the frame loop.
///
/// The graphics family doubles as the presentation family. The compute
/// family may be the same index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family with graphics operations and surface presentation support.
    pub graphics_family: Option<u32>,
    /// Family with compute operations.
    pub compute_family: Option<u32>,
    /// Whether the compute family also supports graphics (and therefore blits).
    pub compute_supports_graphics: bool,
}

impl QueueFamilyIndices {
    /// Checks if both required queue families are available.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.compute_family.is_some()
    }

    /// Returns true when compute and graphics work land on different families.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.is_complete() && self.graphics_family != self.compute_family
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(compute) = self.compute_family
            && !families.contains(&compute)
        {
            families.push(compute);
        }

        families
    }

    /// Scans family properties in index order.
    ///
    /// `supports_present` is asked only for graphics-capable families. The
    /// first graphics family that can present becomes the graphics family;
    /// the first compute-capable family becomes the compute family.
    pub fn from_properties(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if family.queue_count == 0 {
                continue;
            }

            let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let has_compute = family.queue_flags.contains(vk::QueueFlags::COMPUTE);

            if has_graphics && indices.graphics_family.is_none() && supports_present(i) {
                indices.graphics_family = Some(i);
            }

            if has_compute && indices.compute_family.is_none() {
                indices.compute_family = Some(i);
                indices.compute_supports_graphics = has_graphics;
            }
        }

        indices
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for the compute and graphics queues.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
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

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
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
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device.
///
/// # Errors
///
/// Returns [`RhiError::NoComputeQueue`] when every device that can present
/// lacks a compute-capable family, and [`RhiError::NoSuitableGpu`] when no
/// device qualifies for any other reason.
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
    let mut missing_compute = false;

    for device in devices {
        match check_device_suitability(instance, device, surface, surface_loader) {
            Suitability::Suitable(info) => {
                let score = rate_device(&info);
                debug!(
                    "GPU '{}' ({}) - Score: {}",
                    info.device_name(),
                    info.device_type_name(),
                    score
                );
                suitable_devices.push((info, score));
            }
            Suitability::MissingCompute => missing_compute = true,
            Suitability::Unsuitable => {}
        }
    }

    if suitable_devices.is_empty() {
        if missing_compute {
            return Err(RhiError::NoComputeQueue);
        }
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    }

    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let (selected_device, score) = suitable_devices.remove(0);

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        score
    );
    info!(
        "Queue families: graphics={:?}, compute={:?}",
        selected_device.queue_families.graphics_family,
        selected_device.queue_families.compute_family
    );

    Ok(selected_device)
}

enum Suitability {
    Suitable(PhysicalDeviceInfo),
    MissingCompute,
    Unsuitable,
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Suitability {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .unwrap_or(c"Unknown")
        .to_string_lossy()
        .into_owned();

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = QueueFamilyIndices::from_properties(&family_properties, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    if queue_families.graphics_family.is_none() {
        debug!(
            "GPU '{}' skipped: no graphics family can present to the surface",
            device_name
        );
        return Suitability::Unsuitable;
    }

    if queue_families.compute_family.is_none() {
        warn!("GPU '{}' skipped: no compute-capable queue family", device_name);
        return Suitability::MissingCompute;
    }

    if !supports_vulkan_1_3(properties.api_version) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return Suitability::Unsuitable;
    }

    Suitability::Suitable(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Rates a physical device. Higher scores are preferred.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.compute_family.is_none());
        assert!(!indices.is_complete());
        assert!(!indices.is_split());
    }

    #[test]
    fn test_universal_family_serves_both() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            16,
        )];
        let indices = QueueFamilyIndices::from_properties(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.compute_family, Some(0));
        assert!(indices.compute_supports_graphics);
        assert!(!indices.is_split());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_graphics_family_must_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = QueueFamilyIndices::from_properties(&families, |index| index == 1);

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.compute_family, Some(0));
        assert!(indices.is_split());
        assert_eq!(indices.unique_families(), vec![1, 0]);
    }

    #[test]
    fn test_first_compute_family_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE, 4),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = QueueFamilyIndices::from_properties(&families, |_| true);

        assert_eq!(indices.compute_family, Some(1));
        assert!(!indices.compute_supports_graphics);
        assert_eq!(indices.graphics_family, Some(2));
    }

    #[test]
    fn test_missing_compute_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = QueueFamilyIndices::from_properties(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(0));
        assert!(indices.compute_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = QueueFamilyIndices::from_properties(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.compute_family, Some(1));
    }

    #[test]
    fn test_vulkan_version_gate() {
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::make_api_version(0, 1, 2, 198)));
    }
}
