//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, retrieval of the graphics and
//! compute queues, and gpu-allocator initialization. It runs once per process.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// A queue handle together with the family it was opened from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueHandle {
    pub queue: vk::Queue,
    pub family: u32,
}

/// Vulkan logical device wrapper.
///
/// Owns the logical device, the two queues the frame loop submits to, and
/// the memory allocator. GPU objects created from it are owned by
/// resource ledgers, which must be flushed before the device is dropped.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    /// Dropped by hand before the logical device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics: QueueHandle,
    compute: QueueHandle,
    queue_families: QueueFamilyIndices,
    limits: vk::PhysicalDeviceLimits,
}

impl Device {
    /// Creates the logical device.
    ///
    /// Opens queue index 0 of the graphics family and of the compute family
    /// (a single queue when both are the same family), enables dynamic
    /// rendering and synchronization2, and creates the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoComputeQueue`] if the device info carries no
    /// compute family, or a Vulkan/allocator error if creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let compute_family = queue_families
            .compute_family
            .ok_or(RhiError::NoComputeQueue)?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), {} queue families",
            DEVICE_EXTENSIONS.len(),
            if physical_device_info.queue_families.is_split() {
                "split"
            } else {
                "shared"
            }
        );

        let graphics = QueueHandle {
            queue: unsafe { device.get_device_queue(graphics_family, 0) },
            family: graphics_family,
        };
        let compute = QueueHandle {
            queue: unsafe { device.get_device_queue(compute_family, 0) },
            family: compute_family,
        };
        debug!(
            "Queues retrieved: graphics family {}, compute family {}",
            graphics.family, compute.family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics,
            compute,
            queue_families,
            limits: physical_device_info.properties.limits,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue, which is also used for presentation.
    #[inline]
    pub fn graphics_queue(&self) -> QueueHandle {
        self.graphics
    }

    /// Returns the compute queue.
    #[inline]
    pub fn compute_queue(&self) -> QueueHandle {
        self.compute
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the limits of the physical device.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Locks the allocator, recovering from a poisoned lock.
    fn lock_allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates device memory.
    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> RhiResult<Allocation> {
        Ok(self.lock_allocator().allocate(desc)?)
    }

    /// Returns memory to the allocator. Failures are logged.
    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = self.lock_allocator().free(allocation) {
            error!("Failed to free allocation: {:?}", e);
        }
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (for example on device loss).
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the given queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, the semaphores and fence
    /// must be valid, and the fence must be unsignaled.
    pub unsafe fn submit(
        &self,
        queue: QueueHandle,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device.queue_submit(queue.queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator releases its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queue and physical device handles are
// plain handles, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
