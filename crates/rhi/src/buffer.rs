//! Host-visible buffers for per-frame payloads and overlay vertices.
//!
//! A [`HostBuffer`] is persistently mapped through gpu-allocator. The
//! buffer and its allocation are recorded in a ledger at creation, so the
//! struct itself is a plain view: dropping it destroys nothing.
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::buffer::HostBuffer;
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//! use skyscatter_rhi::vk;
//!
//! # fn example(device: &Device, ledger: &mut GpuLedger) -> skyscatter_rhi::RhiResult<()> {
//! let camera = HostBuffer::new(
//!     device,
//!     "camera payload",
//!     vk::BufferUsageFlags::UNIFORM_BUFFER,
//!     128,
//!     ledger,
//! )?;
//! camera.write(&[0u8; 128])?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};

/// A mapped, host-coherent buffer.
#[derive(Debug)]
pub struct HostBuffer {
    buffer: vk::Buffer,
    mapped: NonNull<u8>,
    size: vk::DeviceSize,
}

// SAFETY: `mapped` points into a persistent mapping owned by the allocation
// recorded in the ledger; the struct holds no other state.
unsafe impl Send for HostBuffer {}
unsafe impl Sync for HostBuffer {}

impl HostBuffer {
    /// Creates a buffer of `size` bytes in CPU-to-GPU memory.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or allocation fails, or if the
    /// allocator hands back unmapped memory.
    pub fn new(
        device: &Device,
        name: &'static str,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = match device.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let mapped = allocation.mapped_ptr().map(|ptr| ptr.cast::<u8>());
        let bind = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        // Recorded before checking so a failed bind still releases both.
        ledger.record(GpuObject::Buffer { buffer, allocation });
        bind?;

        let mapped = mapped.ok_or_else(|| {
            RhiError::PipelineError(format!("{name} buffer memory is not host mapped"))
        })?;

        debug!("Created {} buffer: {} bytes", name, size);

        Ok(Self {
            buffer,
            mapped,
            size,
        })
    }

    /// Copies `data` to the start of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PayloadTooLarge`] if `data` is longer than the
    /// buffer; nothing is written in that case.
    pub fn write(&self, data: &[u8]) -> RhiResult<()> {
        check_capacity(data.len(), self.size)?;

        // SAFETY: the mapping covers `size` bytes and the length was checked.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.as_ptr(), data.len());
        }
        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// Size of a uniform buffer that one descriptor can cover in full.
///
/// `max_range` is the device's `maxUniformBufferRange`; Vulkan only
/// guarantees 16 KiB.
pub fn clamp_uniform_buffer_size(requested: vk::DeviceSize, max_range: u32) -> vk::DeviceSize {
    requested.min(vk::DeviceSize::from(max_range))
}

/// Fails with [`RhiError::PayloadTooLarge`] when `len` exceeds `capacity`.
pub fn check_capacity(len: usize, capacity: vk::DeviceSize) -> RhiResult<()> {
    let size = len as u64;
    if size > capacity {
        return Err(RhiError::PayloadTooLarge { size, capacity });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_accepts_exact_fit() {
        assert!(check_capacity(0, 128).is_ok());
        assert!(check_capacity(128, 128).is_ok());
    }

    #[test]
    fn test_uniform_size_clamped_to_device_range() {
        assert_eq!(clamp_uniform_buffer_size(32768, 16384), 16384);
        assert_eq!(clamp_uniform_buffer_size(32768, 65536), 32768);
        assert_eq!(clamp_uniform_buffer_size(256, 256), 256);
    }

    #[test]
    fn test_capacity_rejects_oversized_payload() {
        match check_capacity(129, 128) {
            Err(RhiError::PayloadTooLarge { size, capacity }) => {
                assert_eq!(size, 129);
                assert_eq!(capacity, 128);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
