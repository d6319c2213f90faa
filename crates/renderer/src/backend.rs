//! The seam between frame orchestration and the GPU.
//!
//! [`FrameScheduler`](crate::scheduler::FrameScheduler) and
//! [`RecreationCoordinator`](crate::recreate::RecreationCoordinator) only
//! talk to the GPU through these traits. [`VulkanBackend`](crate::vulkan::VulkanBackend)
//! implements them over the rhi crate; tests use a recording mock.

use std::time::Duration;

use ash::vk;

use skyscatter_rhi::RhiResult;
use skyscatter_rhi::descriptor::{ATMOSPHERE_BINDING, CAMERA_BINDING, OUTPUT_IMAGE_BINDING};

use crate::overlay::OverlayDrawData;

pub use skyscatter_rhi::swapchain::{AcquireStatus, PresentStatus};

/// A binding of the per-frame compute descriptor set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameBinding {
    /// Camera/ray payload, uniform buffer.
    CameraUniform,
    /// Atmosphere/sun/light payload, uniform buffer.
    AtmosphereUniform,
    /// Extent-dependent output image, storage image.
    OutputImage,
}

impl FrameBinding {
    /// The binding number in the compute shader.
    pub fn index(self) -> u32 {
        match self {
            FrameBinding::CameraUniform => CAMERA_BINDING,
            FrameBinding::AtmosphereUniform => ATMOSPHERE_BINDING,
            FrameBinding::OutputImage => OUTPUT_IMAGE_BINDING,
        }
    }
}

/// The two parameter blocks written to a frame slot before dispatch.
///
/// Both are opaque bytes here; their layout is owned by the simulation and
/// the compute kernel.
#[derive(Clone, Copy, Debug)]
pub struct FramePayloads<'a> {
    pub camera: &'a [u8],
    pub atmosphere: &'a [u8],
}

/// Operations needed to rebuild extent-dependent resources.
pub trait SurfaceBackend {
    /// Number of frame slots.
    fn slot_count(&self) -> usize;

    /// Current drawable extent reported by the window system.
    fn window_extent(&self) -> vk::Extent2D;

    /// Whether the window is minimized or fully occluded. Some platforms
    /// keep reporting the last extent while minimized.
    fn window_minimized(&self) -> bool;

    /// Blocks until the device has no work in flight.
    fn wait_device_idle(&mut self) -> RhiResult<()>;

    /// Destroys the swapchain and everything bound to it.
    fn flush_surface_ledger(&mut self);

    /// Destroys the per-frame output images.
    fn flush_image_ledger(&mut self);

    /// Allocates one output image per frame slot at `extent`.
    fn allocate_output_images(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    /// Rewrites one descriptor binding of one frame slot.
    fn write_binding(&mut self, slot: usize, binding: FrameBinding) -> RhiResult<()>;

    /// Builds the swapchain and its dependents at `extent`.
    fn build_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()>;
}

/// Per-frame operations, in the order the scheduler issues them.
pub trait FrameBackend: SurfaceBackend {
    /// Whether the overlay stage runs between compute and present.
    fn overlay_enabled(&self) -> bool;

    /// Blocks until every submission from the previous use of `slot` is done.
    fn wait_for_slot(&mut self, slot: usize, timeout: Duration) -> RhiResult<()>;

    /// Resets the command buffers of `slot` for recording.
    fn reset_commands(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires a presentable image, signaling the slot's acquire semaphore.
    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> RhiResult<AcquireStatus>;

    /// Resets the fences of `slot` ahead of submission.
    fn reset_fences(&mut self, slot: usize) -> RhiResult<()>;

    /// Copies both payloads into the slot's uniform buffers.
    fn write_payloads(&mut self, slot: usize, payloads: &FramePayloads<'_>) -> RhiResult<()>;

    /// Records dispatch and transfer into the slot's compute command buffer.
    fn record_compute(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Submits the compute command buffer.
    fn submit_compute(&mut self, slot: usize) -> RhiResult<()>;

    /// Records and submits the overlay pass over the acquired image.
    fn submit_overlay(
        &mut self,
        slot: usize,
        image_index: u32,
        overlay: &OverlayDrawData,
    ) -> RhiResult<()>;

    /// Queues the image for presentation.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus>;
}

/// Returns true if `extent` has no drawable area.
#[inline]
pub fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_indices_match_shader_layout() {
        assert_eq!(FrameBinding::CameraUniform.index(), 0);
        assert_eq!(FrameBinding::AtmosphereUniform.index(), 1);
        assert_eq!(FrameBinding::OutputImage.index(), 2);
    }

    #[test]
    fn test_zero_extent() {
        assert!(is_zero_extent(vk::Extent2D { width: 0, height: 600 }));
        assert!(is_zero_extent(vk::Extent2D { width: 800, height: 0 }));
        assert!(!is_zero_extent(vk::Extent2D { width: 1, height: 1 }));
    }
}
