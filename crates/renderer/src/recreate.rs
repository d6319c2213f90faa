//! Rebuilding extent-dependent resources.

use tracing::{debug, info};

use skyscatter_rhi::RhiResult;

use crate::backend::{FrameBinding, SurfaceBackend, is_zero_extent};
use crate::surface::{SurfaceManager, SurfaceState};

/// Drives a full, ordered rebuild of the swapchain and output images.
///
/// Extent-independent resources (uniform buffers, their descriptor
/// bindings, pipelines, sync objects) are never touched.
///
/// # Protocol
///
/// 1. Read the window extent; a zero area or a minimized window suspends
///    the surface and stops here without calling anything destructive.
/// 2. Wait for the device to go idle.
/// 3. Flush the surface ledger.
/// 4. Store the new extent.
/// 5. Flush the image ledger and allocate new output images.
/// 6. Rewrite the output image binding of every frame slot.
/// 7. Build the swapchain.
///
/// Any error is fatal; there is no partial rebuild.
#[derive(Debug, Default)]
pub struct RecreationCoordinator {
    rebuilds: u64,
}

impl RecreationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the surface and returns the resulting state, either
    /// [`SurfaceState::Ready`] or [`SurfaceState::Suspended`].
    pub fn recreate<B: SurfaceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        surface: &mut SurfaceManager,
    ) -> RhiResult<SurfaceState> {
        let extent = backend.window_extent();
        if is_zero_extent(extent) || backend.window_minimized() {
            debug!("Skipping surface rebuild: window has no drawable area");
            surface.suspend();
            return Ok(surface.state());
        }

        let previous = surface.extent();
        debug!(
            "Rebuilding surface: {}x{} -> {}x{}",
            previous.width, previous.height, extent.width, extent.height
        );

        backend.wait_device_idle()?;
        backend.flush_surface_ledger();
        surface.set_extent(extent);

        backend.flush_image_ledger();
        backend.allocate_output_images(extent)?;
        for slot in 0..backend.slot_count() {
            backend.write_binding(slot, FrameBinding::OutputImage)?;
        }

        backend.build_swapchain(extent)?;
        surface.mark_ready();
        self.rebuilds += 1;

        info!(
            "Surface ready at {}x{} (build #{})",
            extent.width, extent.height, self.rebuilds
        );
        Ok(SurfaceState::Ready)
    }

    /// Number of completed rebuilds, including the initial build.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
