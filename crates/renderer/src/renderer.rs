//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that owns the Vulkan
//! instance, device, surface and backend, and runs the frame scheduler
//! against them.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use skyscatter_core::AppConfig;
use skyscatter_platform::{Surface, Window};
use skyscatter_rhi::device::Device;
use skyscatter_rhi::instance::Instance;
use skyscatter_rhi::physical_device::select_physical_device;
use skyscatter_rhi::{RhiError, RhiResult};

use crate::backend::{FramePayloads, SurfaceBackend};
use crate::overlay::{FONT_TEXTURE_ID, OverlayDrawData};
use crate::scheduler::{FrameOutcome, FrameScheduler, FrameTimeouts};
use crate::vulkan::{FontAtlasPixels, VulkanBackend, VulkanBackendDesc};

/// Owns every GPU object of the application.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Flush the surface ledger (swapchain, views, overlay pipeline)
/// 3. Flush the image ledger (output images)
/// 4. Flush the main ledger (everything else the backend created)
/// 5. Destroy the device (and its allocator)
/// 6. Destroy the surface
/// 7. Destroy the debug messenger and the instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    scheduler: FrameScheduler,
    backend: ManuallyDrop<VulkanBackend>,
    minimized: bool,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    /// Creates the renderer and builds the presentation surface.
    ///
    /// When the overlay is enabled, `fonts` is rasterized and uploaded, and
    /// its texture id set to the one the overlay pass binds.
    ///
    /// # Errors
    ///
    /// Returns an error if no GPU with a compute queue is found, a shader
    /// cannot be loaded, or any Vulkan call fails.
    pub fn new(
        window: &Window,
        config: &AppConfig,
        fonts: &mut imgui::FontAtlas,
    ) -> RhiResult<Self> {
        let extent = window.extent();
        info!("Initializing renderer ({}x{})", extent.width, extent.height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(&surface_extensions, config.gpu.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let desc = VulkanBackendDesc::from_config(config);
        let mut backend = if desc.overlay.is_some() {
            let atlas = fonts.build_rgba32_texture();
            let font = FontAtlasPixels {
                width: atlas.width,
                height: atlas.height,
                rgba: atlas.data,
            };
            VulkanBackend::new(&instance, device.clone(), &surface, extent, &desc, Some(font))?
        } else {
            VulkanBackend::new(&instance, device.clone(), &surface, extent, &desc, None)?
        };
        fonts.tex_id = imgui::TextureId::from(FONT_TEXTURE_ID);

        let minimized = window.is_minimized();
        backend.set_window_minimized(minimized);

        let mut scheduler = FrameScheduler::new(FrameTimeouts::from_config(&config.gpu));
        let state = match scheduler.initialize(&mut backend) {
            Ok(state) => state,
            Err(e) => {
                if let Err(idle) = device.wait_idle() {
                    error!("Failed to wait for device idle: {}", idle);
                }
                backend.destroy();
                return Err(e);
            }
        };
        info!("Renderer initialized, surface {:?}", state);

        Ok(Self {
            scheduler,
            backend: ManuallyDrop::new(backend),
            minimized,
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Notifies the renderer that the window's drawable size changed.
    ///
    /// The rebuild happens at the start of the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        self.backend.set_window_extent(extent);
        self.scheduler.surface_mut().notify_resize(extent);
    }

    /// Notifies the renderer that the window was minimized, occluded or
    /// brought back.
    ///
    /// Minimizing suspends presentation at the next frame. Restoring lets
    /// the next frame rebuild the surface at the current window extent.
    pub fn set_minimized(&mut self, minimized: bool) {
        if minimized == self.minimized {
            return;
        }
        self.minimized = minimized;
        self.backend.set_window_minimized(minimized);
        if minimized {
            info!("Window minimized, presentation suspended");
        } else {
            info!("Window restored");
            let extent = self.backend.window_extent();
            self.scheduler.notify_restored(extent);
        }
    }

    /// Runs one iteration of the frame loop.
    ///
    /// # Errors
    ///
    /// Any error is fatal.
    pub fn render_frame(
        &mut self,
        payloads: &FramePayloads<'_>,
        overlay: &OverlayDrawData,
    ) -> RhiResult<FrameOutcome> {
        self.scheduler
            .run_frame(&mut *self.backend, payloads, overlay)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        info!(
            "Shutting down renderer: {} frame(s) presented, {} dropped, {} surface build(s)",
            self.scheduler.presented_frames(),
            self.scheduler.dropped_frames(),
            self.scheduler.rebuilds()
        );

        self.backend.destroy();

        // SAFETY: each field is dropped exactly once, here, in dependency
        // order. The backend holds the only other device reference.
        unsafe {
            ManuallyDrop::drop(&mut self.backend);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
    }
}
