//! The Vulkan implementation of the frame backend.
//!
//! # Resource Ownership
//!
//! Every object this backend creates is recorded in one of three ledgers:
//!
//! | ledger    | contents                                             | flushed           |
//! |-----------|------------------------------------------------------|-------------------|
//! | `main`    | frame buffers, sync, font texture, descriptors,      | shutdown          |
//! |           | pipelines, shaders                                   |                   |
//! | `surface` | swapchain, swapchain image views, overlay pipeline   | rebuild, shutdown |
//! | `image`   | per-frame output images and views                    | rebuild, shutdown |
//!
//! The overlay pipeline lives in the surface ledger because its color
//! attachment format is the swapchain format.
//!
//! Within the main ledger every buffer, image and sampler a descriptor
//! points at is recorded before the descriptor pools, so the LIFO flush
//! frees the pools (and their sets) first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, trace, warn};

use skyscatter_core::AppConfig;
use skyscatter_platform::Surface;
use skyscatter_rhi::buffer::clamp_uniform_buffer_size;
use skyscatter_rhi::command::CommandBuffer;
use skyscatter_rhi::descriptor::{
    FONT_TEXTURE_BINDING, allocate_descriptor_sets, create_compute_descriptor_pool,
    create_compute_set_layout, create_overlay_descriptor_pool, create_overlay_set_layout,
    write_sampled_image,
};
use skyscatter_rhi::device::Device;
use skyscatter_rhi::image::SampledTexture;
use skyscatter_rhi::instance::Instance;
use skyscatter_rhi::ledger::GpuLedger;
use skyscatter_rhi::pipeline::{
    GraphicsPipelineBuilder, create_compute_pipeline, create_pipeline_layout,
};
use skyscatter_rhi::shader::{ShaderModule, ShaderStage};
use skyscatter_rhi::swapchain::{Swapchain, SwapchainDesc};
use skyscatter_rhi::sync::{reset_fences, wait_for_fences};
use skyscatter_rhi::vertex::OverlayVertex;
use skyscatter_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::backend::{
    AcquireStatus, FrameBackend, FrameBinding, FramePayloads, PresentStatus, SurfaceBackend,
};
use crate::frame::{FrameResourceDesc, FrameResourceSet, attach_descriptor_sets, create_frame_sets};
use crate::overlay::{
    OverlayDrawData, OverlayTransform, check_overlay_capacity, index_buffer_size,
    vertex_buffer_size,
};
use crate::passes::{
    ACQUIRE_WAIT_STAGE, ComputePass, OVERLAY_WAIT_STAGE, OverlayPass, TransferMode,
    choose_transfer,
};

/// Overlay stage settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayDesc {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub max_vertices: usize,
    pub max_indices: usize,
}

/// Everything the backend needs besides the device and surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VulkanBackendDesc {
    pub slot_count: usize,
    pub payload_buffer_size: vk::DeviceSize,
    pub compute_shader: PathBuf,
    /// `None` runs compute only, presenting straight after the copy.
    pub overlay: Option<OverlayDesc>,
    pub vsync: bool,
}

impl VulkanBackendDesc {
    pub fn from_config(config: &AppConfig) -> Self {
        let overlay = config.overlay.enabled.then(|| OverlayDesc {
            vertex_shader: config.shaders.overlay_vertex.clone(),
            fragment_shader: config.shaders.overlay_fragment.clone(),
            max_vertices: config.overlay.max_vertices as usize,
            max_indices: config.overlay.max_indices as usize,
        });

        Self {
            slot_count: MAX_FRAMES_IN_FLIGHT,
            payload_buffer_size: config.gpu.payload_buffer_size(),
            compute_shader: config.shaders.compute.clone(),
            overlay,
            vsync: config.gpu.vsync,
        }
    }

    /// Per-slot buffer sizes, with uniform buffers limited to
    /// `max_uniform_buffer_range`.
    fn frame_resources(&self, max_uniform_buffer_range: u32) -> FrameResourceDesc {
        let payload_buffer_size =
            clamp_uniform_buffer_size(self.payload_buffer_size, max_uniform_buffer_range);
        if payload_buffer_size < self.payload_buffer_size {
            warn!(
                "Payload buffers clamped from {} to {} bytes by the device uniform range",
                self.payload_buffer_size, payload_buffer_size
            );
        }

        let (overlay_vertex_buffer_size, overlay_index_buffer_size) =
            self.overlay.as_ref().map_or((0, 0), |overlay| {
                (
                    vertex_buffer_size(overlay.max_vertices),
                    index_buffer_size(overlay.max_indices),
                )
            });

        FrameResourceDesc {
            payload_buffer_size,
            overlay_vertex_buffer_size,
            overlay_index_buffer_size,
        }
    }
}

/// RGBA8 pixels of the overlay font atlas, as built by imgui.
#[derive(Clone, Copy, Debug)]
pub struct FontAtlasPixels<'a> {
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
}

impl FontAtlasPixels<'_> {
    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

struct ComputeStage {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

struct OverlayStage {
    vertex: ShaderModule,
    fragment: ShaderModule,
    layout: vk::PipelineLayout,
    font_set: vk::DescriptorSet,
    /// Built with each swapchain.
    pipeline: Option<vk::Pipeline>,
    max_vertices: usize,
    max_indices: usize,
}

struct MainResources {
    frames: Vec<FrameResourceSet>,
    compute: ComputeStage,
    overlay: Option<OverlayStage>,
}

/// Frame backend over a Vulkan device and window surface.
pub struct VulkanBackend {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,

    main_ledger: GpuLedger,
    surface_ledger: GpuLedger,
    image_ledger: GpuLedger,

    frames: Vec<FrameResourceSet>,
    compute: ComputeStage,
    overlay: Option<OverlayStage>,

    swapchain: Option<Swapchain>,
    transfer: TransferMode,
    window_extent: vk::Extent2D,
    window_minimized: bool,
    vsync: bool,
}

impl VulkanBackend {
    /// Creates every extent-independent resource.
    ///
    /// `font` must be given when the overlay is enabled; it is uploaded once
    /// and sampled by every overlay draw.
    ///
    /// The swapchain and output images are built by the first surface
    /// rebuild (see [`FrameScheduler::initialize`](crate::scheduler::FrameScheduler::initialize)).
    ///
    /// # Errors
    ///
    /// Shader load failures and Vulkan errors are returned; anything
    /// already created is destroyed first.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        window_extent: vk::Extent2D,
        desc: &VulkanBackendDesc,
        font: Option<FontAtlasPixels<'_>>,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut main_ledger = GpuLedger::new("main");
        let resources = match Self::create_main_resources(&device, desc, font, &mut main_ledger) {
            Ok(resources) => resources,
            Err(e) => {
                main_ledger.flush(&device);
                return Err(e);
            }
        };

        info!(
            "Vulkan backend created: {} frame slots, overlay {}",
            resources.frames.len(),
            if resources.overlay.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            device,
            surface: surface.handle(),
            surface_loader: surface.loader().clone(),
            swapchain_loader,
            main_ledger,
            surface_ledger: GpuLedger::new("surface"),
            image_ledger: GpuLedger::new("image"),
            frames: resources.frames,
            compute: resources.compute,
            overlay: resources.overlay,
            swapchain: None,
            transfer: TransferMode::Copy,
            window_extent,
            window_minimized: false,
            vsync: desc.vsync,
        })
    }

    /// Creates the main-ledger resources: every descriptor target first,
    /// then layouts, pools and sets, then pipelines. The bindings are
    /// written last.
    fn create_main_resources(
        device: &Device,
        desc: &VulkanBackendDesc,
        font: Option<FontAtlasPixels<'_>>,
        ledger: &mut GpuLedger,
    ) -> RhiResult<MainResources> {
        let frame_desc = desc.frame_resources(device.limits().max_uniform_buffer_range);
        let mut frames = create_frame_sets(device, desc.slot_count, &frame_desc, ledger)?;

        let font_texture = match (&desc.overlay, font) {
            (Some(_), Some(font)) => Some(SampledTexture::upload(
                device,
                "font atlas",
                font.extent(),
                font.rgba,
                ledger,
            )?),
            (Some(_), None) => {
                return Err(RhiError::PipelineError(
                    "Overlay is enabled but no font atlas was supplied".to_string(),
                ));
            }
            (None, _) => None,
        };

        let compute_set_layout = create_compute_set_layout(device, ledger)?;
        let compute_pool = create_compute_descriptor_pool(device, desc.slot_count as u32, ledger)?;
        let compute_sets =
            allocate_descriptor_sets(device, compute_pool, compute_set_layout, desc.slot_count)?;

        let compute_layout = create_pipeline_layout(device, &[compute_set_layout], &[], ledger)?;
        let compute_shader =
            ShaderModule::from_spirv_file(device, &desc.compute_shader, ShaderStage::Compute, ledger)?;
        let compute_pipeline = create_compute_pipeline(device, compute_layout, &compute_shader, ledger)?;

        let overlay = match (&desc.overlay, font_texture) {
            (Some(overlay), Some(font_texture)) => {
                let set_layout = create_overlay_set_layout(device, ledger)?;
                let pool = create_overlay_descriptor_pool(device, ledger)?;
                let font_set = allocate_descriptor_sets(device, pool, set_layout, 1)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        RhiError::PipelineError("No overlay descriptor set allocated".to_string())
                    })?;

                let push_constants = [vk::PushConstantRange::default()
                    .stage_flags(vk::ShaderStageFlags::VERTEX)
                    .offset(0)
                    .size(std::mem::size_of::<OverlayTransform>() as u32)];
                let layout = create_pipeline_layout(device, &[set_layout], &push_constants, ledger)?;

                let vertex = ShaderModule::from_spirv_file(
                    device,
                    &overlay.vertex_shader,
                    ShaderStage::Vertex,
                    ledger,
                )?;
                let fragment = ShaderModule::from_spirv_file(
                    device,
                    &overlay.fragment_shader,
                    ShaderStage::Fragment,
                    ledger,
                )?;

                write_sampled_image(
                    device,
                    font_set,
                    FONT_TEXTURE_BINDING,
                    font_texture.view(),
                    font_texture.sampler(),
                );

                Some(OverlayStage {
                    vertex,
                    fragment,
                    layout,
                    font_set,
                    pipeline: None,
                    max_vertices: overlay.max_vertices,
                    max_indices: overlay.max_indices,
                })
            }
            _ => None,
        };

        attach_descriptor_sets(device, &mut frames, &compute_sets)?;
        ledger.verify_descriptor_order()?;

        Ok(MainResources {
            frames,
            compute: ComputeStage {
                layout: compute_layout,
                pipeline: compute_pipeline,
            },
            overlay,
        })
    }

    /// Records the window's new drawable size; the next frame rebuilds.
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    /// Records whether the window is minimized or occluded.
    pub fn set_window_minimized(&mut self, minimized: bool) {
        self.window_minimized = minimized;
    }

    /// Flushes all three ledgers, surface first. The device must be idle.
    pub fn destroy(&mut self) {
        self.surface_ledger.flush(&self.device);
        self.swapchain = None;
        self.image_ledger.flush(&self.device);
        for frame in &mut self.frames {
            frame.release_output();
        }
        self.main_ledger.flush(&self.device);
        self.frames.clear();
        self.overlay = None;
        debug!("Vulkan backend resources destroyed");
    }

    fn frame(&self, slot: usize) -> RhiResult<&FrameResourceSet> {
        self.frames
            .get(slot)
            .ok_or_else(|| RhiError::PipelineError(format!("No frame slot {}", slot)))
    }

    fn swapchain(&self) -> RhiResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain not built".to_string()))
    }

    fn swapchain_image(&self, image_index: u32) -> RhiResult<(vk::Image, vk::ImageView)> {
        let swapchain = self.swapchain()?;
        swapchain
            .image(image_index)
            .zip(swapchain.image_view(image_index))
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("No swapchain image {}", image_index))
            })
    }

    fn command_buffer(&self, handle: vk::CommandBuffer) -> CommandBuffer<'_> {
        CommandBuffer::from_handle(&self.device, handle)
    }
}

impl SurfaceBackend for VulkanBackend {
    fn slot_count(&self) -> usize {
        self.frames.len()
    }

    fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    fn window_minimized(&self) -> bool {
        self.window_minimized
    }

    fn wait_device_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn flush_surface_ledger(&mut self) {
        self.surface_ledger.flush(&self.device);
        self.swapchain = None;
        if let Some(overlay) = &mut self.overlay {
            overlay.pipeline = None;
        }
    }

    fn flush_image_ledger(&mut self) {
        self.image_ledger.flush(&self.device);
        for frame in &mut self.frames {
            frame.release_output();
        }
    }

    fn allocate_output_images(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        for frame in &mut self.frames {
            frame.allocate_output(&self.device, extent, &mut self.image_ledger)?;
        }
        debug!(
            "Allocated {} output image(s) at {}x{}",
            self.frames.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    fn write_binding(&mut self, slot: usize, binding: FrameBinding) -> RhiResult<()> {
        self.frame(slot)?.write_binding(&self.device, binding)
    }

    fn build_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let swapchain = Swapchain::new(
            &self.swapchain_loader,
            &self.surface_loader,
            &self.device,
            self.surface,
            &SwapchainDesc {
                extent,
                vsync: self.vsync,
            },
            &mut self.surface_ledger,
        )?;

        if (swapchain.image_count() as usize) < self.frames.len() {
            warn!(
                "Swapchain has {} images for {} frame slots",
                swapchain.image_count(),
                self.frames.len()
            );
        }

        self.transfer = choose_transfer(
            swapchain.format(),
            self.device.queue_families().compute_supports_graphics,
        )?;
        debug!("Output transfer mode: {:?}", self.transfer);

        if let Some(overlay) = &mut self.overlay {
            let pipeline = GraphicsPipelineBuilder::new()
                .vertex_shader(&overlay.vertex)
                .fragment_shader(&overlay.fragment)
                .vertex_binding(OverlayVertex::binding_description())
                .vertex_attributes(&OverlayVertex::attribute_descriptions())
                .color_attachment_format(swapchain.format())
                .build(&self.device, overlay.layout, &mut self.surface_ledger)?;
            overlay.pipeline = Some(pipeline);
        }

        self.swapchain = Some(swapchain);
        Ok(())
    }
}

impl FrameBackend for VulkanBackend {
    fn overlay_enabled(&self) -> bool {
        self.overlay.is_some()
    }

    fn wait_for_slot(&mut self, slot: usize, timeout: Duration) -> RhiResult<()> {
        let fences = self.frame(slot)?.sync().host_fences(self.overlay_enabled());
        wait_for_fences(&self.device, fences, timeout)
    }

    fn reset_commands(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frame(slot)?;
        self.command_buffer(frame.compute_commands()).reset()?;
        if self.overlay_enabled() {
            self.command_buffer(frame.graphics_commands()).reset()?;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> RhiResult<AcquireStatus> {
        let semaphore = self.frame(slot)?.sync().image_acquired;
        self.swapchain()?.acquire(semaphore, timeout)
    }

    fn reset_fences(&mut self, slot: usize) -> RhiResult<()> {
        let fences = self.frame(slot)?.sync().host_fences(self.overlay_enabled());
        reset_fences(&self.device, fences)
    }

    fn write_payloads(&mut self, slot: usize, payloads: &FramePayloads<'_>) -> RhiResult<()> {
        self.frame(slot)?.write_payloads(payloads)
    }

    fn record_compute(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let frame = self.frame(slot)?;
        let (target, _) = self.swapchain_image(image_index)?;

        let pass = ComputePass {
            pipeline: self.compute.pipeline,
            layout: self.compute.layout,
            descriptor_set: frame.descriptor_set()?,
            output: frame.output()?,
            target,
            target_extent: self.swapchain()?.extent(),
            transfer: self.transfer,
        };
        pass.record(self.command_buffer(frame.compute_commands()))
    }

    fn submit_compute(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frame(slot)?;
        let sync = frame.sync();

        let wait_semaphores = [sync.image_acquired];
        let wait_stages = [ACQUIRE_WAIT_STAGE];
        let signal_semaphores = [sync.compute_finished];
        let command_buffers = [frame.compute_commands()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was recorded by `record_compute`, and the
        // compute fence was reset this frame after the slot's wait.
        unsafe {
            self.device.submit(
                self.device.compute_queue(),
                &[submit_info],
                sync.compute_fence(),
            )
        }
    }

    fn submit_overlay(
        &mut self,
        slot: usize,
        image_index: u32,
        overlay: &OverlayDrawData,
    ) -> RhiResult<()> {
        let stage = self
            .overlay
            .as_ref()
            .ok_or_else(|| RhiError::PipelineError("Overlay stage is disabled".to_string()))?;
        check_overlay_capacity(overlay, stage.max_vertices, stage.max_indices)?;
        let pipeline = stage
            .pipeline
            .ok_or_else(|| RhiError::PipelineError("Overlay pipeline not built".to_string()))?;

        let frame = self.frame(slot)?;
        let extent = self.swapchain()?.extent();
        let (target, target_view) = self.swapchain_image(image_index)?;
        let (vertex_buffer, index_buffer) = frame.overlay_buffer_handles()?;

        if !overlay.is_empty() {
            frame.write_overlay(overlay)?;
        }
        trace!(
            "Frame slot {}: overlay with {} draw command(s)",
            slot,
            overlay.draw_command_count()
        );

        let pass = OverlayPass {
            pipeline,
            layout: stage.layout,
            font_set: stage.font_set,
            target,
            target_view,
            extent,
            vertex_buffer,
            index_buffer,
            draw_data: overlay,
        };
        pass.record(self.command_buffer(frame.graphics_commands()))?;

        let sync = frame.sync();
        let wait_semaphores = [sync.compute_finished];
        let wait_stages = [OVERLAY_WAIT_STAGE];
        let signal_semaphores = [sync.overlay_finished];
        let command_buffers = [frame.graphics_commands()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was just recorded, and the overlay fence
        // was reset this frame after the slot's wait.
        unsafe {
            self.device.submit(
                self.device.graphics_queue(),
                &[submit_info],
                sync.overlay_fence(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus> {
        let wait = self
            .frame(slot)?
            .sync()
            .present_wait(self.overlay_enabled());
        self.swapchain()?
            .present(self.device.graphics_queue().queue, image_index, wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNLIMITED: u32 = u32::MAX;

    #[test]
    fn test_desc_from_default_config() {
        let config = AppConfig::default();
        let desc = VulkanBackendDesc::from_config(&config);

        assert_eq!(desc.slot_count, MAX_FRAMES_IN_FLIGHT);
        assert_eq!(desc.payload_buffer_size, 32768);
        assert!(desc.vsync);

        let overlay = desc.overlay.as_ref().unwrap();
        assert_eq!(overlay.max_vertices, 1 << 16);
        assert_eq!(overlay.max_indices, 1 << 17);

        let frame = desc.frame_resources(UNLIMITED);
        assert_eq!(frame.payload_buffer_size, 32768);
        assert_eq!(frame.overlay_vertex_buffer_size, (1 << 16) * 20);
        assert_eq!(frame.overlay_index_buffer_size, (1 << 17) * 2);
    }

    #[test]
    fn test_desc_without_overlay() {
        let mut config = AppConfig::default();
        config.overlay.enabled = false;
        let desc = VulkanBackendDesc::from_config(&config);

        assert!(desc.overlay.is_none());
        let frame = desc.frame_resources(UNLIMITED);
        assert_eq!(frame.overlay_vertex_buffer_size, 0);
        assert_eq!(frame.overlay_index_buffer_size, 0);
    }

    #[test]
    fn test_payload_buffers_fit_device_uniform_range() {
        let desc = VulkanBackendDesc::from_config(&AppConfig::default());

        // 16 KiB is the minimum maxUniformBufferRange Vulkan guarantees.
        let frame = desc.frame_resources(16384);
        assert_eq!(frame.payload_buffer_size, 16384);
    }

    #[test]
    fn test_font_atlas_extent() {
        let rgba = [0u8; 8 * 4 * 4];
        let font = FontAtlasPixels {
            width: 8,
            height: 4,
            rgba: &rgba,
        };
        assert_eq!(font.extent(), vk::Extent2D { width: 8, height: 4 });
    }
}
