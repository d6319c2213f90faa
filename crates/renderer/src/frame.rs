//! Frame resource sets.
//!
//! Each in-flight slot owns everything one frame writes or records:
//!
//! ```text
//! FrameResourceSet
//! ├── camera uniform buffer      (main ledger)
//! ├── atmosphere uniform buffer  (main ledger)
//! ├── overlay vertex buffer      (main ledger, overlay only)
//! ├── overlay index buffer       (main ledger, overlay only)
//! ├── compute pool + buffer      (main ledger)
//! ├── graphics pool + buffer     (main ledger)
//! ├── fences + semaphores        (main ledger)
//! ├── descriptor set             (attached later, freed with the pool)
//! └── output image + view        (image ledger, rebuilt on resize)
//! ```
//!
//! The sets are created before the descriptor pool so that a flush frees
//! the pool, and with it the sets, before the buffers they point at.
//!
//! A slot is only rewritten after its fences from the previous use have
//! been observed signaled.

use ash::vk;
use tracing::debug;

use skyscatter_rhi::buffer::HostBuffer;
use skyscatter_rhi::command::{allocate_command_buffer, create_command_pool};
use skyscatter_rhi::descriptor::{write_storage_image, write_uniform_buffer};
use skyscatter_rhi::device::Device;
use skyscatter_rhi::image::StorageImage;
use skyscatter_rhi::ledger::GpuLedger;
use skyscatter_rhi::sync::FrameSync;
use skyscatter_rhi::{RhiError, RhiResult};

use crate::backend::{FrameBinding, FramePayloads};
use crate::overlay::OverlayDrawData;

/// Sizes of the per-slot buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameResourceDesc {
    /// Size of each uniform buffer.
    pub payload_buffer_size: vk::DeviceSize,
    /// Size of the overlay vertex buffer; 0 disables both overlay buffers.
    pub overlay_vertex_buffer_size: vk::DeviceSize,
    pub overlay_index_buffer_size: vk::DeviceSize,
}

impl FrameResourceDesc {
    fn has_overlay(&self) -> bool {
        self.overlay_vertex_buffer_size > 0 && self.overlay_index_buffer_size > 0
    }
}

struct OverlayBuffers {
    vertices: HostBuffer,
    indices: HostBuffer,
}

/// Per-slot GPU resources.
pub struct FrameResourceSet {
    index: usize,
    camera_buffer: HostBuffer,
    atmosphere_buffer: HostBuffer,
    overlay: Option<OverlayBuffers>,
    compute_commands: vk::CommandBuffer,
    graphics_commands: vk::CommandBuffer,
    descriptor_set: vk::DescriptorSet,
    sync: FrameSync,
    output: Option<StorageImage>,
}

impl FrameResourceSet {
    /// Creates the extent-independent resources of slot `index`.
    ///
    /// The descriptor set is attached by [`Self::attach_descriptor_set`]
    /// and the output image allocated by [`Self::allocate_output`].
    pub fn new(
        device: &Device,
        index: usize,
        desc: &FrameResourceDesc,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        let uniform = vk::BufferUsageFlags::UNIFORM_BUFFER;
        let camera_buffer = HostBuffer::new(
            device,
            "camera uniform",
            uniform,
            desc.payload_buffer_size,
            ledger,
        )?;
        let atmosphere_buffer = HostBuffer::new(
            device,
            "atmosphere uniform",
            uniform,
            desc.payload_buffer_size,
            ledger,
        )?;
        let overlay = if desc.has_overlay() {
            Some(OverlayBuffers {
                vertices: HostBuffer::new(
                    device,
                    "overlay vertices",
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                    desc.overlay_vertex_buffer_size,
                    ledger,
                )?,
                indices: HostBuffer::new(
                    device,
                    "overlay indices",
                    vk::BufferUsageFlags::INDEX_BUFFER,
                    desc.overlay_index_buffer_size,
                    ledger,
                )?,
            })
        } else {
            None
        };

        let compute_pool = create_command_pool(device, device.compute_queue().family, ledger)?;
        let compute_commands = allocate_command_buffer(device, compute_pool)?;
        let graphics_pool = create_command_pool(device, device.graphics_queue().family, ledger)?;
        let graphics_commands = allocate_command_buffer(device, graphics_pool)?;

        let sync = FrameSync::new(device, ledger)?;

        debug!("Created frame resource set {}", index);
        Ok(Self {
            index,
            camera_buffer,
            atmosphere_buffer,
            overlay,
            compute_commands,
            graphics_commands,
            descriptor_set: vk::DescriptorSet::null(),
            sync,
            output: None,
        })
    }

    /// Takes `descriptor_set` as this slot's compute set and points its
    /// uniform bindings at the slot's buffers.
    pub fn attach_descriptor_set(
        &mut self,
        device: &Device,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<()> {
        self.descriptor_set = descriptor_set;
        self.write_binding(device, FrameBinding::CameraUniform)?;
        self.write_binding(device, FrameBinding::AtmosphereUniform)
    }

    /// Allocates the output image at `extent`, recording it in `ledger`.
    ///
    /// The previous image, if any, must already have been destroyed by
    /// flushing that ledger.
    pub fn allocate_output(
        &mut self,
        device: &Device,
        extent: vk::Extent2D,
        ledger: &mut GpuLedger,
    ) -> RhiResult<()> {
        self.output = Some(StorageImage::new(device, "output image", extent, ledger)?);
        Ok(())
    }

    /// Forgets the output image after its ledger was flushed.
    pub fn release_output(&mut self) {
        self.output = None;
    }

    /// Points one descriptor binding at this slot's resource.
    ///
    /// # Errors
    ///
    /// Returns an error for [`FrameBinding::OutputImage`] when no output
    /// image is allocated.
    pub fn write_binding(&self, device: &Device, binding: FrameBinding) -> RhiResult<()> {
        match binding {
            FrameBinding::CameraUniform => write_uniform_buffer(
                device,
                self.descriptor_set()?,
                binding.index(),
                self.camera_buffer.handle(),
                self.camera_buffer.size(),
            ),
            FrameBinding::AtmosphereUniform => write_uniform_buffer(
                device,
                self.descriptor_set()?,
                binding.index(),
                self.atmosphere_buffer.handle(),
                self.atmosphere_buffer.size(),
            ),
            FrameBinding::OutputImage => {
                let output = self.output()?;
                write_storage_image(device, self.descriptor_set()?, binding.index(), output.view());
            }
        }
        Ok(())
    }

    /// Overwrites both uniform buffers.
    pub fn write_payloads(&self, payloads: &FramePayloads<'_>) -> RhiResult<()> {
        self.camera_buffer.write(payloads.camera)?;
        self.atmosphere_buffer.write(payloads.atmosphere)
    }

    /// Overwrites the start of both overlay buffers.
    pub fn write_overlay(&self, draw_data: &OverlayDrawData) -> RhiResult<()> {
        let overlay = self.overlay_buffers()?;
        overlay
            .vertices
            .write(bytemuck::cast_slice(draw_data.vertices()))?;
        overlay.indices.write(bytemuck::cast_slice(draw_data.indices()))
    }

    #[inline]
    pub fn compute_commands(&self) -> vk::CommandBuffer {
        self.compute_commands
    }

    #[inline]
    pub fn graphics_commands(&self) -> vk::CommandBuffer {
        self.graphics_commands
    }

    pub fn descriptor_set(&self) -> RhiResult<vk::DescriptorSet> {
        if self.descriptor_set == vk::DescriptorSet::null() {
            return Err(RhiError::PipelineError(format!(
                "Frame {} has no descriptor set",
                self.index
            )));
        }
        Ok(self.descriptor_set)
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    pub fn output(&self) -> RhiResult<StorageImage> {
        self.output.ok_or_else(|| {
            RhiError::PipelineError(format!("Frame {} has no output image", self.index))
        })
    }

    /// Vertex and index buffer handles of the overlay stage.
    pub fn overlay_buffer_handles(&self) -> RhiResult<(vk::Buffer, vk::Buffer)> {
        let overlay = self.overlay_buffers()?;
        Ok((overlay.vertices.handle(), overlay.indices.handle()))
    }

    fn overlay_buffers(&self) -> RhiResult<&OverlayBuffers> {
        self.overlay.as_ref().ok_or_else(|| {
            RhiError::PipelineError(format!("Frame {} has no overlay buffers", self.index))
        })
    }
}

/// Creates `count` frame resource sets. Descriptor sets are attached by
/// [`attach_descriptor_sets`] once the pool exists.
pub fn create_frame_sets(
    device: &Device,
    count: usize,
    desc: &FrameResourceDesc,
    ledger: &mut GpuLedger,
) -> RhiResult<Vec<FrameResourceSet>> {
    (0..count)
        .map(|index| FrameResourceSet::new(device, index, desc, ledger))
        .collect()
}

/// Gives each frame one of `descriptor_sets`, in slot order.
pub fn attach_descriptor_sets(
    device: &Device,
    frames: &mut [FrameResourceSet],
    descriptor_sets: &[vk::DescriptorSet],
) -> RhiResult<()> {
    if descriptor_sets.len() < frames.len() {
        return Err(RhiError::PipelineError(format!(
            "{} descriptor sets for {} frames",
            descriptor_sets.len(),
            frames.len()
        )));
    }

    for (frame, &set) in frames.iter_mut().zip(descriptor_sets) {
        frame.attach_descriptor_set(device, set)?;
    }
    Ok(())
}
