//! Command pool and command buffer management.
//!
//! - [`create_command_pool`] creates a resettable pool recorded in a ledger
//! - [`CommandBuffer`] wraps a VkCommandBuffer with recording helpers
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::command::{CommandBuffer, allocate_command_buffer, create_command_pool};
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//!
//! # fn example(device: &Device, ledger: &mut GpuLedger) -> skyscatter_rhi::RhiResult<()> {
//! let family = device.compute_queue().family;
//! let pool = create_command_pool(device, family, ledger)?;
//! let cmd = CommandBuffer::from_handle(device, allocate_command_buffer(device, pool)?);
//!
//! cmd.begin()?;
//! cmd.dispatch(50, 29, 1);
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::ledger::{GpuLedger, GpuObject};

/// Creates a command pool whose buffers can be reset individually.
pub fn create_command_pool(
    device: &Device,
    queue_family_index: u32,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family_index);

    let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
    ledger.record(GpuObject::CommandPool(pool));

    debug!("Created command pool for queue family {}", queue_family_index);
    Ok(pool)
}

/// Allocates one primary command buffer. It is freed with its pool.
pub fn allocate_command_buffer(
    device: &Device,
    pool: vk::CommandPool,
) -> RhiResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.handle().allocate_command_buffers(&alloc_info)? };
    Ok(buffers[0])
}

/// A color image layout transition with its synchronization scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl ImageTransition {
    /// Builds the barrier for a single-mip, single-layer color image.
    pub fn barrier(&self, image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range())
    }
}

/// The whole color aspect of a single-mip, single-layer image.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Single-layer color subresource used by copies and blits.
pub fn color_subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Borrowed command buffer with recording helpers.
#[derive(Clone, Copy)]
pub struct CommandBuffer<'a> {
    device: &'a Device,
    buffer: vk::CommandBuffer,
}

impl<'a> CommandBuffer<'a> {
    /// Wraps an existing command buffer handle.
    #[inline]
    pub fn from_handle(device: &'a Device, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Ends recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }
        Ok(())
    }

    /// Resets the command buffer to the initial state. Its last submission
    /// must have completed.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    // =========================================================================
    // Dynamic Rendering
    // =========================================================================

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[offset]);
        }
    }

    /// Binds an index buffer of `index_type` at `offset`.
    pub fn bind_index_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, offset, index_type);
        }
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_push_constants(self.buffer, layout, stages, offset, data);
        }
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets viewport 0 to cover `extent`.
    pub fn set_viewport(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
        }
    }

    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe {
            self.device.handle().cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    // =========================================================================
    // Draw and Dispatch
    // =========================================================================

    /// Draws one instance of `index_count` indices.
    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                1,
                first_index,
                vertex_offset,
                0,
            );
        }
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device.handle().cmd_dispatch(
                self.buffer,
                group_count_x,
                group_count_y,
                group_count_z,
            );
        }
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Records image layout transitions sharing one pair of stage masks.
    pub fn transition_images(&self, transitions: &[(vk::Image, ImageTransition)]) {
        if transitions.is_empty() {
            return;
        }

        let barriers: Vec<vk::ImageMemoryBarrier<'_>> = transitions
            .iter()
            .map(|(image, transition)| transition.barrier(*image))
            .collect();
        let src_stage = transitions
            .iter()
            .fold(vk::PipelineStageFlags::empty(), |acc, (_, t)| acc | t.src_stage);
        let dst_stage = transitions
            .iter()
            .fold(vk::PipelineStageFlags::empty(), |acc, (_, t)| acc | t.dst_stage);

        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            );
        }
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Copies the full `extent` between two images of identical format.
    pub fn copy_image(&self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::ImageCopy::default()
            .src_subresource(color_subresource_layers())
            .dst_subresource(color_subresource_layers())
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.handle().cmd_copy_image(
                self.buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Copies tightly packed texels from `src` into `dst`, which must be in
    /// TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(color_subresource_layers())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Blits the full `extent` between two images, converting format.
    pub fn blit_image(&self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let corner = vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let region = vk::ImageBlit::default()
            .src_subresource(color_subresource_layers())
            .src_offsets([vk::Offset3D::default(), corner])
            .dst_subresource(color_subresource_layers())
            .dst_offsets([vk::Offset3D::default(), corner]);

        unsafe {
            self.device.handle().cmd_blit_image(
                self.buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::NEAREST,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_transition_barrier_fields() {
        let transition = ImageTransition {
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            src_access: vk::AccessFlags::SHADER_WRITE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            dst_access: vk::AccessFlags::TRANSFER_READ,
        };
        let image = vk::Image::from_raw(42);
        let barrier = transition.barrier(image);

        assert_eq!(barrier.image, image);
        assert_eq!(barrier.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_color_subresource_layers() {
        let layers = color_subresource_layers();
        assert_eq!(layers.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(layers.layer_count, 1);
        assert_eq!(layers.mip_level, 0);
    }
}
