//! Command recording for the compute and overlay passes.
//!
//! # Output image and swapchain image layouts
//!
//! ```text
//! compute queue                      output image         swapchain image
//! ---------------------------------  -------------------  ------------------
//! OUTPUT_TO_GENERAL                  UNDEFINED -> GENERAL
//! dispatch                           written
//! OUTPUT_TO_TRANSFER_SRC /           GENERAL -> SRC       UNDEFINED -> DST
//!   SWAPCHAIN_TO_TRANSFER_DST
//! copy or blit                       read                 written
//! SWAPCHAIN_TO_PRESENT /             SRC -> GENERAL       DST -> PRESENT_SRC
//!   OUTPUT_TO_STEADY_STATE
//!
//! graphics queue (overlay)
//! SWAPCHAIN_TO_COLOR_ATTACHMENT                           PRESENT_SRC -> COLOR
//! draw imgui commands                                     blended
//! COLOR_ATTACHMENT_TO_PRESENT                             COLOR -> PRESENT_SRC
//! ```
//!
//! Every transition is undone before the image is used again, so both
//! images end each frame in their steady-state layouts.

use ash::vk;

use skyscatter_rhi::command::{CommandBuffer, ImageTransition};
use skyscatter_rhi::image::{OUTPUT_FORMAT, StorageImage};
use skyscatter_rhi::rendering::{ColorAttachment, RenderingConfig};
use skyscatter_rhi::{RhiError, RhiResult};

use crate::overlay::{INDEX_TYPE, OverlayDrawData};

/// Edge length of the compute kernel's square workgroup.
pub const WORKGROUP_SIZE: u32 = 32;

/// Stage the compute submission waits at for the acquired image.
pub const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::TRANSFER;

/// Stage the overlay submission waits at for the compute result.
pub const OVERLAY_WAIT_STAGE: vk::PipelineStageFlags =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

// =============================================================================
// Barrier Table
// =============================================================================

pub const OUTPUT_TO_GENERAL: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::UNDEFINED,
    new_layout: vk::ImageLayout::GENERAL,
    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
    src_access: vk::AccessFlags::empty(),
    dst_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
    dst_access: vk::AccessFlags::SHADER_WRITE,
};

pub const OUTPUT_TO_TRANSFER_SRC: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::GENERAL,
    new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
    src_access: vk::AccessFlags::SHADER_WRITE,
    dst_stage: vk::PipelineStageFlags::TRANSFER,
    dst_access: vk::AccessFlags::TRANSFER_READ,
};

pub const SWAPCHAIN_TO_TRANSFER_DST: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::UNDEFINED,
    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    src_stage: vk::PipelineStageFlags::TRANSFER,
    src_access: vk::AccessFlags::empty(),
    dst_stage: vk::PipelineStageFlags::TRANSFER,
    dst_access: vk::AccessFlags::TRANSFER_WRITE,
};

pub const SWAPCHAIN_TO_PRESENT: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    src_stage: vk::PipelineStageFlags::TRANSFER,
    src_access: vk::AccessFlags::TRANSFER_WRITE,
    dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    dst_access: vk::AccessFlags::empty(),
};

pub const OUTPUT_TO_STEADY_STATE: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    new_layout: vk::ImageLayout::GENERAL,
    src_stage: vk::PipelineStageFlags::TRANSFER,
    src_access: vk::AccessFlags::TRANSFER_READ,
    dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    dst_access: vk::AccessFlags::empty(),
};

pub const SWAPCHAIN_TO_COLOR_ATTACHMENT: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    src_access: vk::AccessFlags::empty(),
    dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    dst_access: vk::AccessFlags::from_raw(
        vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
    ),
};

pub const COLOR_ATTACHMENT_TO_PRESENT: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    dst_access: vk::AccessFlags::empty(),
};

// =============================================================================
// Grid And Transfer Selection
// =============================================================================

/// Workgroups needed to cover `extent` with 32x32 tiles.
pub fn dispatch_grid(extent: vk::Extent2D) -> [u32; 3] {
    [
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// How the output image reaches the swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Formats match; a raw image copy.
    Copy,
    /// Formats differ (usually BGRA surfaces); a same-size blit converts.
    Blit,
}

/// Picks the transfer for a swapchain of `swapchain_format`.
///
/// Blits are graphics commands, so they are only possible when the compute
/// family supports graphics.
///
/// # Errors
///
/// Returns [`RhiError::SwapchainError`] when a blit is needed but the
/// compute queue cannot record one.
pub fn choose_transfer(
    swapchain_format: vk::Format,
    compute_supports_graphics: bool,
) -> RhiResult<TransferMode> {
    if swapchain_format == OUTPUT_FORMAT {
        Ok(TransferMode::Copy)
    } else if compute_supports_graphics {
        Ok(TransferMode::Blit)
    } else {
        Err(RhiError::SwapchainError(format!(
            "Swapchain format {:?} differs from {:?} and the compute queue cannot blit",
            swapchain_format, OUTPUT_FORMAT
        )))
    }
}

/// The region both images cover.
pub fn transfer_extent(a: vk::Extent2D, b: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: a.width.min(b.width),
        height: a.height.min(b.height),
    }
}

// =============================================================================
// Recording
// =============================================================================

/// Inputs of the compute pass.
pub struct ComputePass {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub output: StorageImage,
    pub target: vk::Image,
    pub target_extent: vk::Extent2D,
    pub transfer: TransferMode,
}

impl ComputePass {
    /// Records the dispatch and the transfer into the acquired image.
    pub fn record(&self, cmd: CommandBuffer<'_>) -> RhiResult<()> {
        let output = self.output.image();
        let [x, y, z] = dispatch_grid(self.output.extent());

        cmd.begin()?;

        cmd.transition_images(&[(output, OUTPUT_TO_GENERAL)]);
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.layout,
            0,
            &[self.descriptor_set],
        );
        cmd.dispatch(x, y, z);

        cmd.transition_images(&[
            (output, OUTPUT_TO_TRANSFER_SRC),
            (self.target, SWAPCHAIN_TO_TRANSFER_DST),
        ]);

        let region = transfer_extent(self.output.extent(), self.target_extent);
        match self.transfer {
            TransferMode::Copy => cmd.copy_image(output, self.target, region),
            TransferMode::Blit => cmd.blit_image(output, self.target, region),
        }

        cmd.transition_images(&[
            (self.target, SWAPCHAIN_TO_PRESENT),
            (output, OUTPUT_TO_STEADY_STATE),
        ]);

        cmd.end()
    }
}

/// Inputs of the overlay pass.
pub struct OverlayPass<'a> {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub font_set: vk::DescriptorSet,
    pub target: vk::Image,
    pub target_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    /// Already uploaded into the two buffers.
    pub draw_data: &'a OverlayDrawData,
}

impl OverlayPass<'_> {
    /// Records one scissored indexed draw per command over the presented
    /// image. Commands whose clip rectangle misses the target are skipped.
    ///
    /// With no commands the command buffer is left empty and the image stays
    /// in the presentation layout.
    pub fn record(&self, cmd: CommandBuffer<'_>) -> RhiResult<()> {
        cmd.begin()?;

        if !self.draw_data.is_empty() {
            cmd.transition_images(&[(self.target, SWAPCHAIN_TO_COLOR_ATTACHMENT)]);

            let rendering = RenderingConfig::from_extent(self.extent)
                .with_color_attachment(ColorAttachment::new(self.target_view))
                .build();
            cmd.begin_rendering(&rendering.info());
            cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            cmd.bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                0,
                &[self.font_set],
            );
            cmd.bind_vertex_buffer(self.vertex_buffer, 0);
            cmd.bind_index_buffer(self.index_buffer, 0, INDEX_TYPE);
            cmd.set_viewport(self.extent);
            cmd.push_constants(
                self.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&self.draw_data.transform()),
            );

            for command in self.draw_data.commands() {
                let Some(scissor) = self.draw_data.scissor(command, self.extent) else {
                    continue;
                };
                cmd.set_scissor(scissor);
                cmd.draw_indexed(
                    command.index_count,
                    command.first_index,
                    command.vertex_offset,
                );
            }
            cmd.end_rendering();

            cmd.transition_images(&[(self.target, COLOR_ATTACHMENT_TO_PRESENT)]);
        }

        cmd.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_grid_rounds_up() {
        assert_eq!(
            dispatch_grid(vk::Extent2D { width: 1600, height: 900 }),
            [50, 29, 1]
        );
        assert_eq!(dispatch_grid(vk::Extent2D { width: 32, height: 32 }), [1, 1, 1]);
        assert_eq!(dispatch_grid(vk::Extent2D { width: 33, height: 1 }), [2, 1, 1]);
    }

    #[test]
    fn test_transitions_pair_up() {
        // Output image: every frame starts and ends in GENERAL.
        assert_eq!(OUTPUT_TO_GENERAL.new_layout, OUTPUT_TO_TRANSFER_SRC.old_layout);
        assert_eq!(
            OUTPUT_TO_TRANSFER_SRC.new_layout,
            OUTPUT_TO_STEADY_STATE.old_layout
        );
        assert_eq!(OUTPUT_TO_STEADY_STATE.new_layout, vk::ImageLayout::GENERAL);

        // Swapchain image: copied into, presented, optionally composited.
        assert_eq!(
            SWAPCHAIN_TO_TRANSFER_DST.new_layout,
            SWAPCHAIN_TO_PRESENT.old_layout
        );
        assert_eq!(
            SWAPCHAIN_TO_PRESENT.new_layout,
            SWAPCHAIN_TO_COLOR_ATTACHMENT.old_layout
        );
        assert_eq!(
            SWAPCHAIN_TO_COLOR_ATTACHMENT.new_layout,
            COLOR_ATTACHMENT_TO_PRESENT.old_layout
        );
        assert_eq!(
            COLOR_ATTACHMENT_TO_PRESENT.new_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn test_acquire_wait_covers_first_swapchain_access() {
        assert_eq!(SWAPCHAIN_TO_TRANSFER_DST.src_stage, ACQUIRE_WAIT_STAGE);
        assert_eq!(SWAPCHAIN_TO_COLOR_ATTACHMENT.src_stage, OVERLAY_WAIT_STAGE);
    }

    #[test]
    fn test_attachment_access_is_read_write() {
        assert!(
            SWAPCHAIN_TO_COLOR_ATTACHMENT
                .dst_access
                .contains(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        );
    }

    #[test]
    fn test_choose_transfer() {
        assert_eq!(
            choose_transfer(vk::Format::R8G8B8A8_UNORM, false).unwrap(),
            TransferMode::Copy
        );
        assert_eq!(
            choose_transfer(vk::Format::B8G8R8A8_UNORM, true).unwrap(),
            TransferMode::Blit
        );
        assert!(matches!(
            choose_transfer(vk::Format::B8G8R8A8_UNORM, false),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_transfer_extent_is_intersection() {
        let a = vk::Extent2D { width: 800, height: 600 };
        let b = vk::Extent2D { width: 640, height: 720 };
        assert_eq!(transfer_extent(a, b), vk::Extent2D { width: 640, height: 600 });
    }
}
