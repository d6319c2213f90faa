//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! The overlay draws straight into the swapchain image on top of the
//! transferred compute output, so attachments default to `LOAD`/`STORE`.
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::command::CommandBuffer;
//! use skyscatter_rhi::rendering::{ColorAttachment, RenderingConfig};
//! use skyscatter_rhi::vk;
//!
//! # fn example(swapchain_view: vk::ImageView, extent: vk::Extent2D, cmd: &CommandBuffer) {
//! let bundle = RenderingConfig::from_extent(extent)
//!     .with_color_attachment(ColorAttachment::new(swapchain_view))
//!     .build();
//!
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// A color attachment for dynamic rendering.
///
/// # Default Values
///
/// - `layout`: `COLOR_ATTACHMENT_OPTIMAL`
/// - `load_op`: `LOAD`
/// - `store_op`: `STORE`
#[derive(Clone, Copy)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    /// Used only when `load_op` is `CLEAR`.
    pub clear_value: vk::ClearColorValue,
}

impl ColorAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }
    }

    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: self.clear_value,
            })
    }
}

impl std::fmt::Debug for ColorAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ClearColorValue is a union; every constructor writes float32.
        let clear_color = unsafe { self.clear_value.float32 };
        f.debug_struct("ColorAttachment")
            .field("image_view", &self.image_view)
            .field("layout", &self.layout)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .field("clear_value", &clear_color)
            .finish()
    }
}

/// Render area and attachments for one `vkCmdBeginRendering`.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    render_area: vk::Rect2D,
    color_attachments: Vec<ColorAttachment>,
}

impl RenderingConfig {
    /// Renders to the full `extent`, starting at the origin.
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            color_attachments: Vec::new(),
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            render_area: self.render_area,
        }
    }
}

/// `VkRenderingInfo` backing storage.
///
/// The attachment array must outlive the `VkRenderingInfo` pointing at it.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments)
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_color_attachment_defaults_to_load_store() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_bundle_info_covers_extent() {
        let view = vk::ImageView::from_raw(7);
        let extent = vk::Extent2D {
            width: 1600,
            height: 900,
        };
        let config = RenderingConfig::from_extent(extent)
            .with_color_attachment(ColorAttachment::new(view));

        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.render_area.extent, extent);
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.color_attachment_count, 1);
        assert_eq!(bundle.color_attachments()[0].image_view, view);
        assert_eq!(
            bundle.color_attachments()[0].load_op,
            vk::AttachmentLoadOp::LOAD
        );
    }
}
