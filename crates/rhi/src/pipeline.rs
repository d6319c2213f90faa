//! Pipeline layouts, the scattering compute pipeline and the overlay
//! graphics pipeline.
//!
//! The graphics pipeline targets dynamic rendering (Vulkan 1.3), so it is
//! created against a color attachment format rather than a render pass.
//!
//! # Example
//!
//! ```no_run
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//! use skyscatter_rhi::pipeline::{create_compute_pipeline, create_pipeline_layout};
//! use skyscatter_rhi::shader::ShaderModule;
//! use skyscatter_rhi::vk;
//!
//! # fn example(
//! #     device: &Device,
//! #     set_layout: vk::DescriptorSetLayout,
//! #     shader: ShaderModule,
//! #     ledger: &mut GpuLedger,
//! # ) -> skyscatter_rhi::RhiResult<()> {
//! let layout = create_pipeline_layout(device, &[set_layout], &[], ledger)?;
//! let pipeline = create_compute_pipeline(device, layout, &shader, ledger)?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};
use crate::shader::{ShaderModule, ShaderStage};

/// Creates a pipeline layout.
pub fn create_pipeline_layout(
    device: &Device,
    descriptor_set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
    ledger: &mut GpuLedger,
) -> RhiResult<vk::PipelineLayout> {
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(descriptor_set_layouts)
        .push_constant_ranges(push_constant_ranges);

    let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
    ledger.record(GpuObject::PipelineLayout(layout));

    debug!(
        "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
        descriptor_set_layouts.len(),
        push_constant_ranges.len()
    );

    Ok(layout)
}

/// Creates a compute pipeline from a compute shader.
pub fn create_compute_pipeline(
    device: &Device,
    layout: vk::PipelineLayout,
    shader: &ShaderModule,
    ledger: &mut GpuLedger,
) -> RhiResult<vk::Pipeline> {
    if shader.stage() != ShaderStage::Compute {
        return Err(RhiError::PipelineError(format!(
            "Compute pipeline needs a compute shader, got {}",
            shader.stage()
        )));
    }

    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(shader.stage_create_info())
        .layout(layout);

    let pipelines = unsafe {
        device
            .handle()
            .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| e)?
    };
    let pipeline = pipelines[0];
    ledger.record(GpuObject::Pipeline(pipeline));

    info!("Created compute pipeline");
    Ok(pipeline)
}

/// Standard alpha blending: `src * src_alpha + dst * (1 - src_alpha)`.
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }
}

/// Builder for alpha-blended 2D graphics pipelines.
///
/// Defaults:
///
/// - Primitive topology: Triangle list
/// - Cull mode: None
/// - No depth attachment
/// - Alpha blending on the single color attachment
/// - Dynamic states: Viewport and Scissor
#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a ShaderModule>,
    fragment_shader: Option<&'a ShaderModule>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    color_attachment_format: Option<vk::Format>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_shader(mut self, shader: &'a ShaderModule) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a ShaderModule) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = Some(format);
        self
    }

    /// Builds the pipeline and records it in `ledger`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader or the color format
    /// is missing, or the Vulkan error if creation fails.
    pub fn build(
        self,
        device: &Device,
        layout: vk::PipelineLayout,
        ledger: &mut GpuLedger,
    ) -> RhiResult<vk::Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;

        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        let color_format = self.color_attachment_format.ok_or_else(|| {
            RhiError::PipelineError("A color attachment format is required".to_string())
        })?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(false)
            .depth_write_enable(false);

        let color_blend_attachments = [alpha_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Dynamic rendering info (Vulkan 1.3)
        let color_formats = [color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)?
        };
        let pipeline = pipelines[0];
        ledger.record(GpuObject::Pipeline(pipeline));

        info!("Created graphics pipeline for {:?}", color_format);
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_blend_attachment() {
        let blend = alpha_blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blend.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_builder_collects_vertex_input() {
        let attributes = [
            vk::VertexInputAttributeDescription::default().location(0),
            vk::VertexInputAttributeDescription::default().location(1),
        ];
        let builder = GraphicsPipelineBuilder::new()
            .vertex_binding(vk::VertexInputBindingDescription::default().stride(24))
            .vertex_attributes(&attributes)
            .color_attachment_format(vk::Format::B8G8R8A8_UNORM);

        assert_eq!(builder.vertex_bindings.len(), 1);
        assert_eq!(builder.vertex_bindings[0].stride, 24);
        assert_eq!(builder.vertex_attributes.len(), 2);
        assert_eq!(
            builder.color_attachment_format,
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert!(builder.vertex_shader.is_none());
    }
}
