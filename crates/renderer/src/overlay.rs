//! Overlay draw data captured from Dear ImGui.
//!
//! The UI layer builds an imgui frame and hands the resulting
//! [`imgui::DrawData`] to [`OverlayDrawData::capture`], which flattens every
//! draw list into one vertex array, one index array and a list of indexed
//! draw commands with absolute offsets. The overlay pass uploads both arrays
//! into the slot's buffers and records one scissored `draw_indexed` per
//! command.
//!
//! Every command samples the font atlas; the HUD binds no other textures.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use imgui::{DrawCmd, DrawCmdParams, DrawIdx};
use tracing::warn;

use skyscatter_rhi::vertex::OverlayVertex;
use skyscatter_rhi::{RhiError, RhiResult};

/// Texture id imgui reports for the font atlas.
pub const FONT_TEXTURE_ID: usize = 0;

/// Index width matching [`DrawIdx`].
pub const INDEX_TYPE: vk::IndexType = if std::mem::size_of::<DrawIdx>() == 2 {
    vk::IndexType::UINT16
} else {
    vk::IndexType::UINT32
};

/// One indexed draw over the flattened buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayCommand {
    /// Clip rectangle in UI coordinates: min x, min y, max x, max y.
    pub clip_rect: [f32; 4],
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// Vertex shader push constant mapping UI coordinates to clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct OverlayTransform {
    pub scale: [f32; 2],
    pub translate: [f32; 2],
}

impl OverlayTransform {
    /// The transform taking the display rectangle onto [-1, 1] in both axes.
    pub fn from_display(display_pos: [f32; 2], display_size: [f32; 2]) -> Self {
        let scale = display_size.map(|size| if size > 0.0 { 2.0 / size } else { 0.0 });
        Self {
            scale,
            translate: [
                -1.0 - display_pos[0] * scale[0],
                -1.0 - display_pos[1] * scale[1],
            ],
        }
    }
}

/// Draw commands produced by the UI layer for one frame.
#[derive(Clone, Debug)]
pub struct OverlayDrawData {
    display_pos: [f32; 2],
    display_size: [f32; 2],
    framebuffer_scale: [f32; 2],
    vertices: Vec<OverlayVertex>,
    indices: Vec<DrawIdx>,
    commands: Vec<OverlayCommand>,
}

impl Default for OverlayDrawData {
    fn default() -> Self {
        Self {
            display_pos: [0.0, 0.0],
            display_size: [0.0, 0.0],
            framebuffer_scale: [1.0, 1.0],
            vertices: Vec::new(),
            indices: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl OverlayDrawData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with `draw_data`, keeping the allocations.
    pub fn capture(&mut self, draw_data: &imgui::DrawData) {
        self.clear();
        self.display_pos = draw_data.display_pos;
        self.display_size = draw_data.display_size;
        self.framebuffer_scale = draw_data.framebuffer_scale;

        for draw_list in draw_data.draw_lists() {
            let base_vertex = self.vertices.len();
            let base_index = self.indices.len();

            self.vertices.extend(
                draw_list
                    .vtx_buffer()
                    .iter()
                    .map(|v| OverlayVertex::new(v.pos, v.uv, v.col)),
            );
            self.indices.extend_from_slice(draw_list.idx_buffer());

            for command in draw_list.commands() {
                match command {
                    DrawCmd::Elements {
                        count,
                        cmd_params:
                            DrawCmdParams {
                                clip_rect,
                                vtx_offset,
                                idx_offset,
                                ..
                            },
                    } => self.commands.push(OverlayCommand {
                        clip_rect,
                        index_count: count as u32,
                        first_index: (base_index + idx_offset) as u32,
                        vertex_offset: (base_vertex + vtx_offset) as i32,
                    }),
                    DrawCmd::ResetRenderState => {
                        warn!("Overlay: ResetRenderState is not supported, skipped");
                    }
                    DrawCmd::RawCallback { .. } => {
                        warn!("Overlay: raw callbacks are not supported, skipped");
                    }
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.commands.clear();
    }

    /// Number of draw commands the overlay pass records.
    pub fn draw_command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn vertices(&self) -> &[OverlayVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[DrawIdx] {
        &self.indices
    }

    pub fn commands(&self) -> &[OverlayCommand] {
        &self.commands
    }

    pub fn transform(&self) -> OverlayTransform {
        OverlayTransform::from_display(self.display_pos, self.display_size)
    }

    /// Scissor for `command` on a target of `extent`, or `None` when the
    /// clipped area is empty.
    pub fn scissor(&self, command: &OverlayCommand, extent: vk::Extent2D) -> Option<vk::Rect2D> {
        scissor_rect(
            command.clip_rect,
            self.display_pos,
            self.framebuffer_scale,
            extent,
        )
    }

    /// Appends one command drawing `indices` over `vertices`.
    #[cfg(test)]
    pub(crate) fn push_mesh(
        &mut self,
        vertices: &[OverlayVertex],
        indices: &[DrawIdx],
        clip_rect: [f32; 4],
    ) {
        self.commands.push(OverlayCommand {
            clip_rect,
            index_count: indices.len() as u32,
            first_index: self.indices.len() as u32,
            vertex_offset: self.vertices.len() as i32,
        });
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
    }

    #[cfg(test)]
    pub(crate) fn set_display(&mut self, pos: [f32; 2], size: [f32; 2], scale: [f32; 2]) {
        self.display_pos = pos;
        self.display_size = size;
        self.framebuffer_scale = scale;
    }
}

/// Converts a UI clip rectangle to framebuffer pixels and clamps it to
/// `extent`.
pub fn scissor_rect(
    clip_rect: [f32; 4],
    display_pos: [f32; 2],
    framebuffer_scale: [f32; 2],
    extent: vk::Extent2D,
) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - display_pos[0]) * framebuffer_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - display_pos[1]) * framebuffer_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - display_pos[0]) * framebuffer_scale[0]).min(extent.width as f32);
    let max_y = ((clip_rect[3] - display_pos[1]) * framebuffer_scale[1]).min(extent.height as f32);

    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

/// Bytes needed to hold `max_vertices` overlay vertices.
pub fn vertex_buffer_size(max_vertices: usize) -> vk::DeviceSize {
    (max_vertices * std::mem::size_of::<OverlayVertex>()) as vk::DeviceSize
}

/// Bytes needed to hold `max_indices` indices.
pub fn index_buffer_size(max_indices: usize) -> vk::DeviceSize {
    (max_indices * std::mem::size_of::<DrawIdx>()) as vk::DeviceSize
}

/// Fails if `draw_data` holds more vertices or indices than the per-frame
/// buffers were sized for.
pub fn check_overlay_capacity(
    draw_data: &OverlayDrawData,
    max_vertices: usize,
    max_indices: usize,
) -> RhiResult<()> {
    let checks = [
        ("vertices", draw_data.vertices.len(), max_vertices),
        ("indices", draw_data.indices.len(), max_indices),
    ];
    for (what, requested, capacity) in checks {
        if requested > capacity {
            return Err(RhiError::OverlayCapacity {
                what,
                requested,
                capacity,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 200,
        height: 100,
    };

    fn quad(x: f32, y: f32) -> [OverlayVertex; 4] {
        let white = [255; 4];
        [
            OverlayVertex::new([x, y], [0.0, 0.0], white),
            OverlayVertex::new([x + 10.0, y], [1.0, 0.0], white),
            OverlayVertex::new([x + 10.0, y + 10.0], [1.0, 1.0], white),
            OverlayVertex::new([x, y + 10.0], [0.0, 1.0], white),
        ]
    }

    const QUAD_INDICES: [DrawIdx; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn test_transform_maps_display_to_clip_space() {
        let transform = OverlayTransform::from_display([0.0, 0.0], [200.0, 100.0]);
        let apply = |p: [f32; 2]| {
            [
                p[0] * transform.scale[0] + transform.translate[0],
                p[1] * transform.scale[1] + transform.translate[1],
            ]
        };
        assert_eq!(apply([0.0, 0.0]), [-1.0, -1.0]);
        assert_eq!(apply([200.0, 100.0]), [1.0, 1.0]);
        assert_eq!(apply([100.0, 50.0]), [0.0, 0.0]);
        assert_eq!(std::mem::size_of::<OverlayTransform>(), 16);
    }

    #[test]
    fn test_transform_of_empty_display_is_degenerate() {
        let transform = OverlayTransform::from_display([0.0, 0.0], [0.0, 0.0]);
        assert_eq!(transform.scale, [0.0, 0.0]);
        assert_eq!(transform.translate, [-1.0, -1.0]);
    }

    #[test]
    fn test_meshes_get_absolute_offsets() {
        let mut data = OverlayDrawData::new();
        assert!(data.is_empty());
        data.push_mesh(&quad(0.0, 0.0), &QUAD_INDICES, [0.0, 0.0, 200.0, 100.0]);
        data.push_mesh(&quad(20.0, 0.0), &QUAD_INDICES, [0.0, 0.0, 200.0, 100.0]);

        assert_eq!(data.draw_command_count(), 2);
        assert_eq!(data.vertices().len(), 8);
        assert_eq!(data.indices().len(), 12);
        assert_eq!(data.commands()[1].first_index, 6);
        assert_eq!(data.commands()[1].vertex_offset, 4);
        assert_eq!(data.commands()[1].index_count, 6);

        data.clear();
        assert_eq!(data.draw_command_count(), 0);
        assert!(data.vertices().is_empty());
    }

    #[test]
    fn test_scissor_scales_and_clamps() {
        let rect = scissor_rect([10.0, 5.0, 60.0, 30.0], [0.0, 0.0], [2.0, 2.0], EXTENT).unwrap();
        assert_eq!(rect.offset, vk::Offset2D { x: 20, y: 10 });
        assert_eq!(rect.extent, vk::Extent2D { width: 100, height: 50 });

        let clamped =
            scissor_rect([-10.0, -10.0, 500.0, 500.0], [0.0, 0.0], [1.0, 1.0], EXTENT).unwrap();
        assert_eq!(clamped.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(clamped.extent, EXTENT);
    }

    #[test]
    fn test_scissor_offsets_by_display_pos() {
        let rect = scissor_rect([110.0, 60.0, 120.0, 70.0], [100.0, 50.0], [1.0, 1.0], EXTENT);
        assert_eq!(
            rect,
            Some(vk::Rect2D {
                offset: vk::Offset2D { x: 10, y: 10 },
                extent: vk::Extent2D { width: 10, height: 10 },
            })
        );
    }

    #[test]
    fn test_empty_or_offscreen_clip_has_no_scissor() {
        assert_eq!(
            scissor_rect([50.0, 50.0, 50.0, 80.0], [0.0, 0.0], [1.0, 1.0], EXTENT),
            None
        );
        assert_eq!(
            scissor_rect([300.0, 0.0, 400.0, 10.0], [0.0, 0.0], [1.0, 1.0], EXTENT),
            None
        );
    }

    #[test]
    fn test_scissor_uses_captured_display() {
        let mut data = OverlayDrawData::new();
        data.set_display([0.0, 0.0], [100.0, 50.0], [2.0, 2.0]);
        data.push_mesh(&quad(0.0, 0.0), &QUAD_INDICES, [0.0, 0.0, 100.0, 50.0]);

        let command = data.commands()[0];
        assert_eq!(data.scissor(&command, EXTENT).unwrap().extent, EXTENT);
        assert_eq!(data.transform().scale, [0.02, 0.04]);
    }

    #[test]
    fn test_capacity() {
        let mut data = OverlayDrawData::new();
        data.push_mesh(&quad(0.0, 0.0), &QUAD_INDICES, [0.0; 4]);

        assert!(check_overlay_capacity(&data, 4, 6).is_ok());
        assert!(matches!(
            check_overlay_capacity(&data, 3, 6),
            Err(RhiError::OverlayCapacity {
                what: "vertices",
                requested: 4,
                capacity: 3
            })
        ));
        assert!(matches!(
            check_overlay_capacity(&data, 4, 5),
            Err(RhiError::OverlayCapacity { what: "indices", .. })
        ));
        assert_eq!(vertex_buffer_size(2), 40);
        assert_eq!(index_buffer_size(3), 6);
    }

    #[test]
    fn test_capture_from_imgui_frame() {
        let mut ctx = imgui::Context::create();
        ctx.set_ini_filename(None);
        ctx.io_mut().display_size = [200.0, 100.0];
        ctx.io_mut().display_framebuffer_scale = [1.0, 1.0];
        ctx.fonts().build_rgba32_texture();

        let ui = ctx.new_frame();
        ui.window("test")
            .position([10.0, 10.0], imgui::Condition::Always)
            .size([120.0, 60.0], imgui::Condition::Always)
            .build(|| ui.text("sun"));
        let draw_data = ctx.render();

        let mut data = OverlayDrawData::new();
        data.capture(draw_data);

        assert!(!data.is_empty());
        assert_eq!(data.vertices().len(), draw_data.total_vtx_count as usize);
        assert_eq!(data.indices().len(), draw_data.total_idx_count as usize);
        for command in data.commands() {
            let end = command.first_index + command.index_count;
            assert!(end as usize <= data.indices().len());
        }
    }
}
