//! Vertex format of the HUD overlay.

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Overlay vertex, laid out like Dear ImGui's `ImDrawVert`.
///
/// # Memory Layout
///
/// - Offset 0: position in UI pixels (8 bytes)
/// - Offset 8: font atlas texture coordinate (8 bytes)
/// - Offset 16: packed RGBA color (4 bytes)
/// - Total size: 20 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec2)
/// - location 1: uv (vec2)
/// - location 2: color (vec4, unpacked from unorm bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub col: [u8; 4],
}

impl OverlayVertex {
    #[inline]
    pub const fn new(pos: [f32; 2], uv: [f32; 2], col: [u8; 4]) -> Self {
        Self { pos, uv, col }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Self, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: std::mem::offset_of!(Self, col) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_vertex_size() {
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 20);
        assert_eq!(OverlayVertex::binding_description().stride, 20);
    }

    #[test]
    fn test_overlay_vertex_attributes() {
        let attributes = OverlayVertex::attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[2].location, 2);
        assert_eq!(attributes[2].format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_color_bytes_follow_uv() {
        let vertex = OverlayVertex::new([1.0, -1.0], [0.5, 0.25], [255, 128, 0, 64]);
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[8..12], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &[255, 128, 0, 64]);
    }
}
