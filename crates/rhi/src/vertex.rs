//! Vertex data structures and input descriptions.
//!
//! - [`TerrainVertex`] feeds the tessellated planet pipelines
//! - [`GridVertex`] feeds the flat height-map grid

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Planet surface vertex.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tangent (12 bytes)
/// - Offset 36: uv (8 bytes)
/// - Total size: 44 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec3)
/// - location 1: normal (vec3)
/// - location 2: tangent (vec3)
/// - location 3: uv (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: Vec3,
    /// Unit surface normal.
    pub normal: Vec3,
    /// Unit tangent along increasing longitude.
    pub tangent: Vec3,
    /// Equirectangular texture coordinate, both axes in `[0, 1]`.
    pub uv: Vec2,
}

impl TerrainVertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tangent: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            tangent,
            uv,
        }
    }

    /// Vertex with only a position set.
    #[inline]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            tangent: Vec3::ZERO,
            uv: Vec2::ZERO,
        }
    }

    /// Binding 0, per-vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 24,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32_SFLOAT,
                offset: 36,
            },
        ]
    }
}

/// Height-map grid vertex: a position in the `z = 0` plane.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    pub position: Vec3,
}

impl GridVertex {
    #[inline]
    pub const fn new(position: Vec3) -> Self {
        Self { position }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 1] {
        [vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_vertex_size() {
        // 3 x Vec3 (36) + Vec2 (8)
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 44);
        assert_eq!(TerrainVertex::binding_description().stride, 44);
    }

    #[test]
    fn test_terrain_vertex_offsets() {
        use std::mem::offset_of;

        let attrs = TerrainVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset as usize, offset_of!(TerrainVertex, position));
        assert_eq!(attrs[1].offset as usize, offset_of!(TerrainVertex, normal));
        assert_eq!(attrs[2].offset as usize, offset_of!(TerrainVertex, tangent));
        assert_eq!(attrs[3].offset as usize, offset_of!(TerrainVertex, uv));
        assert_eq!(attrs[3].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_terrain_vertex_locations_are_sequential() {
        let attrs = TerrainVertex::attribute_descriptions();
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
            assert_eq!(attr.binding, 0);
        }
    }

    #[test]
    fn test_grid_vertex_layout() {
        assert_eq!(std::mem::size_of::<GridVertex>(), 12);
        let attrs = GridVertex::attribute_descriptions();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_terrain_vertex_bytes() {
        let vertices = [
            TerrainVertex::at(Vec3::X),
            TerrainVertex::new(Vec3::Y, Vec3::Y, Vec3::X, Vec2::new(0.5, 0.0)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 88);
    }
}
