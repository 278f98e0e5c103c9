//! Constant buffer layout shared with the terrain shaders.
//!
//! Matches the `TerrainConstants` uniform block (std140, `row_major`) declared
//! in every shader under `shaders/`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use terrain_scene::SceneConstants;

/// Per-frame constants written into the current slot's constant buffer.
///
/// # Memory Layout
///
/// - Offset 0: transposed view-projection (64 bytes)
/// - Offset 64: eye position, w = 1 (16 bytes)
/// - Offset 80: displacement map height, width (8 bytes)
/// - Offset 88: padding (8 bytes)
/// - Offset 96: light direction, w = 0 (16 bytes)
/// - Total size: 112 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainConstants {
    pub view_proj: Mat4,
    pub eye: Vec4,
    /// Displacement map height in texels.
    pub height: i32,
    /// Displacement map width in texels.
    pub width: i32,
    pub _padding: [i32; 2],
    pub light: Vec4,
}

impl TerrainConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Combines the scene state with the displacement map dimensions.
    pub fn new(scene: SceneConstants, map_width: u32, map_height: u32) -> Self {
        Self {
            view_proj: scene.view_proj,
            eye: scene.eye,
            height: map_height as i32,
            width: map_width as i32,
            _padding: [0; 2],
            light: scene.light,
        }
    }
}
