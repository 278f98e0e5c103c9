//! Procedural mesh generation.
//!
//! Three topologies are produced on the CPU and uploaded once at startup:
//!
//! - [`build_height_map_grid`]: a flat `width x height` lattice of positions;
//!   height is applied later by sampling the displacement map in a shader.
//! - [`build_uv_sphere`]: latitude/longitude rings between two poles.
//! - [`build_geosphere`]: a subdivided icosahedron projected onto a sphere.
//!
//! Sphere vertices carry analytic normals, tangents and equirectangular UVs
//! derived from the spherical angles of the final position.

use std::f32::consts::{PI, TAU};

use bytemuck::Pod;
use glam::{Vec2, Vec3};
use terrain_rhi::vertex::{GridVertex, TerrainVertex};
use tracing::{debug, warn};

/// Highest geosphere subdivision level; larger requests are clamped.
pub const MAX_GEOSPHERE_SUBDIVISIONS: u32 = 5;

const ICOSAHEDRON_X: f32 = 0.525731;
const ICOSAHEDRON_Z: f32 = 0.850651;

const ICOSAHEDRON_POSITIONS: [Vec3; 12] = [
    Vec3::new(-ICOSAHEDRON_X, 0.0, ICOSAHEDRON_Z),
    Vec3::new(ICOSAHEDRON_X, 0.0, ICOSAHEDRON_Z),
    Vec3::new(-ICOSAHEDRON_X, 0.0, -ICOSAHEDRON_Z),
    Vec3::new(ICOSAHEDRON_X, 0.0, -ICOSAHEDRON_Z),
    Vec3::new(0.0, ICOSAHEDRON_Z, ICOSAHEDRON_X),
    Vec3::new(0.0, ICOSAHEDRON_Z, -ICOSAHEDRON_X),
    Vec3::new(0.0, -ICOSAHEDRON_Z, ICOSAHEDRON_X),
    Vec3::new(0.0, -ICOSAHEDRON_Z, -ICOSAHEDRON_X),
    Vec3::new(ICOSAHEDRON_Z, ICOSAHEDRON_X, 0.0),
    Vec3::new(-ICOSAHEDRON_Z, ICOSAHEDRON_X, 0.0),
    Vec3::new(ICOSAHEDRON_Z, -ICOSAHEDRON_X, 0.0),
    Vec3::new(-ICOSAHEDRON_Z, -ICOSAHEDRON_X, 0.0),
];

#[rustfmt::skip]
const ICOSAHEDRON_INDICES: [u32; 60] = [
    1, 4, 0,   4, 9, 0,   4, 5, 9,   8, 5, 4,   1, 8, 4,
    1, 10, 8,  10, 3, 8,  8, 3, 5,   3, 2, 5,   3, 7, 2,
    3, 10, 7,  10, 6, 7,  6, 11, 7,  6, 0, 11,  6, 1, 0,
    10, 1, 6,  11, 0, 9,  2, 11, 9,  5, 2, 9,   11, 2, 7,
];

/// Sub-triangles of one split, indexing `[v0, v1, v2, m01, m12, m02]`.
const SPLIT_PATTERN: [u32; 12] = [0, 3, 5, 3, 4, 5, 5, 4, 2, 3, 1, 4];

/// CPU-side vertex and index arrays for one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    /// Triangle list (or 3-point patch list), 32-bit indices.
    pub indices: Vec<u32>,
}

impl<V: Pod> MeshData<V> {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Builds a `width x height` grid in the z = 0 plane, one vertex per texel.
///
/// Each cell `(x, y)` emits `(x,y) (x+1,y) (x,y+1)` then
/// `(x+1,y) (x+1,y+1) (x,y+1)`. Grids narrower than 2 in either direction
/// have vertices but no cells.
pub fn build_height_map_grid(width: u32, height: u32) -> MeshData<GridVertex> {
    let vertices = (0..height)
        .flat_map(|y| (0..width).map(move |x| GridVertex::new(Vec3::new(x as f32, y as f32, 0.0))))
        .collect::<Vec<_>>();

    let cells = width.saturating_sub(1) as usize * height.saturating_sub(1) as usize;
    let mut indices = Vec::with_capacity(cells * 6);
    for y in 0..height.saturating_sub(1) {
        for x in 0..width.saturating_sub(1) {
            let top_left = x + y * width;
            let top_right = top_left + 1;
            let bottom_left = x + (y + 1) * width;
            let bottom_right = bottom_left + 1;

            indices.extend_from_slice(&[top_left, top_right, bottom_left]);
            indices.extend_from_slice(&[top_right, bottom_right, bottom_left]);
        }
    }

    debug!(
        "Height-map grid {}x{}: {} vertices, {} indices",
        width,
        height,
        vertices.len(),
        indices.len()
    );
    MeshData { vertices, indices }
}

/// Builds a latitude/longitude sphere.
///
/// `slice` is the number of longitude segments (at least 3) and `stack` the
/// number of latitude bands (at least 2). Smaller values are raised with a
/// warning. Each ring repeats its first vertex so the texture seam gets
/// `u = 1`.
///
/// The renderer draws the geosphere; this generator is not used by any
/// pipeline.
pub fn build_uv_sphere(radius: f32, slice: u32, stack: u32) -> MeshData<TerrainVertex> {
    let slice = clamp_min("slice", slice, 3);
    let stack = clamp_min("stack", stack, 2);

    let ring_vertex_count = slice + 1;
    let mut vertices =
        Vec::with_capacity((stack as usize - 1) * ring_vertex_count as usize + 2);

    vertices.push(TerrainVertex::new(
        Vec3::new(0.0, radius, 0.0),
        Vec3::Y,
        Vec3::X,
        Vec2::new(0.0, 0.0),
    ));

    let phi_step = PI / stack as f32;
    let theta_step = TAU / slice as f32;
    for i in 1..stack {
        let phi = i as f32 * phi_step;
        for j in 0..=slice {
            let theta = j as f32 * theta_step;
            vertices.push(spherical_vertex(radius, theta, phi));
        }
    }

    vertices.push(TerrainVertex::new(
        Vec3::new(0.0, -radius, 0.0),
        Vec3::NEG_Y,
        Vec3::X,
        Vec2::new(0.0, 1.0),
    ));

    let mut indices = Vec::with_capacity(slice as usize * stack as usize * 6);

    for i in 1..=slice {
        indices.extend_from_slice(&[0, i + 1, i]);
    }

    let base = 1;
    for i in 0..stack - 2 {
        for j in 0..slice {
            let a = base + i * ring_vertex_count + j;
            let b = base + (i + 1) * ring_vertex_count + j;
            indices.extend_from_slice(&[a, a + 1, b]);
            indices.extend_from_slice(&[b, a + 1, b + 1]);
        }
    }

    let south_pole = vertices.len() as u32 - 1;
    let last_ring = south_pole - ring_vertex_count;
    for i in 0..slice {
        indices.extend_from_slice(&[south_pole, last_ring + i, last_ring + i + 1]);
    }

    debug!(
        "UV sphere r={} slice={} stack={}: {} vertices, {} indices",
        radius,
        slice,
        stack,
        vertices.len(),
        indices.len()
    );
    MeshData { vertices, indices }
}

/// Builds a geosphere of the given radius.
///
/// Starts from an icosahedron and splits every triangle into four,
/// `subdivisions` times (clamped to [`MAX_GEOSPHERE_SUBDIVISIONS`]). Shared
/// edges are not welded: after `k >= 1` levels the mesh has
/// `6 * 20 * 4^(k-1)` vertices and `20 * 4^k` triangles.
pub fn build_geosphere(radius: f32, subdivisions: u32) -> MeshData<TerrainVertex> {
    let levels = if subdivisions > MAX_GEOSPHERE_SUBDIVISIONS {
        warn!(
            "Geosphere subdivision {} clamped to {}",
            subdivisions, MAX_GEOSPHERE_SUBDIVISIONS
        );
        MAX_GEOSPHERE_SUBDIVISIONS
    } else {
        subdivisions
    };

    let mut positions = ICOSAHEDRON_POSITIONS.to_vec();
    let mut indices = ICOSAHEDRON_INDICES.to_vec();
    for _ in 0..levels {
        (positions, indices) = subdivide(&positions, &indices);
    }

    let vertices = positions
        .into_iter()
        .map(|p| {
            let n = p.normalize();
            let position = n * radius;
            let theta = angle_from_xy(position.x, position.z);
            let phi = (position.y / radius).clamp(-1.0, 1.0).acos();
            TerrainVertex::new(position, n, longitude_tangent(theta, phi), uv(theta, phi))
        })
        .collect::<Vec<_>>();

    debug!(
        "Geosphere r={} level={}: {} vertices, {} triangles",
        radius,
        levels,
        vertices.len(),
        indices.len() / 3
    );
    MeshData { vertices, indices }
}

/// One 4-way split of every triangle. Corners and midpoints are emitted per
/// triangle, so shared vertices are duplicated.
fn subdivide(positions: &[Vec3], indices: &[u32]) -> (Vec<Vec3>, Vec<u32>) {
    let triangle_count = indices.len() / 3;
    let mut out_positions = Vec::with_capacity(triangle_count * 6);
    let mut out_indices = Vec::with_capacity(triangle_count * 12);

    for (t, tri) in indices.chunks_exact(3).enumerate() {
        let v0 = positions[tri[0] as usize];
        let v1 = positions[tri[1] as usize];
        let v2 = positions[tri[2] as usize];

        let m0 = (v0 + v1) * 0.5;
        let m1 = (v1 + v2) * 0.5;
        let m2 = (v0 + v2) * 0.5;

        out_positions.extend_from_slice(&[v0, v1, v2, m0, m1, m2]);

        let base = t as u32 * 6;
        out_indices.extend(SPLIT_PATTERN.iter().map(|&i| base + i));
    }

    (out_positions, out_indices)
}

fn spherical_vertex(radius: f32, theta: f32, phi: f32) -> TerrainVertex {
    let position = Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    );
    TerrainVertex::new(
        position,
        position.normalize(),
        longitude_tangent(theta, phi),
        uv(theta, phi),
    )
}

/// Unit dP/dtheta. At the poles the derivative vanishes and +X is used.
fn longitude_tangent(theta: f32, phi: f32) -> Vec3 {
    Vec3::new(-phi.sin() * theta.sin(), 0.0, phi.sin() * theta.cos())
        .try_normalize()
        .unwrap_or(Vec3::X)
}

fn uv(theta: f32, phi: f32) -> Vec2 {
    Vec2::new(theta / TAU, phi / PI)
}

/// Polar angle of `(x, y)` in `[0, 2pi)`.
fn angle_from_xy(x: f32, y: f32) -> f32 {
    let theta = y.atan2(x);
    if theta < 0.0 { theta + TAU } else { theta }
}

fn clamp_min(name: &str, value: u32, min: u32) -> u32 {
    if value < min {
        warn!("UV sphere {} {} raised to {}", name, value, min);
        min
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_from_xy_range() {
        assert_eq!(angle_from_xy(1.0, 0.0), 0.0);
        assert!((angle_from_xy(0.0, 1.0) - PI / 2.0).abs() < 1e-6);
        assert!((angle_from_xy(0.0, -1.0) - 3.0 * PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_icosahedron_is_unit() {
        for p in ICOSAHEDRON_POSITIONS {
            assert!((p.length() - 1.0).abs() < 1e-5, "{p:?}");
        }
        assert!(ICOSAHEDRON_INDICES.iter().all(|&i| i < 12));
    }

    #[test]
    fn test_subdivide_counts() {
        let (positions, indices) = subdivide(&ICOSAHEDRON_POSITIONS, &ICOSAHEDRON_INDICES);
        assert_eq!(positions.len(), 120);
        assert_eq!(indices.len(), 240);
    }

    #[test]
    fn test_subdivide_midpoints() {
        let tri = [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)];
        let (positions, indices) = subdivide(&tri, &[0, 1, 2]);
        assert_eq!(positions[3], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(positions[4], Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(positions[5], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(indices, SPLIT_PATTERN.to_vec());
    }

    #[test]
    fn test_geosphere_clamps_subdivisions() {
        let clamped = build_geosphere(1.0, 10);
        assert_eq!(clamped.triangle_count(), 20 * 4usize.pow(MAX_GEOSPHERE_SUBDIVISIONS));
    }

    #[test]
    fn test_geosphere_pole_tangent_is_finite() {
        // Level 1 contains the midpoint of (0,Z,X)-(0,Z,-X), which projects onto +Y.
        let mesh = build_geosphere(1.0, 1);
        assert!(mesh.vertices.iter().any(|v| (v.normal - Vec3::Y).length() < 1e-5));
        for v in &mesh.vertices {
            assert!(v.tangent.is_finite());
            assert!((v.tangent.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_uv_sphere_raises_degenerate_params() {
        let mesh = build_uv_sphere(1.0, 0, 0);
        // slice 3, stack 2: two poles plus one ring of four.
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.indices.len(), 3 * 3 * 2);
    }

    #[test]
    fn test_uv_sphere_poles() {
        let mesh = build_uv_sphere(2.0, 8, 4);
        assert_eq!(mesh.vertices[0].position, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(
            mesh.vertices.last().map(|v| v.position),
            Some(Vec3::new(0.0, -2.0, 0.0))
        );
    }

    #[test]
    fn test_grid_degenerate_has_no_cells() {
        let mesh = build_height_map_grid(1, 5);
        assert_eq!(mesh.vertices.len(), 5);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn test_mesh_byte_views() {
        let mesh = build_height_map_grid(2, 2);
        assert_eq!(mesh.vertex_bytes().len(), 4 * 12);
        assert_eq!(mesh.index_bytes().len(), 6 * 4);
        assert_eq!(mesh.index_count(), 6);
    }
}
