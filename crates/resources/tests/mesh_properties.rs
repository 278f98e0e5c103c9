//! Structural properties of the generated meshes.

use glam::Vec3;
use terrain_resources::{build_geosphere, build_height_map_grid, build_uv_sphere};

const EPSILON: f32 = 1e-3;

#[test]
fn test_geosphere_counts_per_level() {
    let level0 = build_geosphere(1.0, 0);
    assert_eq!(level0.vertices.len(), 12);
    assert_eq!(level0.triangle_count(), 20);

    for k in 1..=5u32 {
        let mesh = build_geosphere(1.0, k);
        assert_eq!(mesh.triangle_count(), 20 * 4usize.pow(k), "level {k}");
        assert_eq!(mesh.vertices.len(), 6 * 20 * 4usize.pow(k - 1), "level {k}");
        // No welding: the vertex array is 6x the previous level's triangles.
        assert_eq!(
            mesh.vertices.len(),
            6 * build_geosphere(1.0, k - 1).triangle_count()
        );
    }
}

#[test]
fn test_geosphere_on_radius() {
    let radius = 1737.0;
    let mesh = build_geosphere(radius, 3);
    for v in &mesh.vertices {
        assert!(
            (v.position.length() - radius).abs() < radius * 1e-5,
            "{:?}",
            v.position
        );
        assert!((v.normal.length() - 1.0).abs() < EPSILON);
        assert!((v.normal * radius - v.position).length() < radius * 1e-5);
        assert!((0.0..=1.0).contains(&v.uv.x) && (0.0..=1.0).contains(&v.uv.y));
    }
    assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
}

#[test]
fn test_uv_sphere_on_radius() {
    let radius = 5.0;
    let mesh = build_uv_sphere(radius, 16, 8);
    for v in &mesh.vertices {
        assert!((v.position.length() - radius).abs() < EPSILON, "{:?}", v.position);
        assert!(v.tangent.dot(v.normal).abs() < EPSILON);
    }
}

#[test]
fn test_uv_sphere_counts_and_indices() {
    let (slice, stack) = (12u32, 6u32);
    let mesh = build_uv_sphere(1.0, slice, stack);
    assert_eq!(
        mesh.vertices.len() as u32,
        2 + (stack - 1) * (slice + 1)
    );
    // Two caps plus (stack - 2) bands of quads.
    assert_eq!(
        mesh.triangle_count() as u32,
        2 * slice + (stack - 2) * slice * 2
    );
    assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
}

#[test]
fn test_grid_index_validity() {
    let (w, h) = (7u32, 5u32);
    let mesh = build_height_map_grid(w, h);

    assert_eq!(mesh.vertices.len() as u32, w * h);
    assert_eq!(mesh.indices.len() as u32, (w - 1) * (h - 1) * 6);
    assert!(mesh.indices.iter().all(|&i| i < w * h));

    let mut covered = vec![0u32; ((w - 1) * (h - 1)) as usize];
    for tri in mesh.indices.chunks_exact(3) {
        let p: Vec<Vec3> = tri
            .iter()
            .map(|&i| mesh.vertices[i as usize].position)
            .collect();

        // Same winding everywhere: all normals point the same way along z.
        let normal = (p[1] - p[0]).cross(p[2] - p[0]);
        assert!(normal.z > 0.0, "{tri:?}");

        let min_x = p.iter().map(|v| v.x).fold(f32::MAX, f32::min) as u32;
        let min_y = p.iter().map(|v| v.y).fold(f32::MAX, f32::min) as u32;
        covered[(min_y * (w - 1) + min_x) as usize] += 1;
    }
    assert!(covered.iter().all(|&n| n == 2));
}
