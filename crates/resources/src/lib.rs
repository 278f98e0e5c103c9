//! CPU-side resources for the terrain renderer.
//!
//! This crate produces everything that is uploaded once at startup:
//! - Procedural meshes (height-map grid, UV sphere, geosphere)
//! - Decoded RGBA8 images for the displacement and color maps

pub mod error;
pub mod image_data;
pub mod mesh;

pub use error::{ResourceError, ResourceResult};
pub use image_data::{ImageData, load_rgba8};
pub use mesh::{
    MAX_GEOSPHERE_SUBDIVISIONS, MeshData, build_geosphere, build_height_map_grid,
    build_uv_sphere,
};
