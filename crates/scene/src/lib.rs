//! Scene state for the planet viewer.
//!
//! This crate provides:
//! - A free-flying camera
//! - The orbiting light
//! - The controller that maps input onto both and picks the draw mode

pub mod camera;
pub mod controller;
pub mod light;

pub use camera::Camera;
pub use controller::{
    DrawMode, InputDirections, ROT_ANGLE, SPEED, SceneConstants, SceneController,
};
pub use light::{DEFAULT_ORBIT_CYCLE, OrbitLight};
