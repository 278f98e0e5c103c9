//! Input-driven scene control: camera movement, draw mode and per-frame
//! shader constants.

use glam::{Mat4, Vec3, Vec4};
use tracing::debug;

use crate::camera::Camera;
use crate::light::OrbitLight;

/// Camera speed in world units per second.
pub const SPEED: f32 = 1000.0;

/// Degrees of rotation per unit of mouse movement.
pub const ROT_ANGLE: f32 = 0.75;

/// Movement and mode flags sampled once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputDirections {
    pub front: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    /// Select [`DrawMode::Solid`].
    pub mode1: bool,
    /// Select [`DrawMode::Wireframe`].
    pub mode2: bool,
    /// Select [`DrawMode::Flat3d`].
    pub mode3: bool,
    /// Select [`DrawMode::Preview2d`].
    pub mode4: bool,
}

impl InputDirections {
    /// Sum of the held directions as a local (forward, left, up) vector.
    pub fn local_direction(&self) -> Vec3 {
        let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;
        Vec3::new(
            axis(self.front, self.back),
            axis(self.left, self.right),
            axis(self.up, self.down),
        )
    }

    /// Mode requested this tick, if any. Higher-numbered flags win.
    pub fn requested_mode(&self) -> Option<DrawMode> {
        [
            (self.mode4, DrawMode::Preview2d),
            (self.mode3, DrawMode::Flat3d),
            (self.mode2, DrawMode::Wireframe),
            (self.mode1, DrawMode::Solid),
        ]
        .into_iter()
        .find_map(|(set, mode)| set.then_some(mode))
    }
}

/// Which pipeline variant draws the terrain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// Tessellated, filled.
    #[default]
    Solid,
    /// Tessellated, wireframe.
    Wireframe,
    /// Untessellated height-map grid.
    Flat3d,
    /// Full-screen preview of the source maps.
    Preview2d,
}

impl DrawMode {
    pub const ALL: [DrawMode; 4] = [
        DrawMode::Solid,
        DrawMode::Wireframe,
        DrawMode::Flat3d,
        DrawMode::Preview2d,
    ];

    /// True for the variants that run the tessellation stages.
    pub fn is_tessellated(self) -> bool {
        matches!(self, DrawMode::Solid | DrawMode::Wireframe)
    }

    pub fn name(self) -> &'static str {
        match self {
            DrawMode::Solid => "solid",
            DrawMode::Wireframe => "wireframe",
            DrawMode::Flat3d => "flat-3d",
            DrawMode::Preview2d => "preview-2d",
        }
    }
}

/// Per-frame values the scene contributes to the constant buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneConstants {
    /// View-projection, already transposed.
    pub view_proj: Mat4,
    pub eye: Vec4,
    pub light: Vec4,
}

/// Owns the camera and light and applies input to them.
#[derive(Debug)]
pub struct SceneController {
    camera: Camera,
    light: OrbitLight,
    draw_mode: DrawMode,
}

impl SceneController {
    pub fn new(camera: Camera, light: OrbitLight) -> Self {
        Self {
            camera,
            light,
            draw_mode: DrawMode::default(),
        }
    }

    /// Moves the camera for every held direction and applies mode flags.
    pub fn handle_directional_input(&mut self, directions: &InputDirections, delta_time: f32) {
        let local = directions.local_direction();
        if local != Vec3::ZERO {
            self.camera.translate(local * SPEED * delta_time);
        }

        if let Some(mode) = directions.requested_mode()
            && mode != self.draw_mode
        {
            debug!("Draw mode {} -> {}", self.draw_mode.name(), mode.name());
            self.draw_mode = mode;
        }
    }

    /// Turns the camera by a mouse delta: yaw by `-ROT_ANGLE * dx`, pitch by
    /// `ROT_ANGLE * dy`.
    pub fn handle_mouse_input(&mut self, dx: i32, dy: i32) {
        self.camera.rotate_pitch(ROT_ANGLE * dy as f32);
        self.camera.rotate_yaw(-ROT_ANGLE * dx as f32);
    }

    /// Returns this frame's constants. The light only advances in the
    /// tessellated modes, one tick per call.
    pub fn update_constants(&mut self) -> SceneConstants {
        if self.draw_mode.is_tessellated() {
            self.light.update();
        }
        SceneConstants {
            view_proj: self.camera.view_projection_transposed(),
            eye: self.camera.eye(),
            light: self.light.light(),
        }
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn light(&self) -> &OrbitLight {
        &self.light
    }
}
