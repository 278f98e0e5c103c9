//! Free-flying perspective camera.
//!
//! Left-handed, +Y up. With zero yaw and pitch the camera looks down +Z.
//! Local translation axes are x = forward, y = left, z = up. Positive yaw
//! turns right, positive pitch looks down.

use glam::{Mat4, Vec3, Vec4};

/// Pitch is kept short of straight up/down so the view basis stays defined.
pub const MAX_PITCH_DEGREES: f32 = 89.0;

/// A camera for rendering the scene.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, -5.0), 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl Camera {
    /// Creates a camera at `position` looking down +Z with a 45 degree
    /// vertical field of view.
    pub fn new(position: Vec3, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 45.0_f32.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Yaw in degrees.
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in degrees.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Updates the aspect ratio. Zero-sized extents are ignored.
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Rotates about the world up axis.
    pub fn rotate_yaw(&mut self, degrees: f32) {
        self.yaw += degrees;
    }

    /// Rotates about the camera's right axis, clamped to +-89 degrees.
    pub fn rotate_pitch(&mut self, degrees: f32) {
        self.pitch = (self.pitch + degrees).clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);
    }

    /// Moves by `local`, expressed as (forward, left, up).
    pub fn translate(&mut self, local: Vec3) {
        self.position += self.forward() * local.x + self.left() * local.y + self.up() * local.z;
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.to_radians().sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.to_radians().sin_cos();
        Vec3::new(cos_pitch * sin_yaw, -sin_pitch, cos_pitch * cos_yaw)
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        Vec3::Y.cross(self.forward()).normalize()
    }

    pub fn left(&self) -> Vec3 {
        -self.right()
    }

    /// Get the up direction vector.
    pub fn up(&self) -> Vec3 {
        self.forward().cross(self.right())
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_lh(self.position, self.forward(), self.up())
    }

    /// Perspective projection with depth in `[0, 1]`.
    ///
    /// Clip-space Y points up; the renderer flips the viewport for Vulkan.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection transposed, as uploaded to `row_major` uniform blocks.
    pub fn view_projection_transposed(&self) -> Mat4 {
        self.view_projection_matrix().transpose()
    }

    /// Eye position as a point (w = 1).
    pub fn eye(&self) -> Vec4 {
        self.position.extend(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_default_basis() {
        let camera = Camera::default();
        assert!((camera.forward() - Vec3::Z).length() < EPSILON);
        assert!((camera.right() - Vec3::X).length() < EPSILON);
        assert!((camera.up() - Vec3::Y).length() < EPSILON);
        assert!((camera.left() + Vec3::X).length() < EPSILON);
    }

    #[test]
    fn test_positive_yaw_turns_right() {
        let mut camera = Camera::default();
        camera.rotate_yaw(90.0);
        assert!((camera.forward() - Vec3::X).length() < EPSILON);
    }

    #[test]
    fn test_positive_pitch_looks_down() {
        let mut camera = Camera::default();
        camera.rotate_pitch(30.0);
        assert!(camera.forward().y < 0.0);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = Camera::default();
        camera.rotate_pitch(500.0);
        assert_eq!(camera.pitch(), MAX_PITCH_DEGREES);
        camera.rotate_pitch(-1000.0);
        assert_eq!(camera.pitch(), -MAX_PITCH_DEGREES);
    }

    #[test]
    fn test_translate_uses_local_axes() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0, 0.1, 100.0);
        camera.rotate_yaw(90.0);
        camera.translate(Vec3::new(2.0, 0.0, 0.0));
        assert!((camera.position - Vec3::new(2.0, 0.0, 0.0)).length() < EPSILON);
        camera.translate(Vec3::new(0.0, 0.0, 3.0));
        assert!((camera.position - Vec3::new(2.0, 3.0, 0.0)).length() < EPSILON);
    }

    #[test]
    fn test_view_projection_maps_target_to_center() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, -10.0), 1.0, 0.1, 100.0);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < EPSILON && ndc.y.abs() < EPSILON);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_transposed_and_eye() {
        let camera = Camera::default();
        assert_eq!(
            camera.view_projection_transposed(),
            camera.view_projection_matrix().transpose()
        );
        assert_eq!(camera.eye(), Vec4::new(0.0, 0.0, -5.0, 1.0));
    }

    #[test]
    fn test_set_viewport_size_ignores_zero() {
        let mut camera = Camera::default();
        camera.set_viewport_size(800, 400);
        assert_eq!(camera.aspect(), 2.0);
        camera.set_viewport_size(0, 400);
        assert_eq!(camera.aspect(), 2.0);
    }
}
