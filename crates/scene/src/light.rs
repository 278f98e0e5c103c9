//! Orbiting directional light.

use std::f32::consts::TAU;

use glam::Vec4;

/// Ticks per full orbit used by the planet scene.
pub const DEFAULT_ORBIT_CYCLE: u64 = 5760;

/// A light direction that circles the planet in the XZ plane, one step per
/// [`update`](Self::update).
#[derive(Clone, Debug)]
pub struct OrbitLight {
    cycle: u64,
    count: u64,
}

impl Default for OrbitLight {
    fn default() -> Self {
        Self::new(DEFAULT_ORBIT_CYCLE)
    }
}

impl OrbitLight {
    /// Creates a light with `cycle` ticks per orbit. A zero cycle is treated
    /// as one.
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle: cycle.max(1),
            count: 0,
        }
    }

    /// Advances the orbit by one tick.
    pub fn update(&mut self) {
        self.count = self.count.wrapping_add(1);
    }

    /// Ticks elapsed since creation.
    pub fn cycle_count(&self) -> u64 {
        self.count
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Current unit light direction (w = 0).
    pub fn light(&self) -> Vec4 {
        let angle = TAU * (self.count % self.cycle) as f32 / self.cycle as f32;
        let (sin, cos) = angle.sin_cos();
        Vec4::new(cos, 0.0, sin, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_starts_on_x_axis() {
        let light = OrbitLight::default();
        assert_eq!(light.cycle_count(), 0);
        assert!((light.light() - Vec4::new(1.0, 0.0, 0.0, 0.0)).length() < EPSILON);
    }

    #[test]
    fn test_quarter_orbit() {
        let mut light = OrbitLight::new(8);
        light.update();
        light.update();
        assert_eq!(light.cycle_count(), 2);
        assert!((light.light() - Vec4::new(0.0, 0.0, 1.0, 0.0)).length() < EPSILON);
    }

    #[test]
    fn test_wraps_after_full_cycle() {
        let mut light = OrbitLight::new(4);
        let start = light.light();
        for _ in 0..4 {
            light.update();
        }
        assert_eq!(light.cycle_count(), 4);
        assert!((light.light() - start).length() < EPSILON);
    }

    #[test]
    fn test_zero_cycle_is_clamped() {
        let mut light = OrbitLight::new(0);
        light.update();
        assert_eq!(light.cycle(), 1);
        assert!(light.light().is_finite());
    }

    #[test]
    fn test_direction_is_unit() {
        let mut light = OrbitLight::default();
        for _ in 0..1000 {
            light.update();
            assert!((light.light().length() - 1.0).abs() < EPSILON);
        }
    }
}
