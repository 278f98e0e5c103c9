//! Renderer configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{RendererError, RendererResult};

/// Smallest and largest supported number of frames in flight.
pub const MIN_FRAME_COUNT: usize = 2;
pub const MAX_FRAME_COUNT: usize = 4;

/// Number of descriptor tables every terrain pipeline layout declares.
pub const DESCRIPTOR_TABLE_COUNT: u32 = 3;

/// Descriptor set index of each table in the shared pipeline layout.
///
/// The GLSL sources declare the default `{ displacement: 0, constants: 1,
/// color: 2 }` as fixed `set` qualifiers, so that is the only layout
/// [`validate`](Self::validate) accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub displacement: u32,
    pub constants: u32,
    pub color: u32,
}

impl Default for DescriptorLayout {
    fn default() -> Self {
        Self {
            displacement: 0,
            constants: 1,
            color: 2,
        }
    }
}

impl DescriptorLayout {
    /// Rejects duplicate indices, indices outside `0..3` and any layout the
    /// compiled shaders do not declare.
    pub fn validate(&self) -> RendererResult<()> {
        let indices = [self.displacement, self.constants, self.color];
        if let Some(&index) = indices.iter().find(|&&i| i >= DESCRIPTOR_TABLE_COUNT) {
            return Err(RendererError::Config(format!(
                "descriptor set index {} is outside 0..{}",
                index, DESCRIPTOR_TABLE_COUNT
            )));
        }
        let unique: HashSet<u32> = indices.into_iter().collect();
        if unique.len() != indices.len() {
            return Err(RendererError::Config(format!(
                "descriptor set indices must be distinct, got {:?}",
                indices
            )));
        }
        if *self != Self::default() {
            return Err(RendererError::Config(format!(
                "shaders bind displacement, constants and color at sets 0, 1 and 2, got {:?}",
                indices
            )));
        }
        Ok(())
    }
}

/// Planet mesh parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanetConfig {
    pub radius: f32,
    /// Geosphere subdivision level; the generator clamps it to 5.
    pub subdivisions: u32,
    /// Texels per grid cell of the flat height-map grid.
    pub grid_stride: u32,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            radius: 1737.0,
            subdivisions: 10,
            grid_stride: 16,
        }
    }
}

/// Input files.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetPaths {
    pub displacement_map: PathBuf,
    pub color_map: PathBuf,
    /// Directory holding `<program>.<stage>.spv` files.
    pub shader_dir: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            displacement_map: PathBuf::from("assets/ldem_16.tif"),
            color_map: PathBuf::from("assets/lroc_color_poles_4k.tif"),
            shader_dir: PathBuf::from("shaders/spv"),
        }
    }
}

/// Everything [`Renderer::initialize`](crate::Renderer::initialize) needs
/// besides the window.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Frame slots in flight, each with its own command pool, constant
    /// buffer and timeline fence.
    pub frame_count: usize,
    pub descriptor_layout: DescriptorLayout,
    pub clear_color: [f32; 4],
    pub enable_validation: bool,
    pub planet: PlanetConfig,
    pub assets: AssetPaths,
    /// Light ticks per full orbit.
    pub orbit_cycle: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_count: 3,
            descriptor_layout: DescriptorLayout::default(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            enable_validation: cfg!(debug_assertions),
            planet: PlanetConfig::default(),
            assets: AssetPaths::default(),
            orbit_cycle: terrain_scene::DEFAULT_ORBIT_CYCLE,
        }
    }
}

impl RendererConfig {
    /// Checks the configuration before any GPU object is created.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Config`] describing the first invalid field.
    pub fn validate(&self) -> RendererResult<()> {
        if !(MIN_FRAME_COUNT..=MAX_FRAME_COUNT).contains(&self.frame_count) {
            return Err(RendererError::Config(format!(
                "frame_count {} is outside {}..={}",
                self.frame_count, MIN_FRAME_COUNT, MAX_FRAME_COUNT
            )));
        }
        self.descriptor_layout.validate()?;
        if !(self.planet.radius.is_finite() && self.planet.radius > 0.0) {
            return Err(RendererError::Config(format!(
                "planet radius must be positive, got {}",
                self.planet.radius
            )));
        }
        if self.planet.grid_stride == 0 {
            return Err(RendererError::Config("grid_stride must be at least 1".to_string()));
        }
        if self.orbit_cycle == 0 {
            return Err(RendererError::Config("orbit_cycle must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_count, 3);
        assert_eq!(config.clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(config.orbit_cycle, 5760);
    }

    #[test]
    fn test_frame_count_bounds() {
        for (count, ok) in [(1, false), (2, true), (4, true), (5, false)] {
            let config = RendererConfig {
                frame_count: count,
                ..Default::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "frame_count {count}");
        }
    }

    #[test]
    fn test_descriptor_layout_rejects_duplicates() {
        let layout = DescriptorLayout {
            displacement: 0,
            constants: 0,
            color: 2,
        };
        assert!(matches!(layout.validate(), Err(RendererError::Config(_))));
    }

    #[test]
    fn test_descriptor_layout_rejects_out_of_range() {
        let layout = DescriptorLayout {
            displacement: 0,
            constants: 1,
            color: 3,
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_descriptor_layout_permutation_rejected() {
        let config = RendererConfig {
            descriptor_layout: DescriptorLayout {
                displacement: 2,
                constants: 0,
                color: 1,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RendererError::Config(_))));
    }

    #[test]
    fn test_default_layout_matches_shader_sets() {
        let layout = DescriptorLayout::default();
        let declares = |source: &str, set: u32, name: &str| {
            source.contains(&format!(
                "layout(set = {set}, binding = 0) uniform sampler2D {name};"
            ))
        };
        let common = include_str!("../../../shaders/terrain_common.glsl");
        let terrain = include_str!("../../../shaders/terrain.frag");
        let flat = include_str!("../../../shaders/flat.frag");
        let preview = include_str!("../../../shaders/preview.frag");

        assert!(declares(common, layout.displacement, "displacement_map"));
        assert!(common.contains(&format!("layout(set = {}, binding = 0, std140", layout.constants)));
        assert!(declares(terrain, layout.color, "color_map"));
        assert!(declares(flat, layout.color, "color_map"));
        assert!(declares(preview, layout.displacement, "displacement_map"));
        assert!(declares(preview, layout.color, "color_map"));
    }

    #[test]
    fn test_planet_validation() {
        let mut config = RendererConfig::default();
        config.planet.radius = 0.0;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.planet.grid_stride = 0;
        assert!(config.validate().is_err());

        let config = RendererConfig {
            orbit_cycle: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
