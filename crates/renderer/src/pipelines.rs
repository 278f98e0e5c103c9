//! Terrain pipeline variants and their shared layout.
//!
//! Every variant binds the same three descriptor tables, so one
//! [`PipelineLayout`] serves all four pipelines:
//!
//! | table        | contents                          | stages                  |
//! |--------------|-----------------------------------|-------------------------|
//! | displacement | height map + immutable sampler    | vertex, tessellation, fragment |
//! | constants    | [`TerrainConstants`] uniform      | vertex, tessellation, fragment |
//! | color        | color map + immutable sampler     | fragment                |
//!
//! Set indices come from [`DescriptorLayout`]; each table holds a single
//! binding 0.
//!
//! [`TerrainConstants`]: crate::ubo::TerrainConstants

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use terrain_rhi::RhiResult;
use terrain_rhi::descriptor::{DescriptorSetLayout, TERRAIN_SHADER_STAGES, TableResource};
use terrain_rhi::device::Device;
use terrain_rhi::pipeline::{
    CullMode, GraphicsPipelineDesc, Pipeline, PipelineLayout, PolygonMode, RasterState, Topology,
    VertexInput,
};
use terrain_rhi::sampler::Sampler;
use terrain_rhi::shader::{Shader, ShaderStage};
use terrain_rhi::vertex::{GridVertex, TerrainVertex};
use terrain_scene::DrawMode;

use crate::config::DescriptorLayout;
use crate::depth_buffer::DEPTH_FORMAT;

/// Control points per tessellation patch.
pub const PATCH_CONTROL_POINTS: u32 = 3;

const TESSELLATED_STAGES: &[ShaderStage] = &[
    ShaderStage::Vertex,
    ShaderStage::TessControl,
    ShaderStage::TessEvaluation,
    ShaderStage::Fragment,
];
const RASTER_STAGES: &[ShaderStage] = &[ShaderStage::Vertex, ShaderStage::Fragment];

/// The four pipelines the renderer can draw with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Tessellated planet, filled.
    TessSolid,
    /// Tessellated planet, edges only.
    TessWireframe,
    /// Height-map grid displaced in the vertex stage.
    Flat3d,
    /// Full-screen triangle showing the color and height maps.
    FullScreen2d,
}

/// Vertex buffer layout a variant consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexLayout {
    Terrain,
    Grid,
    /// Vertices are generated from the vertex index.
    None,
}

/// Fixed-function state and shader program of one variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub name: &'static str,
    /// Shader file stem, `<program>.<stage>.spv`.
    pub program: &'static str,
    pub stages: &'static [ShaderStage],
    pub vertex_layout: VertexLayout,
    pub raster: RasterState,
}

const PATCHES: Topology = Topology::PatchList {
    control_points: PATCH_CONTROL_POINTS,
};

impl PipelineVariant {
    pub const ALL: [PipelineVariant; 4] = [
        PipelineVariant::TessSolid,
        PipelineVariant::TessWireframe,
        PipelineVariant::Flat3d,
        PipelineVariant::FullScreen2d,
    ];

    /// Variant that renders `mode`.
    pub fn for_mode(mode: DrawMode) -> Self {
        match mode {
            DrawMode::Solid => PipelineVariant::TessSolid,
            DrawMode::Wireframe => PipelineVariant::TessWireframe,
            DrawMode::Flat3d => PipelineVariant::Flat3d,
            DrawMode::Preview2d => PipelineVariant::FullScreen2d,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_tessellated(self) -> bool {
        matches!(
            self,
            PipelineVariant::TessSolid | PipelineVariant::TessWireframe
        )
    }

    /// Pipeline description, independent of any device.
    pub fn describe(self) -> PipelineDesc {
        match self {
            PipelineVariant::TessSolid => PipelineDesc {
                name: "terrain-solid",
                program: "terrain",
                stages: TESSELLATED_STAGES,
                vertex_layout: VertexLayout::Terrain,
                raster: RasterState {
                    topology: PATCHES,
                    polygon_mode: PolygonMode::Fill,
                    cull_mode: CullMode::Back,
                    depth_test: true,
                },
            },
            PipelineVariant::TessWireframe => {
                let solid = PipelineVariant::TessSolid.describe();
                PipelineDesc {
                    name: "terrain-wireframe",
                    raster: RasterState {
                        polygon_mode: PolygonMode::Line,
                        ..solid.raster
                    },
                    ..solid
                }
            }
            PipelineVariant::Flat3d => PipelineDesc {
                name: "flat-3d",
                program: "flat",
                stages: RASTER_STAGES,
                vertex_layout: VertexLayout::Grid,
                raster: RasterState {
                    topology: Topology::TriangleList,
                    polygon_mode: PolygonMode::Fill,
                    cull_mode: CullMode::Back,
                    depth_test: true,
                },
            },
            PipelineVariant::FullScreen2d => PipelineDesc {
                name: "preview-2d",
                program: "preview",
                stages: RASTER_STAGES,
                vertex_layout: VertexLayout::None,
                raster: RasterState {
                    topology: Topology::TriangleList,
                    polygon_mode: PolygonMode::Fill,
                    cull_mode: CullMode::None,
                    depth_test: false,
                },
            },
        }
    }
}

/// The three descriptor set layouts plus the pipeline layout over them.
///
/// Owns the immutable samplers, which must outlive the set layouts.
pub struct TerrainLayouts {
    pipeline_layout: PipelineLayout,
    displacement: DescriptorSetLayout,
    constants: DescriptorSetLayout,
    color: DescriptorSetLayout,
    _displacement_sampler: Sampler,
    _color_sampler: Sampler,
}

impl TerrainLayouts {
    /// Creates the samplers, set layouts and the shared pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created.
    pub fn new(device: &Arc<Device>, descriptor_layout: DescriptorLayout) -> RhiResult<Self> {
        let displacement_sampler = Sampler::linear_wrap(Arc::clone(device))?;
        let color_sampler = Sampler::linear_wrap(Arc::clone(device))?;

        let displacement = DescriptorSetLayout::new(
            Arc::clone(device),
            TableResource::SampledImage(displacement_sampler.handle()),
            TERRAIN_SHADER_STAGES,
        )?;
        let constants = DescriptorSetLayout::new(
            Arc::clone(device),
            TableResource::UniformBuffer,
            TERRAIN_SHADER_STAGES,
        )?;
        let color = DescriptorSetLayout::new(
            Arc::clone(device),
            TableResource::SampledImage(color_sampler.handle()),
            vk::ShaderStageFlags::FRAGMENT,
        )?;

        let ordered = set_layouts_in_order(
            descriptor_layout,
            displacement.handle(),
            constants.handle(),
            color.handle(),
        );
        let pipeline_layout = PipelineLayout::new(Arc::clone(device), &ordered)?;

        debug!("Created terrain layouts ({:?})", descriptor_layout);

        Ok(Self {
            pipeline_layout,
            displacement,
            constants,
            color,
            _displacement_sampler: displacement_sampler,
            _color_sampler: color_sampler,
        })
    }

    #[inline]
    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout
    }

    #[inline]
    pub fn displacement(&self) -> &DescriptorSetLayout {
        &self.displacement
    }

    #[inline]
    pub fn constants(&self) -> &DescriptorSetLayout {
        &self.constants
    }

    #[inline]
    pub fn color(&self) -> &DescriptorSetLayout {
        &self.color
    }
}

/// Orders the three set layouts by their set index.
fn set_layouts_in_order<T: Copy + Default>(
    layout: DescriptorLayout,
    displacement: T,
    constants: T,
    color: T,
) -> [T; 3] {
    let mut ordered = [T::default(); 3];
    ordered[layout.displacement as usize] = displacement;
    ordered[layout.constants as usize] = constants;
    ordered[layout.color as usize] = color;
    ordered
}

/// Loads one variant's shaders and builds its pipeline.
///
/// # Errors
///
/// Fails if a shader module is missing or invalid, or if pipeline creation
/// fails.
pub fn build_pipeline(
    device: &Arc<Device>,
    variant: PipelineVariant,
    layouts: &TerrainLayouts,
    shader_dir: &Path,
    color_format: vk::Format,
) -> RhiResult<Pipeline> {
    let desc = variant.describe();

    let shaders = desc
        .stages
        .iter()
        .map(|&stage| Shader::load(Arc::clone(device), shader_dir, desc.program, stage))
        .collect::<RhiResult<Vec<_>>>()?;

    let terrain_attributes = TerrainVertex::attribute_descriptions();
    let grid_attributes = GridVertex::attribute_descriptions();
    let vertex_input = match desc.vertex_layout {
        VertexLayout::Terrain => Some(VertexInput {
            binding: TerrainVertex::binding_description(),
            attributes: &terrain_attributes,
        }),
        VertexLayout::Grid => Some(VertexInput {
            binding: GridVertex::binding_description(),
            attributes: &grid_attributes,
        }),
        VertexLayout::None => None,
    };

    Pipeline::graphics(
        Arc::clone(device),
        layouts.pipeline_layout(),
        &GraphicsPipelineDesc {
            name: desc.name,
            shaders: &shaders,
            vertex_input,
            raster: desc.raster,
            color_format,
            depth_format: Some(DEPTH_FORMAT),
        },
    )
}

/// One pipeline per [`PipelineVariant`].
pub struct PipelineSet {
    pipelines: Vec<Pipeline>,
}

impl PipelineSet {
    /// Builds every variant.
    ///
    /// # Errors
    ///
    /// Returns the first variant's failure.
    pub fn new(
        device: &Arc<Device>,
        layouts: &TerrainLayouts,
        shader_dir: &Path,
        color_format: vk::Format,
    ) -> RhiResult<Self> {
        let pipelines = PipelineVariant::ALL
            .iter()
            .map(|&variant| build_pipeline(device, variant, layouts, shader_dir, color_format))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Created {} terrain pipelines from {:?}",
            pipelines.len(),
            shader_dir
        );
        Ok(Self { pipelines })
    }

    /// Pipeline for `variant`.
    #[inline]
    pub fn get(&self, variant: PipelineVariant) -> &Pipeline {
        &self.pipelines[variant.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_indices_follow_all() {
        for (i, variant) in PipelineVariant::ALL.iter().enumerate() {
            assert_eq!(variant.index(), i);
        }
    }

    #[test]
    fn test_for_mode() {
        assert_eq!(
            PipelineVariant::for_mode(DrawMode::Solid),
            PipelineVariant::TessSolid
        );
        assert_eq!(
            PipelineVariant::for_mode(DrawMode::Wireframe),
            PipelineVariant::TessWireframe
        );
        assert_eq!(
            PipelineVariant::for_mode(DrawMode::Flat3d),
            PipelineVariant::Flat3d
        );
        assert_eq!(
            PipelineVariant::for_mode(DrawMode::Preview2d),
            PipelineVariant::FullScreen2d
        );
    }

    #[test]
    fn test_tessellated_variants_differ_only_in_fill_mode() {
        let solid = PipelineVariant::TessSolid.describe();
        let wireframe = PipelineVariant::TessWireframe.describe();

        assert_eq!(solid.raster.polygon_mode, PolygonMode::Fill);
        assert_eq!(wireframe.raster.polygon_mode, PolygonMode::Line);
        assert_eq!(
            PipelineDesc {
                name: solid.name,
                raster: solid.raster,
                ..wireframe
            },
            solid
        );
    }

    #[test]
    fn test_topology_matches_tessellation() {
        for variant in PipelineVariant::ALL {
            let desc = variant.describe();
            let has_tess = desc.stages.contains(&ShaderStage::TessControl);
            assert_eq!(has_tess, variant.is_tessellated(), "{}", desc.name);
            let expected = if has_tess {
                PATCHES
            } else {
                Topology::TriangleList
            };
            assert_eq!(desc.raster.topology, expected, "{}", desc.name);
        }
    }

    #[test]
    fn test_preview_has_no_depth_or_culling() {
        let desc = PipelineVariant::FullScreen2d.describe();
        assert!(!desc.raster.depth_test);
        assert_eq!(desc.raster.cull_mode, CullMode::None);
        assert_eq!(desc.vertex_layout, VertexLayout::None);
    }

    #[test]
    fn test_shader_paths() {
        let desc = PipelineVariant::TessSolid.describe();
        let paths: Vec<_> = desc
            .stages
            .iter()
            .map(|stage| stage.spirv_path(Path::new("shaders/spv"), desc.program))
            .collect();
        assert_eq!(paths[0], Path::new("shaders/spv/terrain.vert.spv"));
        assert_eq!(paths[1], Path::new("shaders/spv/terrain.tesc.spv"));
        assert_eq!(paths[2], Path::new("shaders/spv/terrain.tese.spv"));
        assert_eq!(paths[3], Path::new("shaders/spv/terrain.frag.spv"));
    }

    #[test]
    fn test_set_layouts_in_order() {
        assert_eq!(
            set_layouts_in_order(DescriptorLayout::default(), 'd', 'k', 'c'),
            ['d', 'k', 'c']
        );
        let permuted = DescriptorLayout {
            displacement: 2,
            constants: 0,
            color: 1,
        };
        assert_eq!(set_layouts_in_order(permuted, 'd', 'k', 'c'), ['k', 'c', 'd']);
    }
}
