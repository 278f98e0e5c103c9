//! Graphics pipelines for dynamic rendering.
//!
//! A pipeline is described by a [`GraphicsPipelineDesc`]: its shader
//! modules, optional vertex input, a [`RasterState`] and the attachment
//! formats it renders into. Viewport and scissor are always dynamic.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};

/// Pipeline layout over a list of descriptor set layouts, set `n` being
/// `set_layouts[n]`. No push constants.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(device: Arc<Device>, set_layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        let layout = unsafe { device.handle().create_pipeline_layout(&info, None)? };
        debug!("Pipeline layout over {} sets", set_layouts.len());
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline_layout(self.layout, None) };
    }
}

/// How vertices are assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
    /// Patches of `control_points` vertices for the tessellation stages.
    PatchList { control_points: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    /// Wireframe.
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

/// Fixed-function state that differs between pipelines. Front faces are
/// always clockwise and depth compares with `LESS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub topology: Topology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    /// Depth test and write together.
    pub depth_test: bool,
}

impl RasterState {
    fn primitive_topology(&self) -> vk::PrimitiveTopology {
        match self.topology {
            Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Topology::PatchList { .. } => vk::PrimitiveTopology::PATCH_LIST,
        }
    }

    fn vk_polygon_mode(&self) -> vk::PolygonMode {
        match self.polygon_mode {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }

    fn vk_cull_mode(&self) -> vk::CullModeFlags {
        match self.cull_mode {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// One interleaved vertex buffer at binding 0.
#[derive(Clone, Copy, Debug)]
pub struct VertexInput<'a> {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: &'a [vk::VertexInputAttributeDescription],
}

/// Everything needed to create one graphics pipeline.
pub struct GraphicsPipelineDesc<'a> {
    /// Used in logs and errors.
    pub name: &'static str,
    pub shaders: &'a [Shader],
    /// `None` when vertices come from `gl_VertexIndex` alone.
    pub vertex_input: Option<VertexInput<'a>>,
    pub raster: RasterState,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
}

/// Checks that `stages` form a complete program for `topology`: vertex and
/// fragment are mandatory, tessellation needs both of its stages and patch
/// topology, and patch topology needs tessellation.
pub fn check_stages(name: &str, stages: &[ShaderStage], topology: Topology) -> RhiResult<()> {
    let has = |stage| stages.contains(&stage);
    let fail = |what: &str| Err(RhiError::PipelineError(format!("{}: {}", name, what)));

    if !has(ShaderStage::Vertex) {
        return fail("missing vertex shader");
    }
    if !has(ShaderStage::Fragment) {
        return fail("missing fragment shader");
    }
    let control = has(ShaderStage::TessControl);
    let evaluation = has(ShaderStage::TessEvaluation);
    if control != evaluation {
        return fail("tessellation needs control and evaluation shaders");
    }
    match topology {
        Topology::PatchList { control_points: 0 } => fail("patch with no control points"),
        Topology::PatchList { .. } if !control => fail("patch list without tessellation"),
        Topology::TriangleList if control => fail("tessellation needs a patch list"),
        _ => Ok(()),
    }
}

/// A graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    name: &'static str,
}

impl Pipeline {
    /// Creates the pipeline described by `desc` against `layout`.
    ///
    /// Shader modules may be dropped as soon as this returns.
    pub fn graphics(
        device: Arc<Device>,
        layout: &PipelineLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        let stage_kinds: Vec<ShaderStage> = desc.shaders.iter().map(Shader::stage).collect();
        check_stages(desc.name, &stage_kinds, desc.raster.topology)?;

        let stages: Vec<_> = desc.shaders.iter().map(Shader::stage_create_info).collect();
        let raster = &desc.raster;

        let bindings: Vec<_> = desc.vertex_input.iter().map(|input| input.binding).collect();
        let attributes = desc.vertex_input.map_or(&[][..], |input| input.attributes);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(raster.primitive_topology());

        let control_points = match raster.topology {
            Topology::PatchList { control_points } => control_points,
            Topology::TriangleList => 0,
        };
        let tessellation =
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(control_points);

        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(raster.vk_polygon_mode())
            .cull_mode(raster.vk_cull_mode())
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth = raster.depth_test && desc.depth_format.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth)
            .depth_write_enable(depth)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [desc.color_format];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format.unwrap_or(vk::Format::UNDEFINED));

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .push_next(&mut rendering);
        if control_points > 0 {
            create_info = create_info.tessellation_state(&tessellation);
        }

        let created = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };
        let pipeline = created
            .map_err(|(_, result)| RhiError::from(result))?
            .pop()
            .ok_or_else(|| RhiError::PipelineError(format!("{}: driver returned nothing", desc.name)))?;

        debug!(
            "Pipeline '{}': {:?}, {:?}, {} stages",
            desc.name,
            raster.topology,
            raster.polygon_mode,
            stages.len()
        );

        Ok(Self {
            device,
            pipeline,
            name: desc.name,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Pipeline '{}' destroyed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TESSELLATED: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEvaluation,
        ShaderStage::Fragment,
    ];
    const PATCHES: Topology = Topology::PatchList { control_points: 3 };

    #[test]
    fn test_complete_programs_pass() {
        assert!(check_stages("terrain", &TESSELLATED, PATCHES).is_ok());
        assert!(
            check_stages(
                "flat",
                &[ShaderStage::Vertex, ShaderStage::Fragment],
                Topology::TriangleList
            )
            .is_ok()
        );
    }

    #[test]
    fn test_missing_vertex_stage() {
        let err = check_stages("broken", &[ShaderStage::Fragment], Topology::TriangleList)
            .unwrap_err();
        assert!(matches!(err, RhiError::PipelineError(msg) if msg.contains("vertex")));
    }

    #[test]
    fn test_half_tessellation_rejected() {
        let stages = [
            ShaderStage::Vertex,
            ShaderStage::TessControl,
            ShaderStage::Fragment,
        ];
        assert!(check_stages("half", &stages, PATCHES).is_err());
    }

    #[test]
    fn test_topology_must_match_tessellation() {
        assert!(check_stages("t", &TESSELLATED, Topology::TriangleList).is_err());
        assert!(
            check_stages("p", &[ShaderStage::Vertex, ShaderStage::Fragment], PATCHES).is_err()
        );
        assert!(
            check_stages("z", &TESSELLATED, Topology::PatchList { control_points: 0 }).is_err()
        );
    }

    #[test]
    fn test_raster_state_conversions() {
        let state = RasterState {
            topology: PATCHES,
            polygon_mode: PolygonMode::Line,
            cull_mode: CullMode::None,
            depth_test: true,
        };
        assert_eq!(state.primitive_topology(), vk::PrimitiveTopology::PATCH_LIST);
        assert_eq!(state.vk_polygon_mode(), vk::PolygonMode::LINE);
        assert_eq!(state.vk_cull_mode(), vk::CullModeFlags::NONE);
    }
}
