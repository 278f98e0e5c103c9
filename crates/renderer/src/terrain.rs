//! Terrain assets and per-frame draw recording.
//!
//! [`record_draw`] emits the bind and draw sequence for a draw mode through
//! the [`DrawCommands`] trait. [`CommandRecorder`] forwards it to a Vulkan
//! command buffer; tests record it into a list instead.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, info, warn};

use terrain_resources::{ImageData, MeshData, build_geosphere, build_height_map_grid, load_rgba8};
use terrain_rhi::RhiResult;
use terrain_rhi::buffer::{Buffer, BufferUsage};
use terrain_rhi::command::CommandBuffer;
use terrain_rhi::device::Device;
use terrain_rhi::texture::{Texture, upload_texture};
use terrain_rhi::upload::{UploadBatch, create_committed_buffer, upload_data};
use terrain_rhi::vertex::GridVertex;
use terrain_scene::DrawMode;

use crate::config::{AssetPaths, DescriptorLayout, PlanetConfig};
use crate::error::{ErrorContext, InitStage, RendererResult};
use crate::pipelines::{PipelineSet, PipelineVariant};

/// Vertices the full-screen preview draws without a vertex buffer.
pub const FULL_SCREEN_VERTEX_COUNT: u32 = 3;

/// The three descriptor tables every pipeline layout declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorTable {
    Displacement,
    Constants,
    Color,
}

impl DescriptorTable {
    /// Set index of this table under `layout`.
    pub fn set_index(self, layout: DescriptorLayout) -> u32 {
        match self {
            DescriptorTable::Displacement => layout.displacement,
            DescriptorTable::Constants => layout.constants,
            DescriptorTable::Color => layout.color,
        }
    }
}

/// GPU meshes the draw modes use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    /// Geosphere, drawn as 3-point patches.
    Planet,
    /// Flat height-map grid.
    Grid,
}

/// Index counts of the uploaded meshes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshCounts {
    pub planet_indices: u32,
    pub grid_indices: u32,
}

/// Command sink for one terrain draw.
pub trait DrawCommands {
    fn bind_pipeline(&mut self, variant: PipelineVariant);
    fn bind_descriptor_table(&mut self, table: DescriptorTable, set_index: u32);
    /// Binds the vertex and index buffers of `mesh`.
    fn bind_mesh(&mut self, mesh: MeshKind);
    fn draw_indexed(&mut self, index_count: u32);
    fn draw(&mut self, vertex_count: u32);
}

/// Records the draw for `mode`.
///
/// Tables are always bound displacement, constants, color. The full-screen
/// preview skips the constants table and draws one triangle without buffers.
pub fn record_draw<C: DrawCommands + ?Sized>(
    cmds: &mut C,
    mode: DrawMode,
    layout: DescriptorLayout,
    counts: MeshCounts,
) {
    let variant = PipelineVariant::for_mode(mode);
    cmds.bind_pipeline(variant);

    let (tables, mesh): (&[DescriptorTable], Option<(MeshKind, u32)>) = match variant {
        PipelineVariant::TessSolid | PipelineVariant::TessWireframe => (
            &[
                DescriptorTable::Displacement,
                DescriptorTable::Constants,
                DescriptorTable::Color,
            ],
            Some((MeshKind::Planet, counts.planet_indices)),
        ),
        PipelineVariant::Flat3d => (
            &[
                DescriptorTable::Displacement,
                DescriptorTable::Constants,
                DescriptorTable::Color,
            ],
            Some((MeshKind::Grid, counts.grid_indices)),
        ),
        PipelineVariant::FullScreen2d => (
            &[DescriptorTable::Displacement, DescriptorTable::Color],
            None,
        ),
    };

    for &table in tables {
        cmds.bind_descriptor_table(table, table.set_index(layout));
    }

    match mesh {
        Some((mesh, index_count)) => {
            cmds.bind_mesh(mesh);
            cmds.draw_indexed(index_count);
        }
        None => cmds.draw(FULL_SCREEN_VERTEX_COUNT),
    }
}

/// Device-local vertex and index buffers of one mesh.
pub struct MeshBuffers {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl MeshBuffers {
    /// Creates the buffers and records their uploads into `cmd`.
    ///
    /// The upload buffers go into `batch` and must be kept until `cmd` has
    /// executed.
    pub fn upload<V: Pod>(
        device: &Arc<Device>,
        cmd: &CommandBuffer,
        mesh: &MeshData<V>,
        batch: &mut UploadBatch,
    ) -> RhiResult<Self> {
        let vertex_bytes = mesh.vertex_bytes();
        let index_bytes = mesh.index_bytes();

        let (vertex_buffer, vertex_upload) =
            create_committed_buffer(device, BufferUsage::Vertex, vertex_bytes.len() as u64)?;
        upload_data(cmd, &vertex_buffer, &vertex_upload, vertex_bytes)?;
        batch.retain(vertex_upload);

        let (index_buffer, index_upload) =
            create_committed_buffer(device, BufferUsage::Index, index_bytes.len() as u64)?;
        upload_data(cmd, &index_buffer, &index_upload, index_bytes)?;
        batch.retain(index_upload);

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Textures and meshes uploaded once at startup.
pub struct TerrainAssets {
    pub displacement: Texture,
    pub color: Texture,
    pub planet: MeshBuffers,
    pub grid: MeshBuffers,
}

impl TerrainAssets {
    /// Decodes both maps, builds the meshes and records every upload into
    /// `cmd`.
    ///
    /// # Errors
    ///
    /// Decode failures are reported at [`InitStage::Assets`], GPU failures at
    /// [`InitStage::Upload`].
    pub fn load(
        device: &Arc<Device>,
        cmd: &CommandBuffer,
        planet: &PlanetConfig,
        assets: &AssetPaths,
        batch: &mut UploadBatch,
    ) -> RendererResult<Self> {
        let displacement_image = load_rgba8(&assets.displacement_map).at_stage(InitStage::Assets)?;
        let color_image = load_rgba8(&assets.color_map).at_stage(InitStage::Assets)?;

        let displacement = upload_image(device, cmd, "displacement", &displacement_image, batch)
            .at_stage(InitStage::Upload)?;
        let color =
            upload_image(device, cmd, "color", &color_image, batch).at_stage(InitStage::Upload)?;

        let planet_mesh = build_geosphere(planet.radius, planet.subdivisions);
        let grid_mesh = build_stride_grid(
            displacement_image.width,
            displacement_image.height,
            planet.grid_stride,
        );

        let planet_buffers =
            MeshBuffers::upload(device, cmd, &planet_mesh, batch).at_stage(InitStage::Upload)?;
        let grid_buffers =
            MeshBuffers::upload(device, cmd, &grid_mesh, batch).at_stage(InitStage::Upload)?;

        info!(
            "Terrain assets recorded: planet {} triangles, grid {} triangles, {} upload buffers",
            planet_mesh.triangle_count(),
            grid_mesh.triangle_count(),
            batch.len()
        );

        Ok(Self {
            displacement,
            color,
            planet: planet_buffers,
            grid: grid_buffers,
        })
    }

    pub fn counts(&self) -> MeshCounts {
        MeshCounts {
            planet_indices: self.planet.index_count,
            grid_indices: self.grid.index_count,
        }
    }

    /// Displacement map size in texels, `(width, height)`.
    pub fn displacement_extent(&self) -> (u32, u32) {
        (self.displacement.width(), self.displacement.height())
    }
}

fn upload_image(
    device: &Arc<Device>,
    cmd: &CommandBuffer,
    name: &'static str,
    image: &ImageData,
    batch: &mut UploadBatch,
) -> RhiResult<Texture> {
    let (texture, upload) =
        upload_texture(device, cmd, name, image.width, image.height, &image.pixels)?;
    batch.retain(upload);
    debug!("Recorded {} texture upload ({}x{})", name, image.width, image.height);
    Ok(texture)
}

/// Height-map grid with one vertex every `stride` texels, in texel units.
pub fn build_stride_grid(map_width: u32, map_height: u32, stride: u32) -> MeshData<GridVertex> {
    let stride = stride.max(1);
    let width = (map_width / stride).max(2);
    let height = (map_height / stride).max(2);
    if width * stride > map_width || height * stride > map_height {
        warn!(
            "Height map {}x{} is smaller than two grid cells at stride {}",
            map_width, map_height, stride
        );
    }

    let mut grid = build_height_map_grid(width, height);
    for vertex in &mut grid.vertices {
        vertex.position.x *= stride as f32;
        vertex.position.y *= stride as f32;
    }
    grid
}

/// [`DrawCommands`] over a Vulkan command buffer.
pub struct CommandRecorder<'a> {
    pub cmd: &'a CommandBuffer,
    pub pipelines: &'a PipelineSet,
    pub pipeline_layout: vk::PipelineLayout,
    pub displacement_set: vk::DescriptorSet,
    /// Constants set of the current frame slot.
    pub constants_set: vk::DescriptorSet,
    pub color_set: vk::DescriptorSet,
    pub assets: &'a TerrainAssets,
}

impl DrawCommands for CommandRecorder<'_> {
    fn bind_pipeline(&mut self, variant: PipelineVariant) {
        self.cmd.bind_pipeline(self.pipelines.get(variant).handle());
    }

    fn bind_descriptor_table(&mut self, table: DescriptorTable, set_index: u32) {
        let set = match table {
            DescriptorTable::Displacement => self.displacement_set,
            DescriptorTable::Constants => self.constants_set,
            DescriptorTable::Color => self.color_set,
        };
        self.cmd
            .bind_descriptor_set(self.pipeline_layout, set_index, set);
    }

    fn bind_mesh(&mut self, mesh: MeshKind) {
        let buffers = match mesh {
            MeshKind::Planet => &self.assets.planet,
            MeshKind::Grid => &self.assets.grid,
        };
        self.cmd
            .bind_mesh(buffers.vertex_buffer.handle(), buffers.index_buffer.handle());
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.cmd.draw_indexed(index_count);
    }

    fn draw(&mut self, vertex_count: u32) {
        self.cmd.draw(vertex_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Pipeline(PipelineVariant),
        Table(DescriptorTable, u32),
        Mesh(MeshKind),
        DrawIndexed(u32),
        Draw(u32),
    }

    #[derive(Default)]
    struct Recorder(Vec<Recorded>);

    impl DrawCommands for Recorder {
        fn bind_pipeline(&mut self, variant: PipelineVariant) {
            self.0.push(Recorded::Pipeline(variant));
        }
        fn bind_descriptor_table(&mut self, table: DescriptorTable, set_index: u32) {
            self.0.push(Recorded::Table(table, set_index));
        }
        fn bind_mesh(&mut self, mesh: MeshKind) {
            self.0.push(Recorded::Mesh(mesh));
        }
        fn draw_indexed(&mut self, index_count: u32) {
            self.0.push(Recorded::DrawIndexed(index_count));
        }
        fn draw(&mut self, vertex_count: u32) {
            self.0.push(Recorded::Draw(vertex_count));
        }
    }

    const COUNTS: MeshCounts = MeshCounts {
        planet_indices: 960,
        grid_indices: 54,
    };

    fn record(mode: DrawMode, layout: DescriptorLayout) -> Vec<Recorded> {
        let mut recorder = Recorder::default();
        record_draw(&mut recorder, mode, layout, COUNTS);
        recorder.0
    }

    fn tables(commands: &[Recorded]) -> Vec<DescriptorTable> {
        commands
            .iter()
            .filter_map(|c| match c {
                Recorded::Table(table, _) => Some(*table),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tessellated_table_order_is_fixed() {
        let expected = vec![
            DescriptorTable::Displacement,
            DescriptorTable::Constants,
            DescriptorTable::Color,
        ];
        for mode in [DrawMode::Solid, DrawMode::Wireframe] {
            assert_eq!(tables(&record(mode, DescriptorLayout::default())), expected);
        }
    }

    #[test]
    fn test_solid_sequence() {
        assert_eq!(
            record(DrawMode::Solid, DescriptorLayout::default()),
            vec![
                Recorded::Pipeline(PipelineVariant::TessSolid),
                Recorded::Table(DescriptorTable::Displacement, 0),
                Recorded::Table(DescriptorTable::Constants, 1),
                Recorded::Table(DescriptorTable::Color, 2),
                Recorded::Mesh(MeshKind::Planet),
                Recorded::DrawIndexed(960),
            ]
        );
    }

    #[test]
    fn test_solid_and_wireframe_differ_only_in_pipeline() {
        let solid = record(DrawMode::Solid, DescriptorLayout::default());
        let wireframe = record(DrawMode::Wireframe, DescriptorLayout::default());
        assert_eq!(wireframe[0], Recorded::Pipeline(PipelineVariant::TessWireframe));
        assert_eq!(solid[1..], wireframe[1..]);
    }

    #[test]
    fn test_table_order_kept_under_permuted_layout() {
        let layout = DescriptorLayout {
            displacement: 2,
            constants: 0,
            color: 1,
        };
        let commands = record(DrawMode::Wireframe, layout);
        assert_eq!(
            commands[1..4],
            [
                Recorded::Table(DescriptorTable::Displacement, 2),
                Recorded::Table(DescriptorTable::Constants, 0),
                Recorded::Table(DescriptorTable::Color, 1),
            ]
        );
    }

    #[test]
    fn test_flat_draws_grid() {
        let commands = record(DrawMode::Flat3d, DescriptorLayout::default());
        assert_eq!(commands[0], Recorded::Pipeline(PipelineVariant::Flat3d));
        assert_eq!(
            commands[4..],
            [Recorded::Mesh(MeshKind::Grid), Recorded::DrawIndexed(54)]
        );
    }

    #[test]
    fn test_preview_draws_full_screen_triangle() {
        assert_eq!(
            record(DrawMode::Preview2d, DescriptorLayout::default()),
            vec![
                Recorded::Pipeline(PipelineVariant::FullScreen2d),
                Recorded::Table(DescriptorTable::Displacement, 0),
                Recorded::Table(DescriptorTable::Color, 2),
                Recorded::Draw(3),
            ]
        );
    }

    #[test]
    fn test_pipeline_bound_before_anything_else() {
        for mode in DrawMode::ALL {
            let commands = record(mode, DescriptorLayout::default());
            assert!(matches!(commands[0], Recorded::Pipeline(_)));
            assert_eq!(
                commands
                    .iter()
                    .filter(|c| matches!(c, Recorded::Pipeline(_)))
                    .count(),
                1
            );
        }
    }

    #[test]
    fn test_stride_grid_scales_positions() {
        let grid = build_stride_grid(64, 32, 16);
        // 4 x 2 vertices, 3 x 1 cells.
        assert_eq!(grid.vertices.len(), 8);
        assert_eq!(grid.triangle_count(), 6);
        let last = grid.vertices[7].position;
        assert_eq!((last.x, last.y, last.z), (48.0, 16.0, 0.0));
    }

    #[test]
    fn test_stride_grid_has_at_least_one_cell() {
        let grid = build_stride_grid(8, 8, 16);
        assert_eq!(grid.vertices.len(), 4);
        assert_eq!(grid.triangle_count(), 2);
    }

    #[test]
    fn test_stride_zero_treated_as_one() {
        let grid = build_stride_grid(3, 3, 0);
        assert_eq!(grid.vertices.len(), 9);
    }
}
