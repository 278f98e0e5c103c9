//! Tessellated terrain rendering.
//!
//! This crate orchestrates the renderer:
//! - Staged startup with per-stage error reporting ([`Renderer::initialize`])
//! - Frame slots on timeline fences ([`FrameRing`], [`FrameManager`])
//! - Pipeline variants per draw mode ([`PipelineVariant`])
//! - Draw recording through [`DrawCommands`]

pub mod config;
pub mod depth_buffer;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod frame_manager;
pub mod pipelines;
pub mod renderer;
pub mod terrain;
pub mod ubo;

pub use config::{AssetPaths, DescriptorLayout, PlanetConfig, RendererConfig};
pub use error::{InitStage, RendererError, RendererResult};
pub use frame::{FrameRing, FrameState, SlotWait};
pub use frame_manager::FrameManager;
pub use pipelines::{PipelineDesc, PipelineVariant};
pub use renderer::Renderer;
pub use terrain::{DescriptorTable, DrawCommands, MeshCounts, MeshKind, record_draw};
pub use ubo::TerrainConstants;
