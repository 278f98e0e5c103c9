//! Renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object of the terrain viewer, performs the
//! staged startup sequence and records one frame per [`Renderer::draw_frame`]
//! call.
//!
//! # Resource Destruction Order
//!
//! Vulkan objects must go away before the objects they were created from:
//! 1. Wait for every frame slot to retire
//! 2. Terrain assets, pipelines, descriptor sets and layouts
//! 3. Frame slots (command pools, semaphores, timeline fences)
//! 4. Depth buffer and swapchain
//! 5. Device (its allocator frees the remaining memory blocks)
//! 6. Surface and instance
//!
//! `ManuallyDrop` fields are released in that order in [`Drop`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use tracing::{debug, error, info, warn};

use terrain_platform::{Surface, Window};
use terrain_rhi::RhiError;
use terrain_rhi::command::{CommandBuffer, CommandPool, PoolUsage};
use terrain_rhi::device::Device;
use terrain_rhi::instance::Instance;
use terrain_rhi::physical_device::enumerate_adapters;
use terrain_rhi::rendering::{BackBufferTransition, FramePass};
use terrain_rhi::swapchain::{Swapchain, SwapchainTarget};
use terrain_rhi::sync::Fence;
use terrain_rhi::upload::UploadBatch;
use terrain_scene::{Camera, DrawMode, InputDirections, OrbitLight, SceneController};

use crate::config::RendererConfig;
use crate::depth_buffer::DepthBuffer;
use crate::descriptors::TerrainDescriptors;
use crate::error::{ErrorContext, InitStage, RendererError, RendererResult};
use crate::frame_manager::{AcquireOutcome, FrameManager};
use crate::pipelines::{PipelineSet, TerrainLayouts};
use crate::terrain::{CommandRecorder, TerrainAssets, record_draw};
use crate::ubo::TerrainConstants;

/// Near clip distance of the planet camera.
const CAMERA_NEAR: f32 = 1.0;
/// Far clip distance, in planet radii.
const CAMERA_FAR_RADII: f32 = 20.0;
/// Initial camera distance from the planet center, in planet radii.
const CAMERA_DISTANCE_RADII: f32 = 3.0;

/// Terrain renderer.
pub struct Renderer {
    scene: SceneController,

    assets: ManuallyDrop<TerrainAssets>,
    pipelines: ManuallyDrop<PipelineSet>,
    descriptors: ManuallyDrop<TerrainDescriptors>,
    layouts: ManuallyDrop<TerrainLayouts>,
    frames: ManuallyDrop<FrameManager>,
    depth_buffer: ManuallyDrop<DepthBuffer>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    config: RendererConfig,
    /// Displacement map size, `(width, height)`.
    map_extent: (u32, u32),
    width: u32,
    height: u32,
    framebuffer_resized: bool,
}

impl Renderer {
    /// Runs the startup sequence against `window`.
    ///
    /// Stages run in order: configuration, instance, surface, device,
    /// swapchain, depth buffer, frame slots, descriptor layouts, shaders and
    /// pipelines, asset decode, GPU upload, descriptor sets. The first
    /// failure is returned tagged with its stage; every object created so far
    /// is released.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Initialization`] naming the failed stage.
    pub fn initialize(window: &Window, config: RendererConfig) -> RendererResult<Self> {
        config.validate().at_stage(InitStage::Config)?;

        let width = window.width();
        let height = window.height();
        info!(
            "Initializing terrain renderer ({}x{}, {} frame slots)",
            width, height, config.frame_count
        );

        let surface_extensions = window.surface_extensions().at_stage(InitStage::Instance)?;
        let instance = Instance::new(c"terrain", config.enable_validation, surface_extensions)
            .at_stage(InitStage::Instance)?;
        debug!("Validation layer active: {}", instance.has_validation());

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .at_stage(InitStage::Surface)?;

        let adapters = enumerate_adapters(instance.handle(), surface.handle(), surface.loader())
            .at_stage(InitStage::Device)?;
        let device =
            Device::create_on_first_adapter(&instance, &adapters).at_stage(InitStage::Device)?;

        let swapchain = Swapchain::new(
            &instance,
            Arc::clone(&device),
            surface.handle(),
            width,
            height,
            config.frame_count as u32,
        )
        .at_stage(InitStage::Swapchain)?;

        let depth_buffer = DepthBuffer::new(Arc::clone(&device), swapchain.extent())
            .at_stage(InitStage::DepthBuffer)?;

        let frames = FrameManager::new(Arc::clone(&device), config.frame_count)?;

        let layouts = TerrainLayouts::new(&device, config.descriptor_layout)
            .at_stage(InitStage::Descriptors)?;

        let pipelines = PipelineSet::new(
            &device,
            &layouts,
            &config.assets.shader_dir,
            swapchain.format(),
        )
        .map_err(|e| {
            let stage = match e {
                RhiError::ShaderError(_) => InitStage::Shaders,
                _ => InitStage::Pipelines,
            };
            RendererError::Initialization {
                stage,
                source: e.into(),
            }
        })?;

        let assets = Self::upload_assets(&device, &config)?;
        let map_extent = assets.displacement_extent();

        let descriptors = TerrainDescriptors::new(&device, &layouts, &assets, config.frame_count)
            .at_stage(InitStage::Descriptors)?;

        let radius = config.planet.radius;
        let camera = Camera::new(
            Vec3::new(0.0, 0.0, -CAMERA_DISTANCE_RADII * radius),
            width as f32 / height.max(1) as f32,
            CAMERA_NEAR,
            radius * CAMERA_FAR_RADII,
        );
        let scene = SceneController::new(camera, OrbitLight::new(config.orbit_cycle));

        info!(
            "Renderer initialized: {} swapchain images, {} frame slots, map {}x{}",
            swapchain.image_count(),
            frames.frames_in_flight(),
            map_extent.0,
            map_extent.1
        );

        Ok(Self {
            scene,
            assets: ManuallyDrop::new(assets),
            pipelines: ManuallyDrop::new(pipelines),
            descriptors: ManuallyDrop::new(descriptors),
            layouts: ManuallyDrop::new(layouts),
            frames: ManuallyDrop::new(frames),
            depth_buffer: ManuallyDrop::new(depth_buffer),
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            config,
            map_extent,
            width,
            height,
            framebuffer_resized: false,
        })
    }

    /// Decodes and uploads the terrain assets with one blocking submission,
    /// then releases the upload buffers.
    fn upload_assets(device: &Arc<Device>, config: &RendererConfig) -> RendererResult<TerrainAssets> {
        let pool = CommandPool::new(Arc::clone(device), PoolUsage::OneShot)
            .at_stage(InitStage::Upload)?;
        let cmd = CommandBuffer::new(Arc::clone(device), &pool).at_stage(InitStage::Upload)?;
        let mut batch = UploadBatch::new();

        cmd.begin().at_stage(InitStage::Upload)?;
        let assets = TerrainAssets::load(device, &cmd, &config.planet, &config.assets, &mut batch)?;
        cmd.end().at_stage(InitStage::Upload)?;

        let fence = Fence::new(Arc::clone(device), false).at_stage(InitStage::Upload)?;
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        // SAFETY: the command buffer is closed and the fence is unsignaled and
        // unused.
        unsafe {
            device
                .submit_graphics(&[submit_info], fence.handle())
                .at_stage(InitStage::Upload)?;
        }
        fence.wait(u64::MAX).at_stage(InitStage::Upload)?;

        debug!(
            "Upload complete: {} buffers, {} bytes",
            batch.len(),
            batch.total_bytes()
        );
        batch.release_upload_buffers();

        Ok(assets)
    }

    /// Records, submits and presents one frame.
    ///
    /// Out-of-date and suboptimal swapchains are rebuilt without reporting an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Frame`] for a failed GPU call and
    /// [`RendererError::FrameState`] if the frame ring is misused.
    pub fn draw_frame(&mut self) -> RendererResult<()> {
        if self.framebuffer_resized {
            debug!("Resize requested, recreating swapchain before acquire");
            self.recreate_swapchain()?;
        }

        let suboptimal = match self.frames.acquire_next_image(&self.swapchain)? {
            AcquireOutcome::Ready { suboptimal, .. } => suboptimal,
            AcquireOutcome::OutOfDate => {
                self.recreate_swapchain()?;
                return Ok(());
            }
        };

        self.frames.begin_frame()?;

        let frame_number = self.frames.frame_number();
        let slot = self.frames.current_slot();
        let constants = TerrainConstants::new(
            self.scene.update_constants(),
            self.map_extent.0,
            self.map_extent.1,
        );
        self.descriptors
            .write_constants(slot, &constants)
            .in_frame(frame_number)?;

        self.record_commands(slot)?;

        self.frames.end_frame()?;
        self.frames.submit()?;
        let needs_recreate = self.frames.present(&self.swapchain)?;
        self.frames.next_frame()?;

        if suboptimal || needs_recreate {
            debug!("Swapchain needs recreation after present");
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// Records the render pass of the current slot.
    fn record_commands(&self, slot: usize) -> RendererResult<()> {
        let frame_number = self.frames.frame_number();
        let image_index = self.frames.image_index();
        let SwapchainTarget { image, view } = self
            .swapchain
            .target(image_index as usize)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("no swapchain image {}", image_index))
            })
            .in_frame(frame_number)?;

        let cmd = self.frames.current_frame().command_buffer();
        let extent = self.swapchain.extent();

        let (src, dst) = BackBufferTransition::ToRenderTarget.stages();
        cmd.image_barrier(src, dst, &[BackBufferTransition::ToRenderTarget.barrier(image)]);
        let (src, dst) = self.depth_buffer.barrier_stages();
        cmd.image_barrier(src, dst, &[self.depth_buffer.attachment_barrier()]);

        let pass = FramePass::new(extent, view, self.config.clear_color)
            .with_depth(self.depth_buffer.view());
        cmd.begin_rendering(&pass.info());

        cmd.set_flipped_viewport(extent);

        let mut recorder = CommandRecorder {
            cmd,
            pipelines: &self.pipelines,
            pipeline_layout: self.layouts.pipeline_layout().handle(),
            displacement_set: self.descriptors.displacement_set(),
            constants_set: self.descriptors.constants_set(slot),
            color_set: self.descriptors.color_set(),
            assets: &self.assets,
        };
        record_draw(
            &mut recorder,
            self.scene.draw_mode(),
            self.config.descriptor_layout,
            self.assets.counts(),
        );

        cmd.end_rendering();

        let (src, dst) = BackBufferTransition::ToPresent.stages();
        cmd.image_barrier(src, dst, &[BackBufferTransition::ToPresent.barrier(image)]);
        Ok(())
    }

    /// Rebuilds the swapchain and the depth buffer for the current window
    /// size.
    fn recreate_swapchain(&mut self) -> RendererResult<()> {
        let frame_number = self.frames.frame_number();
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.width, self.height)
            .in_frame(frame_number)?;

        let depth_buffer = DepthBuffer::new(Arc::clone(&*self.device), self.swapchain.extent())
            .in_frame(frame_number)?;
        // SAFETY: recreate waited for the device, so the old depth buffer is
        // unused, and the field is reassigned right after.
        unsafe {
            ManuallyDrop::drop(&mut self.depth_buffer);
        }
        self.depth_buffer = ManuallyDrop::new(depth_buffer);

        self.framebuffer_resized = false;
        debug!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// Moves the camera and switches the draw mode.
    pub fn handle_directional_input(&mut self, directions: &InputDirections, delta_time: f32) {
        self.scene.handle_directional_input(directions, delta_time);
    }

    /// Turns the camera by a drag delta in pixels.
    pub fn handle_mouse_input(&mut self, dx: i32, dy: i32) {
        self.scene.handle_mouse_input(dx, dy);
    }

    /// Records a new window size; the swapchain is rebuilt on the next frame.
    ///
    /// Zero sizes (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }

        if width != self.width || height != self.height {
            debug!(
                "Resize triggered: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.framebuffer_resized = true;
            self.scene.camera_mut().set_viewport_size(width, height);
        }
    }

    /// Blocks until the GPU has finished every submitted frame.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the device fails.
    pub fn wait_idle(&self) -> RendererResult<()> {
        let frame_number = self.frames.frame_number();
        self.frames.wait_for_all_frames().in_frame(frame_number)?;
        self.device.wait_idle().in_frame(frame_number)
    }

    #[inline]
    pub fn draw_mode(&self) -> DrawMode {
        self.scene.draw_mode()
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.frames.wait_for_all_frames() {
            error!("Failed to drain frame slots during renderer drop: {:?}", e);
        }
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        // SAFETY: the GPU is idle and each field is dropped exactly once, in
        // reverse creation order.
        unsafe {
            ManuallyDrop::drop(&mut self.assets);
            ManuallyDrop::drop(&mut self.pipelines);
            ManuallyDrop::drop(&mut self.descriptors);
            ManuallyDrop::drop(&mut self.layouts);
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.depth_buffer);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
