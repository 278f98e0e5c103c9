//! Command pools and the command buffer recorder.
//!
//! The renderer keeps one [`CommandPool`] per frame slot and resets the whole
//! pool once the slot's timeline value has been reached. The startup upload
//! records into a one-shot pool that is dropped after its single submission.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How a pool's buffers are recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolUsage {
    /// Re-recorded every time the owning frame slot comes around.
    PerFrame,
    /// Recorded and submitted once.
    OneShot,
}

impl PoolUsage {
    fn flags(self) -> vk::CommandPoolCreateFlags {
        match self {
            PoolUsage::PerFrame => vk::CommandPoolCreateFlags::empty(),
            PoolUsage::OneShot => vk::CommandPoolCreateFlags::TRANSIENT,
        }
    }
}

/// Owns a VkCommandPool. Not thread-safe: used from the render thread only.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    usage: PoolUsage,
}

impl CommandPool {
    /// Creates a pool on the graphics queue family.
    pub fn new(device: Arc<Device>, usage: PoolUsage) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family())
            .flags(usage.flags());
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        debug!("{:?} command pool created", usage);
        Ok(Self {
            device,
            pool,
            usage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn usage(&self) -> PoolUsage {
        self.usage
    }

    /// Returns every buffer of the pool to the initial state.
    ///
    /// No buffer from this pool may still be pending on the GPU.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?
        };
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        debug!("{:?} command pool destroyed", self.usage);
    }
}

/// A primary command buffer and the commands the terrain renderer records.
///
/// Freed together with the pool it came from.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates one primary buffer from `pool`.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = unsafe { device.handle().allocate_command_buffers(&alloc_info)? }
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("empty command buffer allocation".into()))?;
        Ok(Self { device, buffer })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn vk(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Opens the buffer for one submission.
    pub fn begin(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.vk().begin_command_buffer(self.buffer, &info)? };
        Ok(())
    }

    /// Closes the buffer. A failure here leaves nothing submittable.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.vk().end_command_buffer(self.buffer)? };
        Ok(())
    }

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe { self.vk().cmd_begin_rendering(self.buffer, rendering_info) };
    }

    pub fn end_rendering(&self) {
        unsafe { self.vk().cmd_end_rendering(self.buffer) };
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.vk()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    /// Binds `set` at `set_index` of `layout`.
    pub fn bind_descriptor_set(
        &self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        let sets = [set];
        unsafe {
            self.vk().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &sets,
                &[],
            )
        };
    }

    /// Binds a vertex buffer at binding 0 and a `u32` index buffer.
    pub fn bind_mesh(&self, vertices: vk::Buffer, indices: vk::Buffer) {
        unsafe {
            self.vk()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[vertices], &[0]);
            self.vk()
                .cmd_bind_index_buffer(self.buffer, indices, 0, vk::IndexType::UINT32);
        }
    }

    /// Sets viewport and scissor to cover `extent`, with the viewport flipped
    /// vertically (origin bottom-left, negative height).
    pub fn set_flipped_viewport(&self, extent: vk::Extent2D) {
        let viewport = flipped_viewport(extent);
        let scissor = vk::Rect2D::default().extent(extent);
        unsafe {
            self.vk().cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.vk().cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    /// One instance of `vertex_count` vertices.
    pub fn draw(&self, vertex_count: u32) {
        unsafe { self.vk().cmd_draw(self.buffer, vertex_count, 1, 0, 0) };
    }

    /// One instance of `index_count` indices from the bound index buffer.
    pub fn draw_indexed(&self, index_count: u32) {
        unsafe { self.vk().cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0) };
    }

    /// Records image layout transitions between two stage masks.
    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.vk().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            )
        };
    }

    /// Makes a completed copy into `buffer` visible to `dst_access` at
    /// `dst_stage`.
    pub fn buffer_barrier(
        &self,
        buffer: vk::Buffer,
        dst_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        let barrier = [vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .size(vk::WHOLE_SIZE)];
        unsafe {
            self.vk().cmd_pipeline_barrier(
                self.buffer,
                vk::PipelineStageFlags::TRANSFER,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &barrier,
                &[],
            )
        };
    }

    /// Copies the first `size` bytes of `src` into `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = [vk::BufferCopy::default().size(size)];
        unsafe { self.vk().cmd_copy_buffer(self.buffer, src, dst, &region) };
    }

    /// Copies `src` into `dst`, which must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, region: vk::BufferImageCopy) {
        unsafe {
            self.vk().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }
}

/// Full-extent viewport with y pointing up: origin at the bottom edge and a
/// negative height.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_usage_flags() {
        assert!(PoolUsage::PerFrame.flags().is_empty());
        assert_eq!(
            PoolUsage::OneShot.flags(),
            vk::CommandPoolCreateFlags::TRANSIENT
        );
    }

    #[test]
    fn test_flipped_viewport_covers_extent() {
        let viewport = flipped_viewport(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 1080.0);
        assert_eq!(viewport.width, 1920.0);
        assert_eq!(viewport.height, -1080.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_recording_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
        assert_send::<CommandBuffer>();
    }
}
