//! Per-slot GPU frame resources and the frame loop.
//!
//! [`FrameManager`] owns one [`FrameData`] per frame slot and drives the
//! [`FrameRing`] state machine alongside the Vulkan calls each transition
//! stands for:
//!
//! ```text
//! acquire_next_image     swapchain image, signals image_available
//! begin_frame            Idle -> Recording: reset the slot's pool, begin
//! end_frame              close the command buffer
//! submit                 Recording -> Submitted: signal render_finished and
//!                        the slot's timeline fence with its next value
//! present                Submitted -> Presented
//! next_frame             Presented -> WaitingForSlot -> Idle: advance and
//!                        block until the new slot's fence reaches its target
//! ```
//!
//! The slot's command pool is only reset after its fence wait, so no command
//! buffer is reset while the GPU still executes it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace};

use terrain_rhi::RhiResult;
use terrain_rhi::command::{CommandBuffer, CommandPool, PoolUsage};
use terrain_rhi::device::Device;
use terrain_rhi::swapchain::Swapchain;
use terrain_rhi::sync::{Semaphore, TimelineFence};

use crate::error::{ErrorContext, InitStage, RendererResult};
use crate::frame::FrameRing;

/// Resources owned by one frame slot.
pub struct FrameData {
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    image_available: Semaphore,
    render_finished: Semaphore,
    fence: TimelineFence,
}

impl FrameData {
    fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(Arc::clone(device), PoolUsage::PerFrame)?;
        let command_buffer = CommandBuffer::new(Arc::clone(device), &command_pool)?;
        Ok(Self {
            command_buffer,
            command_pool,
            image_available: Semaphore::new(Arc::clone(device))?,
            render_finished: Semaphore::new(Arc::clone(device))?,
            fence: TimelineFence::new(Arc::clone(device), 0)?,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }
}

/// Result of acquiring a swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; render into it. `suboptimal` asks for a
    /// swapchain rebuild after presenting.
    Ready { image_index: u32, suboptimal: bool },
    /// Nothing was acquired. Rebuild the swapchain and skip the frame.
    OutOfDate,
}

/// Frame slots plus the ring that orders them.
///
/// Single-threaded: only the render thread touches it.
pub struct FrameManager {
    device: Arc<Device>,
    frames: Vec<FrameData>,
    ring: FrameRing,
    image_index: u32,
}

impl FrameManager {
    /// Creates `frame_count` frame slots, each fence starting at 0.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if any per-slot object cannot be
    /// created.
    pub fn new(device: Arc<Device>, frame_count: usize) -> RendererResult<Self> {
        let ring = FrameRing::new(frame_count)?;
        let mut frames = Vec::with_capacity(frame_count);
        for slot in 0..frame_count {
            frames.push(FrameData::new(&device).at_stage(InitStage::FrameResources)?);
            debug!("Created frame data for slot {}", slot);
        }

        info!("Frame manager created with {} frame slots", frame_count);

        Ok(Self {
            device,
            frames,
            ring,
            image_index: 0,
        })
    }

    /// Resources of the current slot.
    #[inline]
    pub fn current_frame(&self) -> &FrameData {
        &self.frames[self.ring.current_slot()]
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.ring.current_slot()
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Swapchain image acquired for the current frame.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Acquires the next swapchain image with the current slot's semaphore.
    ///
    /// # Errors
    ///
    /// Any acquire failure other than out-of-date is fatal.
    pub fn acquire_next_image(&mut self, swapchain: &Swapchain) -> RendererResult<AcquireOutcome> {
        let frame = self.ring.frame_number();
        let semaphore = self.current_frame().image_available.handle();

        match swapchain.acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => {
                self.image_index = image_index;
                Ok(AcquireOutcome::Ready {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(e).in_frame(frame),
        }
    }

    /// Resets the current slot's pool and begins its command buffer.
    pub fn begin_frame(&mut self) -> RendererResult<()> {
        let slot = self.ring.begin_recording()?;
        let frame_number = self.ring.frame_number();
        let frame = &self.frames[slot];
        frame.command_pool.reset().in_frame(frame_number)?;
        frame.command_buffer.begin().in_frame(frame_number)
    }

    /// Closes the current command buffer.
    pub fn end_frame(&self) -> RendererResult<()> {
        self.current_frame()
            .command_buffer
            .end()
            .in_frame(self.ring.frame_number())
    }

    /// Submits the current command buffer.
    ///
    /// Waits on `image_available` at color output, signals `render_finished`
    /// and raises the slot's timeline fence to its next target.
    pub fn submit(&mut self) -> RendererResult<()> {
        let frame_number = self.ring.frame_number();
        let slot = self.ring.current_slot();
        let frame = &self.frames[slot];
        let device = &self.device;

        let signal_value = self.ring.submit_with(|signal_value| {
            let wait_semaphores = [frame.image_available.handle()];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [frame.render_finished.handle(), frame.fence.handle()];
            let command_buffers = [frame.command_buffer.handle()];

            // Binary semaphores ignore their entry in the value arrays.
            let wait_values = [0];
            let signal_values = [0, signal_value];
            let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
                .wait_semaphore_values(&wait_values)
                .signal_semaphore_values(&signal_values);

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores)
                .push_next(&mut timeline_info);

            // SAFETY: the command buffer was closed by `end_frame`, and the
            // slot's semaphores are not referenced by any pending submission:
            // the slot's previous use was waited for before `begin_frame`.
            unsafe {
                device
                    .submit_graphics(&[submit_info], vk::Fence::null())
                    .in_frame(frame_number)
            }
        })?;

        trace!(
            "Submitted frame {} on slot {} (fence value {})",
            frame_number, slot, signal_value
        );
        Ok(())
    }

    /// Presents the acquired image once `render_finished` is signaled.
    ///
    /// Returns `true` if the swapchain should be rebuilt.
    pub fn present(&mut self, swapchain: &Swapchain) -> RendererResult<bool> {
        let frame_number = self.ring.frame_number();
        let semaphore = self.current_frame().render_finished.handle();

        let needs_recreate = match swapchain.present(
            self.device.present_queue(),
            self.image_index,
            semaphore,
        ) {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                true
            }
            Err(e) => return Err(e).in_frame(frame_number),
        };

        self.ring.present()?;
        Ok(needs_recreate)
    }

    /// Advances to the next slot and blocks until its previous submission has
    /// completed.
    pub fn next_frame(&mut self) -> RendererResult<()> {
        let frame_number = self.ring.frame_number();
        let wait = self.ring.advance()?;
        if wait.value > 0 {
            trace!(
                "Waiting for slot {} to reach fence value {}",
                wait.slot, wait.value
            );
            self.frames[wait.slot]
                .fence
                .wait(wait.value, u64::MAX)
                .in_frame(frame_number)?;
        }
        self.ring.finish_wait()
    }

    /// Blocks until every slot's fence reaches its last target.
    pub fn wait_for_all_frames(&self) -> RhiResult<()> {
        for wait in self.ring.pending_waits() {
            if wait.value > 0 {
                self.frames[wait.slot].fence.wait(wait.value, u64::MAX)?;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for FrameManager {
    fn drop(&mut self) {
        if let Err(e) = self.wait_for_all_frames() {
            tracing::error!("Failed to drain frame slots during drop: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }

    #[test]
    fn test_frame_data_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameData>();
    }
}
