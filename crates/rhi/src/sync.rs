//! Semaphores and fences.
//!
//! Frame slots are paced with a [`TimelineFence`] each: submitting a slot
//! raises its counter, and the host waits for that value before the slot is
//! reused. Binary [`Semaphore`]s order acquire, render and present on the
//! GPU. A plain [`Fence`] is only used for the startup upload.

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::RhiResult;

/// Binary semaphore.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let semaphore = create_semaphore(&device, None)?;
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// Timeline semaphore waited on from the host.
///
/// Values signalled through it must strictly increase.
pub struct TimelineFence {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    pub fn new(device: Arc<Device>, initial_value: u64) -> RhiResult<Self> {
        let semaphore = create_semaphore(&device, Some(initial_value))?;
        Ok(Self { device, semaphore })
    }

    /// Handle to list among a submission's signal semaphores.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Highest value the GPU has reached so far.
    pub fn completed_value(&self) -> RhiResult<u64> {
        Ok(unsafe { self.device.handle().get_semaphore_counter_value(self.semaphore)? })
    }

    /// Blocks for up to `timeout` ns until the counter is at least `value`.
    pub fn wait(&self, value: u64, timeout: u64) -> RhiResult<()> {
        if self.completed_value()? >= value {
            return Ok(());
        }
        trace!("Blocking on timeline value {}", value);
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(std::slice::from_ref(&self.semaphore))
            .values(std::slice::from_ref(&value));
        unsafe { self.device.handle().wait_semaphores(&wait_info, timeout)? };
        Ok(())
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// `None` creates a binary semaphore, `Some(v)` a timeline starting at `v`.
fn create_semaphore(device: &Device, timeline: Option<u64>) -> RhiResult<vk::Semaphore> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::default()
        .semaphore_type(vk::SemaphoreType::TIMELINE)
        .initial_value(timeline.unwrap_or_default());
    let mut info = vk::SemaphoreCreateInfo::default();
    if timeline.is_some() {
        info = info.push_next(&mut type_info);
    }
    Ok(unsafe { device.handle().create_semaphore(&info, None)? })
}

/// Binary fence for one-off host waits.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks for up to `timeout` ns until the fence is signalled.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(std::slice::from_ref(&self.fence), true, timeout)?
        };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_fence(self.fence, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<TimelineFence>();
    }
}
