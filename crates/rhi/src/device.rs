//! Logical device, its queues and the memory allocator.
//!
//! Everything in this crate holds an `Arc<Device>`, so the device is the
//! last Vulkan object to go apart from the surface and instance.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, select_first};

const REQUIRED_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

#[derive(Clone, Copy, Debug)]
struct Queues {
    graphics: vk::Queue,
    present: vk::Queue,
}

/// The logical device.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queues: Queues,
    families: QueueFamilyIndices,
    // Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl Device {
    /// Opens a device on the first of `adapters` that accepts one. The
    /// adapters are expected in preference order.
    pub fn create_on_first_adapter(
        instance: &Instance,
        adapters: &[PhysicalDeviceInfo],
    ) -> RhiResult<Arc<Self>> {
        select_first(adapters, |adapter| Self::new(instance, adapter))
    }

    /// Opens a device on `adapter` with tessellation, wireframe fill,
    /// timeline semaphores and dynamic rendering enabled.
    pub fn new(instance: &Instance, adapter: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = adapter.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::InvalidHandle(format!(
                "'{}' cannot both draw and present",
                adapter.device_name()
            )));
        };

        let priority = [1.0f32];
        let queue_infos: Vec<_> = families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priority)
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::default()
            .tessellation_shader(true)
            .fill_mode_non_solid(true);
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let extensions: Vec<*const c_char> =
            REQUIRED_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vulkan12)
            .push_next(&mut vulkan13);
        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.device, &create_info, None)?
        };

        let queues = unsafe {
            Queues {
                graphics: device.get_device_queue(graphics_family, 0),
                present: device.get_device_queue(present_family, 0),
            }
        };
        debug!(
            "Queues: graphics family {}, present family {}",
            graphics_family, present_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: adapter.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!(
            "Device opened on '{}' ({})",
            adapter.device_name(),
            adapter.device_type_name()
        );

        Ok(Arc::new(Self {
            device,
            physical_device: adapter.device,
            queues,
            families,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.queues.present
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.families
    }

    /// Family every command pool is created on.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.families.graphics_family.unwrap_or_default()
    }

    /// Locks the allocator. A lock poisoned by a panicking thread is taken
    /// over as is.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Queues `submits` on the graphics queue, signalling `fence` (which
    /// may be null) when they retire.
    ///
    /// # Safety
    ///
    /// The command buffers must be recorded and closed, and no semaphore or
    /// fence in `submits` may belong to another pending submission.
    pub unsafe fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.queues.graphics, submits, fence)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Device not idle at teardown: {}", e);
            }
            // The allocator releases its blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Device closed");
    }
}

// SAFETY: queue handles are only used through the externally synchronized
// render thread, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_swapchain_extension_required() {
        assert_eq!(REQUIRED_EXTENSIONS, [ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
