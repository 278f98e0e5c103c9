//! Presentation swapchain.
//!
//! Presents with FIFO and asks for one image per frame slot. 8-bit UNORM
//! formats are preferred so shader output reaches the screen without an sRGB
//! encode.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

const PREFERRED_FORMATS: [vk::Format; 2] =
    [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// What the surface offers a physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                loader.get_physical_device_surface_formats(physical_device, surface)?,
                loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A surface with no format or no present mode cannot be presented to.
    #[inline]
    pub fn is_usable(&self) -> bool {
        !(self.formats.is_empty() || self.present_modes.is_empty())
    }

    /// Resolves format, extent and image count for a `width`x`height`
    /// window wanting `image_count` images.
    pub fn plan(&self, width: u32, height: u32, image_count: u32) -> RhiResult<SwapchainPlan> {
        let format = pick_format(&self.formats)?;
        let caps = &self.capabilities;

        // u32::MAX means the window decides the size.
        let extent = if caps.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        } else {
            caps.current_extent
        };

        let mut count = image_count.max(caps.min_image_count);
        if caps.max_image_count != 0 {
            count = count.min(caps.max_image_count);
        }

        Ok(SwapchainPlan {
            format,
            extent,
            image_count: count,
            transform: caps.current_transform,
        })
    }
}

/// Creation parameters resolved against a surface.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

fn pick_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let preferred = PREFERRED_FORMATS.iter().find_map(|&wanted| {
        formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    });
    if let Some(&format) = preferred {
        return Ok(format);
    }

    let fallback = *formats
        .first()
        .ok_or_else(|| RhiError::SwapchainError("Surface reports no formats".to_string()))?;
    warn!("No UNORM surface format, falling back to {:?}", fallback.format);
    Ok(fallback)
}

/// A presentable image and the view the renderer draws through.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// Swapchain plus one color view per image.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    targets: Vec<SwapchainTarget>,
    plan: SwapchainPlan,
    requested_images: u32,
}

impl Swapchain {
    /// Creates a swapchain for a `width`x`height` window with room for
    /// `image_count` images, clamped to what the surface allows.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        image_count: u32,
    ) -> RhiResult<Self> {
        Self::build(
            instance,
            device,
            surface,
            (width, height),
            image_count,
            vk::SwapchainKHR::null(),
        )
    }

    fn build(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        (width, height): (u32, u32),
        requested_images: u32,
        retired: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let support = SurfaceSupport::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_usable() {
            return Err(RhiError::SwapchainError(
                "Surface has no formats or present modes".to_string(),
            ));
        }
        let plan = support.plan(width, height, requested_images)?;

        info!(
            "Swapchain {}x{} {:?}, {} images",
            plan.extent.width, plan.extent.height, plan.format.format, plan.image_count
        );

        let graphics = device.graphics_family();
        let present = device.queue_families().present_family.unwrap_or(graphics);
        let families = [graphics, present];
        let shared_families: &[u32] = if graphics == present { &[] } else { &families };
        let sharing = if shared_families.is_empty() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(shared_families)
            .pre_transform(plan.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(retired);

        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let targets = unsafe { loader.get_swapchain_images(swapchain) }
            .map_err(RhiError::from)
            .and_then(|images| color_targets(&device, &images, plan.format.format));
        let targets = match targets {
            Ok(targets) => targets,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            loader,
            swapchain,
            targets,
            plan,
            requested_images,
        })
    }

    /// Rebuilds for a new window size once the device is idle. The old
    /// swapchain is handed to the driver as `oldSwapchain` and then released.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;
        let rebuilt = Self::build(
            instance,
            Arc::clone(&self.device),
            surface,
            (width, height),
            self.requested_images,
            self.swapchain,
        )?;
        *self = rebuilt;
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore` once it is free.
    ///
    /// Returns `(image_index, suboptimal)`. `ERROR_OUT_OF_DATE_KHR` is left
    /// for the caller.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Queues `image_index` for presentation after `wait` is signalled.
    /// `Ok(true)` means suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait))
            .swapchains(std::slice::from_ref(&self.swapchain))
            .image_indices(std::slice::from_ref(&image_index));
        unsafe { self.loader.queue_present(queue, &info) }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.plan.format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn target(&self, index: usize) -> Option<SwapchainTarget> {
        self.targets.get(index).copied()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let device = self.device.handle();
        for target in &self.targets {
            unsafe { device.destroy_image_view(target.view, None) };
        }
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        debug!("Swapchain released ({} images)", self.targets.len());
    }
}

fn color_targets(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<SwapchainTarget>> {
    let mut targets: Vec<SwapchainTarget> = Vec::with_capacity(images.len());
    for &image in images {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        match unsafe { device.handle().create_image_view(&view_info, None) } {
            Ok(view) => targets.push(SwapchainTarget { image, view }),
            Err(e) => {
                for target in &targets {
                    unsafe { device.handle().destroy_image_view(target.view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Swapchain image view {} failed: {:?}",
                    targets.len(),
                    e
                )));
            }
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn support(min_images: u32, max_images: u32) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min_images,
                max_image_count: max_images,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                ..Default::default()
            },
            formats: vec![
                surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn test_plan_prefers_unorm() {
        let plan = support(2, 8).plan(1920, 1080, 3).unwrap();
        assert_eq!(plan.format.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_pick_format_falls_back_to_first() {
        let formats = [surface_format(
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        )];
        assert_eq!(
            pick_format(&formats).unwrap().format,
            vk::Format::R16G16B16A16_SFLOAT
        );
        assert!(pick_format(&[]).is_err());
    }

    #[test]
    fn test_plan_uses_fixed_surface_extent() {
        let mut fixed = support(2, 8);
        fixed.capabilities.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let plan = fixed.plan(800, 600, 3).unwrap();
        assert_eq!((plan.extent.width, plan.extent.height), (1280, 720));
    }

    #[test]
    fn test_plan_clamps_window_size() {
        let plan = support(2, 8).plan(10_000, 0, 3).unwrap();
        assert_eq!((plan.extent.width, plan.extent.height), (4096, 1));
    }

    #[test]
    fn test_plan_image_count_limits() {
        let count = |min, max| support(min, max).plan(64, 64, 3).unwrap().image_count;
        assert_eq!(count(2, 8), 3);
        assert_eq!(count(4, 8), 4);
        assert_eq!(count(1, 2), 2);
        assert_eq!(count(2, 0), 3);
    }

    #[test]
    fn test_unusable_surface() {
        let mut empty = support(2, 8);
        empty.present_modes.clear();
        assert!(!empty.is_usable());
    }
}
