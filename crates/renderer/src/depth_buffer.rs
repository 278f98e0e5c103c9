//! Depth attachment for the 3D draw modes.
//!
//! One `D32_SFLOAT` image shared by every frame slot. It is cleared at the
//! start of each frame, so its previous contents never matter and each frame
//! transitions it from `UNDEFINED`. The barrier still orders the new frame's
//! depth writes after the previous frame's.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use terrain_rhi::device::Device;
//! use terrain_rhi::vk;
//! use terrain_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<Device>) -> terrain_rhi::RhiResult<()> {
//! let depth_buffer = DepthBuffer::new(device, vk::Extent2D { width: 1280, height: 720 })?;
//! let _view = depth_buffer.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use terrain_rhi::RhiResult;
use terrain_rhi::device::Device;
use terrain_rhi::image::{Image, ImageDesc};

/// Depth format used by every pipeline.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const DEPTH_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Window-sized depth image plus view.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates a depth buffer matching `extent`.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or if allocation fails.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let image = Image::new(device, depth_image_desc(extent))?;
        info!(
            "Depth buffer created: {}x{} ({:?})",
            extent.width, extent.height, DEPTH_FORMAT
        );
        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// `(src, dst)` stages for [`attachment_barrier`](Self::attachment_barrier).
    #[inline]
    pub fn barrier_stages(&self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        (DEPTH_STAGES, DEPTH_STAGES)
    }

    /// Moves the image into `DEPTH_ATTACHMENT_OPTIMAL`, discarding contents.
    pub fn attachment_barrier(&self) -> vk::ImageMemoryBarrier<'static> {
        self.image.layout_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
    }
}

fn depth_image_desc(extent: vk::Extent2D) -> ImageDesc {
    ImageDesc {
        name: "depth",
        extent,
        format: DEPTH_FORMAT,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        aspect: vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format() {
        assert_eq!(DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_depth_image_desc() {
        let desc = depth_image_desc(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(desc.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert_eq!(desc.subresource_range().aspect_mask, vk::ImageAspectFlags::DEPTH);
    }
}
