//! Sampled RGBA8 textures.
//!
//! [`upload_texture`] creates the device-local image and records the staging
//! copy with both layout transitions into an open command buffer.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};

/// Texel format of every texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Bytes per RGBA8 texel.
pub const BYTES_PER_TEXEL: usize = 4;

/// Stages that sample textures. The displacement map is read before
/// rasterization, the color map in the fragment stage.
const SAMPLING_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER.as_raw()
        | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
);

/// A device-local texture in `SHADER_READ_ONLY_OPTIMAL` once its upload ran.
pub struct Texture {
    image: Image,
    name: &'static str,
}

impl Texture {
    /// Returns the image view to bind.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.extent().width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.extent().height
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Checks that `pixels` holds exactly `width * height` RGBA8 texels.
pub fn expected_texture_size(width: u32, height: u32, pixels: &[u8]) -> RhiResult<usize> {
    let expected = width as usize * height as usize * BYTES_PER_TEXEL;
    if expected == 0 || pixels.len() != expected {
        return Err(RhiError::InvalidHandle(format!(
            "Texture data is {} bytes, expected {} for {}x{} RGBA8",
            pixels.len(),
            expected,
            width,
            height
        )));
    }
    Ok(expected)
}

/// Creates a texture and records its upload into `cmd`.
///
/// Returns the texture and the upload buffer, which must stay alive until
/// `cmd` has finished executing.
///
/// # Errors
///
/// Returns an error if the pixel data does not match the extent or any
/// allocation fails.
pub fn upload_texture(
    device: &Arc<Device>,
    cmd: &CommandBuffer,
    name: &'static str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> RhiResult<(Texture, Buffer)> {
    let size = expected_texture_size(width, height, pixels)?;

    let image = Image::new(
        Arc::clone(device),
        ImageDesc {
            name,
            extent: vk::Extent2D { width, height },
            format: TEXTURE_FORMAT,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
        },
    )?;

    let upload = Buffer::new(
        Arc::clone(device),
        BufferUsage::Upload,
        size as vk::DeviceSize,
    )?;
    upload.write_data(0, pixels)?;

    cmd.image_barrier(
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        &[image.layout_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        )],
    );

    let region = vk::BufferImageCopy::default()
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .layer_count(1),
        )
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });
    cmd.copy_buffer_to_image(upload.handle(), image.handle(), region);

    cmd.image_barrier(
        vk::PipelineStageFlags::TRANSFER,
        SAMPLING_STAGES,
        &[image.layout_barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        )],
    );

    debug!("Recorded {} upload: {}x{}", name, width, height);

    Ok((Texture { image, name }, upload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_texture_size() {
        let pixels = vec![0u8; 16 * 8 * 4];
        assert_eq!(expected_texture_size(16, 8, &pixels).unwrap(), 512);
    }

    #[test]
    fn test_expected_texture_size_mismatch() {
        let pixels = vec![0u8; 10];
        assert!(expected_texture_size(2, 2, &pixels).is_err());
        assert!(expected_texture_size(0, 0, &[]).is_err());
    }
}
