//! Descriptor sets and per-slot constant buffers.
//!
//! The displacement and color tables are written once. The constants table
//! has one set per frame slot, each pointing at that slot's persistently
//! mapped constant buffer, so the CPU never overwrites constants a frame
//! still in flight reads.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use terrain_rhi::RhiResult;
use terrain_rhi::buffer::{Buffer, BufferUsage, align_constant_buffer_size};
use terrain_rhi::descriptor::DescriptorPool;
use terrain_rhi::device::Device;

use crate::pipelines::TerrainLayouts;
use crate::terrain::TerrainAssets;
use crate::ubo::TerrainConstants;

/// Size of each constant buffer, rounded up to the constant buffer alignment.
pub const CONSTANT_BUFFER_SIZE: vk::DeviceSize =
    align_constant_buffer_size(TerrainConstants::SIZE as vk::DeviceSize);

/// Descriptor pool sizes for `frame_count` slots.
pub fn pool_sizes(frame_count: usize) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(2),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(frame_count as u32),
    ]
}

/// All descriptor sets the renderer binds.
pub struct TerrainDescriptors {
    constant_buffers: Vec<Buffer>,
    constants_sets: Vec<vk::DescriptorSet>,
    displacement_set: vk::DescriptorSet,
    color_set: vk::DescriptorSet,
    // Sets are freed with the pool.
    _pool: DescriptorPool,
}

impl TerrainDescriptors {
    /// Allocates and writes every set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool, a set or a constant buffer cannot be
    /// created.
    pub fn new(
        device: &Arc<Device>,
        layouts: &TerrainLayouts,
        assets: &TerrainAssets,
        frame_count: usize,
    ) -> RhiResult<Self> {
        let pool = DescriptorPool::new(
            Arc::clone(device),
            2 + frame_count as u32,
            &pool_sizes(frame_count),
        )?;

        let texture_sets =
            pool.allocate(&[layouts.displacement().handle(), layouts.color().handle()])?;
        let (displacement_set, color_set) = (texture_sets[0], texture_sets[1]);

        let constants_layouts = vec![layouts.constants().handle(); frame_count];
        let constants_sets = pool.allocate(&constants_layouts)?;

        let constant_buffers = (0..frame_count)
            .map(|_| Buffer::new(Arc::clone(device), BufferUsage::Constant, CONSTANT_BUFFER_SIZE))
            .collect::<RhiResult<Vec<_>>>()?;

        pool.write_sampled_image(displacement_set, assets.displacement.view());
        pool.write_sampled_image(color_set, assets.color.view());
        for (&set, buffer) in constants_sets.iter().zip(&constant_buffers) {
            pool.write_uniform_buffer(set, buffer.handle(), TerrainConstants::SIZE as vk::DeviceSize);
        }

        debug!(
            "Descriptor sets written: 2 texture tables, {} constants tables of {} bytes",
            frame_count, CONSTANT_BUFFER_SIZE
        );

        Ok(Self {
            constant_buffers,
            constants_sets,
            displacement_set,
            color_set,
            _pool: pool,
        })
    }

    /// Writes `constants` into `slot`'s buffer.
    pub fn write_constants(&self, slot: usize, constants: &TerrainConstants) -> RhiResult<()> {
        self.constant_buffers[slot].write_pod(constants)
    }

    #[inline]
    pub fn displacement_set(&self) -> vk::DescriptorSet {
        self.displacement_set
    }

    #[inline]
    pub fn color_set(&self) -> vk::DescriptorSet {
        self.color_set
    }

    #[inline]
    pub fn constants_set(&self, slot: usize) -> vk::DescriptorSet {
        self.constants_sets[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_size_is_aligned() {
        assert_eq!(CONSTANT_BUFFER_SIZE, 256);
        assert!(CONSTANT_BUFFER_SIZE >= TerrainConstants::SIZE as vk::DeviceSize);
    }

    #[test]
    fn test_pool_sizes_scale_with_frame_count() {
        let sizes = pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 2);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }
}
