//! Descriptor tables.
//!
//! Each terrain table is one descriptor set with a single resource at binding
//! 0: a uniform buffer, or an image sampled through an immutable sampler baked
//! into the layout. Writes therefore only ever touch binding 0.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Every graphics stage the terrain pipelines use. Geometry is left out.
pub const TERRAIN_SHADER_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw()
        | vk::ShaderStageFlags::TESSELLATION_CONTROL.as_raw()
        | vk::ShaderStageFlags::TESSELLATION_EVALUATION.as_raw()
        | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// The resource a table holds at binding 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableResource {
    UniformBuffer,
    /// Combined image sampler whose sampler is fixed at layout creation.
    SampledImage(vk::Sampler),
}

impl TableResource {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            TableResource::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            TableResource::SampledImage(_) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// Layout of a one-binding table.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout with `resource` at binding 0, visible to `stages`.
    ///
    /// A sampler passed in [`TableResource::SampledImage`] must outlive the
    /// layout.
    pub fn new(
        device: Arc<Device>,
        resource: TableResource,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<Self> {
        let samplers = match resource {
            TableResource::SampledImage(sampler) => vec![sampler],
            TableResource::UniformBuffer => Vec::new(),
        };
        let mut binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(resource.descriptor_type())
            .descriptor_count(1)
            .stage_flags(stages);
        if !samplers.is_empty() {
            binding = binding.immutable_samplers(&samplers);
        }

        let bindings = [binding];
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        debug!("Table layout created: {:?} for {:?}", resource, stages);

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

/// Pool the renderer allocates all of its tables from.
///
/// Sets are released with the pool, never individually.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a pool with room for `max_sets` sets of the given sizes.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Descriptor pool created ({} sets)", max_sets);
        Ok(Self { device, pool })
    }

    /// Allocates one set per layout, in order.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Points binding 0 of `set` at `range` bytes of `buffer`.
    pub fn write_uniform_buffer(
        &self,
        set: vk::DescriptorSet,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(range)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&info);
        unsafe { self.device.handle().update_descriptor_sets(&[write], &[]) };
    }

    /// Points binding 0 of `set` at `view`, in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn write_sampled_image(&self, set: vk::DescriptorSet, view: vk::ImageView) {
        let info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&info);
        unsafe { self.device.handle().update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_descriptor_pool(self.pool, None) };
        debug!("Descriptor pool destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_stages_exclude_geometry() {
        assert!(!TERRAIN_SHADER_STAGES.contains(vk::ShaderStageFlags::GEOMETRY));
        assert!(TERRAIN_SHADER_STAGES.contains(
            vk::ShaderStageFlags::VERTEX
                | vk::ShaderStageFlags::TESSELLATION_CONTROL
                | vk::ShaderStageFlags::TESSELLATION_EVALUATION
                | vk::ShaderStageFlags::FRAGMENT
        ));
    }

    #[test]
    fn test_table_resource_types() {
        assert_eq!(
            TableResource::UniformBuffer.descriptor_type(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            TableResource::SampledImage(vk::Sampler::null()).descriptor_type(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }
}
