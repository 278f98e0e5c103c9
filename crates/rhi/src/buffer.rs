//! Buffers backed by gpu-allocator memory.
//!
//! Geometry lives in device-local memory and is filled by a copy from an
//! [`Upload`](BufferUsage::Upload) buffer (see [`crate::upload`]). Constant
//! buffers sit in host-visible memory and stay mapped while they exist.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Constant buffer views are placed and sized in multiples of this.
pub const CONSTANT_BUFFER_ALIGNMENT: vk::DeviceSize = 256;

/// `size` rounded up to [`CONSTANT_BUFFER_ALIGNMENT`].
#[inline]
pub const fn align_constant_buffer_size(size: vk::DeviceSize) -> vk::DeviceSize {
    size.div_ceil(CONSTANT_BUFFER_ALIGNMENT) * CONSTANT_BUFFER_ALIGNMENT
}

/// What a buffer is for. Decides usage flags, memory and, for copy
/// destinations, the state an upload leaves it in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    /// 32-bit indices.
    Index,
    /// Shader constants rewritten by the host every frame.
    Constant,
    /// Staging source for a one-shot copy.
    Upload,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        if self.is_host_visible() {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, BufferUsage::Constant | BufferUsage::Upload)
    }

    /// Access and stage a copy into this buffer must be made visible to.
    /// `None` for buffers that are never copied into.
    pub fn final_state(self) -> Option<(vk::AccessFlags, vk::PipelineStageFlags)> {
        let access = match self {
            BufferUsage::Vertex => vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            BufferUsage::Index => vk::AccessFlags::INDEX_READ,
            BufferUsage::Constant | BufferUsage::Upload => return None,
        };
        Some((access, vk::PipelineStageFlags::VERTEX_INPUT))
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Constant => "constant",
            BufferUsage::Upload => "upload",
        }
    }
}

/// A VkBuffer bound to its own allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    // Taken in Drop so it can be handed back to the allocator.
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a `size`-byte buffer for `usage`. Zero sizes are rejected.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "empty {} buffer",
                usage.name()
            )));
        }

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.handle().create_buffer(&info, None)? };

        let allocation = unsafe {
            let requirements = device.handle().get_buffer_memory_requirements(buffer);
            device
                .allocator()
                .allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location: usage.memory_location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
                .and_then(|allocation| {
                    device
                        .handle()
                        .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                        .map(|()| allocation)
                        .map_err(RhiError::from)
                })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!("{} buffer: {} bytes", usage.name(), size);
        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Copies `data` into mapped memory starting at `offset`.
    ///
    /// Device-local buffers give [`RhiError::MemoryMapFailed`]; writes past
    /// the end give [`RhiError::InvalidHandle`].
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "write of {}..{} past end of {}-byte {} buffer",
                offset,
                end,
                self.size,
                self.usage.name()
            )));
        }

        let Some(base) = self.allocation.as_ref().and_then(Allocation::mapped_ptr) else {
            return Err(RhiError::MemoryMapFailed(format!(
                "{} buffer is device local",
                self.usage.name()
            )));
        };
        // The range was checked above and the mapping lives as long as the
        // allocation.
        unsafe {
            let dst = base.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes `value` at the start of the buffer.
    pub fn write_pod<T: Pod>(&self, value: &T) -> RhiResult<()> {
        self.write_data(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            error!("Leaking {} buffer memory: {}", self.usage.name(), e);
        }
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_buffers_are_copy_destinations() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert!(usage.to_vk_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
            assert!(usage.final_state().is_some());
        }
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
    }

    #[test]
    fn test_host_visible_buffers() {
        assert_eq!(
            BufferUsage::Constant.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferUsage::Upload.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        for usage in [BufferUsage::Constant, BufferUsage::Upload] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
            assert_eq!(usage.final_state(), None);
        }
    }

    #[test]
    fn test_final_state_targets_vertex_input() {
        assert_eq!(
            BufferUsage::Vertex.final_state(),
            Some((
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
                vk::PipelineStageFlags::VERTEX_INPUT
            ))
        );
        assert_eq!(
            BufferUsage::Index.final_state().map(|(access, _)| access),
            Some(vk::AccessFlags::INDEX_READ)
        );
    }

    #[test]
    fn test_constant_buffer_alignment() {
        assert_eq!(align_constant_buffer_size(1), 256);
        assert_eq!(align_constant_buffer_size(112), 256);
        assert_eq!(align_constant_buffer_size(256), 256);
        assert_eq!(align_constant_buffer_size(257), 512);
    }
}
