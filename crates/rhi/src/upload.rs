//! One-shot resource upload.
//!
//! Geometry and textures are created in device-local memory and filled from
//! a host-visible upload buffer. The copy is recorded into an open command
//! buffer; the upload buffer must outlive that command buffer's execution,
//! which [`UploadBatch`] takes care of.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creates a device-local buffer and a host-visible upload buffer of the same
/// size.
///
/// # Errors
///
/// Returns [`RhiError::InvalidHandle`] if `usage` is not a copy destination
/// or if either allocation fails.
pub fn create_committed_buffer(
    device: &Arc<Device>,
    usage: BufferUsage,
    size: vk::DeviceSize,
) -> RhiResult<(Buffer, Buffer)> {
    if usage.final_state().is_none() {
        return Err(RhiError::InvalidHandle(format!(
            "{} buffers cannot be upload destinations",
            usage.name()
        )));
    }

    let gpu = Buffer::new(Arc::clone(device), usage, size)?;
    let upload = Buffer::new(Arc::clone(device), BufferUsage::Upload, size)?;
    Ok((gpu, upload))
}

/// Writes `data` into `upload` and records the copy into `gpu`, followed by a
/// barrier to the destination's read state.
///
/// # Errors
///
/// Returns an error if `data` does not fit in either buffer.
pub fn upload_data(
    cmd: &CommandBuffer,
    gpu: &Buffer,
    upload: &Buffer,
    data: &[u8],
) -> RhiResult<()> {
    let size = data.len() as vk::DeviceSize;
    if size > gpu.size() {
        return Err(RhiError::InvalidHandle(format!(
            "Upload of {} bytes exceeds {} buffer of {} bytes",
            size,
            gpu.usage().name(),
            gpu.size()
        )));
    }
    let Some((dst_access, dst_stage)) = gpu.usage().final_state() else {
        return Err(RhiError::InvalidHandle(format!(
            "{} buffers cannot be upload destinations",
            gpu.usage().name()
        )));
    };

    upload.write_data(0, data)?;
    cmd.copy_buffer(upload.handle(), gpu.handle(), size);
    cmd.buffer_barrier(gpu.handle(), dst_access, dst_stage);

    debug!("Recorded {} byte {} upload", size, gpu.usage().name());
    Ok(())
}

/// Upload buffers kept alive until the copies that read them have executed.
#[derive(Default)]
pub struct UploadBatch {
    buffers: Vec<Buffer>,
}

impl UploadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of an upload buffer referenced by recorded copies.
    pub fn retain(&mut self, upload: Buffer) {
        self.buffers.push(upload);
    }

    /// Number of buffers still held.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total bytes held in upload memory.
    pub fn total_bytes(&self) -> vk::DeviceSize {
        self.buffers.iter().map(Buffer::size).sum()
    }

    /// Drops every held upload buffer.
    ///
    /// Only call once the GPU has finished the recorded copies.
    pub fn release_upload_buffers(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        info!(
            "Releasing {} upload buffers ({} bytes)",
            self.buffers.len(),
            self.total_bytes()
        );
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let mut batch = UploadBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.total_bytes(), 0);
        batch.release_upload_buffers();
        assert!(batch.is_empty());
    }
}
