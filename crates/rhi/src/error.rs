//! Errors raised by the Vulkan layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan call failed: {0}")]
    VulkanError(#[from] ash::vk::Result),

    #[error("Vulkan loader unavailable: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Every adapter was filtered out or refused a device.
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A SPIR-V module is missing or malformed.
    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// An argument or handle the call cannot work with.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Host write into memory that is not mapped.
    #[error("Memory map failed: {0}")]
    MemoryMapFailed(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
