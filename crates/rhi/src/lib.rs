//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash` for everything the terrain renderer touches:
//! - Instance, adapter selection and device creation
//! - Swapchain and dynamic rendering
//! - Command pools and buffers, fences and timeline semaphores
//! - Buffers, images, textures, samplers and one-shot uploads
//! - Descriptor sets, shaders and graphics pipelines

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
