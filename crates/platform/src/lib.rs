//! Platform layer for the terrain renderer.
//!
//! - Window management via winit
//! - Vulkan surface creation and the matching instance extensions
//! - Keyboard state and mouse drag tracking

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

pub use winit::event::{DeviceEvent, ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
