//! Errors from the windowing side, before any Vulkan device exists.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// winit refused the window or one of its raw handles.
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation or surface extension lookup failed.
    #[error("Surface error: {0}")]
    Surface(String),
}

pub type Result<T> = std::result::Result<T, Error>;
