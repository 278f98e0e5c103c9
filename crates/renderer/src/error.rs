//! Renderer error types.
//!
//! Every failure is fatal except swapchain out-of-date, which the renderer
//! handles by recreating the swapchain.

use std::fmt;

use thiserror::Error;

/// Boxed error carried by the initialization and frame variants.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Startup sub-step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStage {
    Config,
    Instance,
    Surface,
    Device,
    Swapchain,
    DepthBuffer,
    FrameResources,
    Descriptors,
    Shaders,
    Pipelines,
    Assets,
    Upload,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Config => "configuration",
            InitStage::Instance => "instance creation",
            InitStage::Surface => "surface creation",
            InitStage::Device => "device creation",
            InitStage::Swapchain => "swapchain creation",
            InitStage::DepthBuffer => "depth buffer creation",
            InitStage::FrameResources => "frame resource creation",
            InitStage::Descriptors => "descriptor creation",
            InitStage::Shaders => "shader loading",
            InitStage::Pipelines => "pipeline creation",
            InitStage::Assets => "asset loading",
            InitStage::Upload => "initial upload",
        };
        f.write_str(name)
    }
}

/// Error type for the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A startup step failed. Initialization is aborted.
    #[error("Initialization failed during {stage}: {source}")]
    Initialization {
        stage: InitStage,
        #[source]
        source: BoxedError,
    },

    /// A frame could not be recorded, submitted, presented or synchronized.
    #[error("Frame {frame} failed: {source}")]
    Frame {
        frame: u64,
        #[source]
        source: BoxedError,
    },

    /// A frame-ring method was called out of order.
    #[error("Invalid frame transition: {operation} in state {state:?}")]
    FrameState {
        operation: &'static str,
        state: crate::frame::FrameState,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

/// Attaches a startup stage or a frame number to a lower-level error.
pub trait ErrorContext<T> {
    fn at_stage(self, stage: InitStage) -> RendererResult<T>;
    fn in_frame(self, frame: u64) -> RendererResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<BoxedError>,
{
    fn at_stage(self, stage: InitStage) -> RendererResult<T> {
        self.map_err(|e| RendererError::Initialization {
            stage,
            source: e.into(),
        })
    }

    fn in_frame(self, frame: u64) -> RendererResult<T> {
        self.map_err(|e| RendererError::Frame {
            frame,
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_rhi::RhiError;

    #[test]
    fn test_at_stage_wraps_source() {
        let result: Result<(), RhiError> = Err(RhiError::NoSuitableGpu);
        let err = result.at_stage(InitStage::Device).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Initialization {
                stage: InitStage::Device,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Initialization failed during device creation: No suitable GPU found"
        );
    }

    #[test]
    fn test_in_frame_keeps_frame_number() {
        let result: Result<(), RhiError> =
            Err(RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST));
        let err = result.in_frame(42).unwrap_err();
        assert!(matches!(err, RendererError::Frame { frame: 42, .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
