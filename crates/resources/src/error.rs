//! Errors from loading the map images.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but `image` could not decode it.
    #[error("Failed to decode image '{}': {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Decoded to zero width or height.
    #[error("Image '{}' is empty", .0.display())]
    EmptyImage(PathBuf),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
