//! Image decoding into tightly packed RGBA8 pixels.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// A decoded image, four bytes per texel, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Converts any decoded image into RGBA8.
    ///
    /// 16-bit and grayscale sources (e.g. elevation maps) are narrowed and
    /// replicated into the color channels; alpha defaults to opaque.
    pub fn from_dynamic(image: image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Loads and decodes an image file as RGBA8.
///
/// # Errors
///
/// Returns [`ResourceError::FileNotFound`] if the path does not exist,
/// [`ResourceError::ImageDecode`] if the format is unsupported or corrupt and
/// [`ResourceError::EmptyImage`] for zero-sized images.
pub fn load_rgba8(path: &Path) -> ResourceResult<ImageData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    debug!("Decoding image {}", path.display());
    let decoded = image::open(path).map_err(|source| ResourceError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;

    let data = ImageData::from_dynamic(decoded);
    if data.width == 0 || data.height == 0 {
        return Err(ResourceError::EmptyImage(path.to_path_buf()));
    }

    info!(
        "Loaded image {} ({}x{}, {} bytes)",
        path.display(),
        data.width,
        data.height,
        data.byte_len()
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Luma};

    #[test]
    fn test_from_dynamic_gray16_expands_to_rgba() {
        let gray: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(3, 2, |x, _| Luma([if x == 0 { u16::MAX } else { 0 }]));
        let data = ImageData::from_dynamic(DynamicImage::ImageLuma16(gray));

        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.byte_len(), 3 * 2 * 4);
        assert_eq!(&data.pixels[0..4], &[255, 255, 255, 255]);
        assert_eq!(&data.pixels[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_rgba8(Path::new("does/not/exist.tif"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
