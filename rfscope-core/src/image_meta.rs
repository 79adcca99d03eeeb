//! Image metadata extraction.
//!
//! Decodes an uploaded or on-disk image just far enough to learn its height,
//! width and channel count, which can then be fed to
//! [`ReceptiveFieldEngine::set_input_dimensions`](crate::engine::ReceptiveFieldEngine::set_input_dimensions).

use crate::error::ImageError;
use serde::Serialize;
use std::path::Path;

/// Dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl ImageDimensions {
    /// Decode an in-memory image (any format the `image` crate recognizes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode {
            message: e.to_string(),
        })?;
        Self::from_image(&img)
    }

    /// Decode an image file.
    pub fn from_path(path: &Path) -> Result<Self, ImageError> {
        if !path.exists() {
            return Err(ImageError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let img = image::open(path).map_err(|e| ImageError::Decode {
            message: e.to_string(),
        })?;
        Self::from_image(&img)
    }

    fn from_image(img: &image::DynamicImage) -> Result<Self, ImageError> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(ImageError::Empty { width, height });
        }
        Ok(Self {
            height,
            width,
            channels: u32::from(img.color().channel_count()),
        })
    }
}
