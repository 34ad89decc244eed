use std::sync::Arc;

use image::{ImageFormat, RgbImage};

/// A fully loaded, detector-ready image.
///
/// Only produced once loading has completed, so holders never observe a
/// partially decoded image. Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct ImageResource {
    pixels: Arc<RgbImage>,
    format: Option<ImageFormat>,
}

impl ImageResource {
    pub fn new(pixels: RgbImage, format: Option<ImageFormat>) -> Self {
        Self {
            pixels: Arc::new(pixels),
            format,
        }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Format sniffed from the bytes, if it could be determined.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }
}
