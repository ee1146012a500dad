//! Decoded frames.

use image::RgbImage;

/// One decoded frame in RGB channel order, tagged with its index in the
/// source's native frame sequence.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw interleaved RGB bytes (`width * height * 3`).
    pub fn rgb_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}
