// THEORY:
// Perceptual grayscale conversion. After resampling, every pixel sits on an opaque
// background, so alpha carries no information and is dropped here.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};

/// A square, single-channel image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayscaleImage {
    pub size: u32,
    pub values: Vec<u8>,
}

impl GrayscaleImage {
    pub fn new(size: u32, values: Vec<u8>) -> Self {
        debug_assert_eq!(values.len(), size as usize * size as usize);
        Self { size, values }
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.values[y as usize * self.size as usize + x as usize]
    }
}

/// Rounded BT.709 luma of each RGBA pixel: `round(0.2126 R + 0.7152 G + 0.0722 B)`.
pub fn to_grayscale(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(CHANNELS)
        .map(|px| {
            let luma = Pixel::new(px[0], px[1], px[2], px[3]).luma();
            luma.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
