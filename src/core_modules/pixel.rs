// THEORY:
// The `pixel` module is the bottom of the normalization stack. It owns the two
// representations every other stage reads from:
//
// 1.  **Pixel**: a "dumb" RGBA container plus the two single-pixel heuristics the
//     pipeline needs. `intensity` (HSV value, max of R/G/B) drives stroke detection
//     because it treats a pure red or blue stroke as bright as a white one; `luma`
//     (BT.709) drives the grayscale stage because the classifier expects perceptual
//     brightness.
// 2.  **RawImage / PixelBufferView**: the caller owns a `RawImage`; every stage only
//     ever sees a `PixelBufferView`, a borrowed, length-checked window over the same
//     bytes. Validation happens exactly once, when the view is built, so downstream
//     indexing can trust `pixels.len() == width * height * 4`.

pub mod pixel {
    use crate::error::{NormalizeError, Result};
    use image::{DynamicImage, RgbaImage};

    pub type Byte = u8;
    pub type Bytes = Vec<Byte>;
    pub type Channel = Byte;
    pub type Intensity = Byte;
    pub type Luma = f64;

    pub const CHANNELS: usize = 4;

    const LUMA_RED: f64 = 0.2126;
    const LUMA_GREEN: f64 = 0.7152;
    const LUMA_BLUE: f64 = 0.0722;

    /// A single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// HSV value: brightness defined as max(R, G, B).
        pub fn intensity(&self) -> Intensity {
            self.red.max(self.green.max(self.blue))
        }

        /// Unrounded ITU-R BT.709 luma on the 0..255 scale. Alpha is ignored.
        pub fn luma(&self) -> Luma {
            LUMA_RED * self.red as f64 + LUMA_GREEN * self.green as f64 + LUMA_BLUE * self.blue as f64
        }

        pub fn is_transparent(&self) -> bool {
            self.alpha == 0
        }
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }

    fn expected_len(width: u32, height: u32) -> usize {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS))
            .unwrap_or(usize::MAX)
    }

    fn validate(width: u32, height: u32, actual: usize) -> Result<()> {
        let expected = expected_len(width, height);
        if expected != actual {
            return Err(NormalizeError::Validation {
                width,
                height,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// A caller-owned RGBA image. The pipeline only ever borrows it.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RawImage {
        width: u32,
        height: u32,
        pixels: Bytes,
    }

    impl RawImage {
        pub fn new(width: u32, height: u32, pixels: Bytes) -> Result<Self> {
            validate(width, height, pixels.len())?;
            Ok(Self {
                width,
                height,
                pixels,
            })
        }

        /// An image where every pixel has the same RGBA value.
        pub fn filled(width: u32, height: u32, fill: Pixel) -> Self {
            let rgba: [Byte; CHANNELS] = fill.into();
            let count = width as usize * height as usize;
            let mut pixels = Vec::with_capacity(count * CHANNELS);
            for _ in 0..count {
                pixels.extend_from_slice(&rgba);
            }
            Self {
                width,
                height,
                pixels,
            }
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn pixels(&self) -> &[Byte] {
            &self.pixels
        }

        pub fn into_pixels(self) -> Bytes {
            self.pixels
        }

        pub fn view(&self) -> PixelBufferView<'_> {
            PixelBufferView {
                width: self.width,
                height: self.height,
                pixels: &self.pixels,
            }
        }

        /// Writes one pixel. Out-of-bounds coordinates are ignored.
        pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
            if x >= self.width || y >= self.height {
                return;
            }
            let index = (y as usize * self.width as usize + x as usize) * CHANNELS;
            let rgba: [Byte; CHANNELS] = pixel.into();
            self.pixels[index..index + CHANNELS].copy_from_slice(&rgba);
        }

        /// Paints an axis-aligned rectangle, clipped to the image.
        pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, pixel: Pixel) {
            let x_end = x.saturating_add(width).min(self.width);
            let y_end = y.saturating_add(height).min(self.height);
            for py in y..y_end {
                for px in x..x_end {
                    self.set_pixel(px, py, pixel);
                }
            }
        }
    }

    impl From<RgbaImage> for RawImage {
        fn from(image: RgbaImage) -> Self {
            let (width, height) = image.dimensions();
            Self {
                width,
                height,
                pixels: image.into_raw(),
            }
        }
    }

    impl From<&DynamicImage> for RawImage {
        fn from(image: &DynamicImage) -> Self {
            RawImage::from(image.to_rgba8())
        }
    }

    /// A read-only, validated window over a `width * height * 4` RGBA buffer.
    #[derive(Debug, Clone, Copy)]
    pub struct PixelBufferView<'a> {
        width: u32,
        height: u32,
        pixels: &'a [Byte],
    }

    impl<'a> PixelBufferView<'a> {
        pub fn new(width: u32, height: u32, pixels: &'a [Byte]) -> Result<Self> {
            validate(width, height, pixels.len())?;
            Ok(Self {
                width,
                height,
                pixels,
            })
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        pub fn is_empty(&self) -> bool {
            self.width == 0 || self.height == 0
        }

        pub fn as_bytes(&self) -> &'a [Byte] {
            self.pixels
        }

        /// Caller guarantees `x < width` and `y < height`.
        #[inline]
        pub fn pixel(&self, x: u32, y: u32) -> Pixel {
            let index = (y as usize * self.width as usize + x as usize) * CHANNELS;
            Pixel::new(
                self.pixels[index],
                self.pixels[index + 1],
                self.pixels[index + 2],
                self.pixels[index + 3],
            )
        }

        /// Row-major iterator yielding `(x, y, pixel)`.
        pub fn enumerate_pixels(&self) -> impl Iterator<Item = (u32, u32, Pixel)> + 'a {
            let width = self.width.max(1);
            self.pixels
                .chunks_exact(CHANNELS)
                .enumerate()
                .map(move |(i, bytes)| {
                    let x = i as u32 % width;
                    let y = i as u32 / width;
                    (x, y, Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]))
                })
        }
    }

}
