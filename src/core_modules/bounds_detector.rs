// THEORY:
// The `ContentBoundsDetector` answers one question: where on the canvas did the user
// actually draw? It is a two-pass, stateless utility.
//
// 1.  **Statistics pass**: every pixel that is not fully transparent contributes its
//     intensity (max of R/G/B) to a running Welford mean/variance. This learns what
//     "background" looks like for this particular canvas.
// 2.  **Adaptive cut**: the foreground threshold is `max(floor, mean - k * stddev)`.
//     Stroke contrast depends on brush colour and width, so no fixed constant works
//     for every drawing; the floor keeps near-black noise out when the canvas is
//     almost empty.
// 3.  **Extraction pass**: a pixel is foreground when it is opaque enough and brighter
//     than the cut. The running min/max of foreground coordinates is the bounding box.
//
// An empty canvas is not an error; `detect` returns `None` and the pipeline owns the
// fallback. A single lit pixel is a valid, zero-extent box.

use crate::core_modules::pixel::pixel::{Pixel, PixelBufferView};
use crate::error::{NormalizeError, Result};
use serde::{Deserialize, Serialize};

/// An inclusive, axis-aligned box in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    /// A box covering exactly one pixel.
    pub fn point(x: u32, y: u32) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grows the box to include `(x, y)`.
    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Width in pixels; never zero since the box is inclusive.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height() as f64
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Ok when the box is ordered (`min <= max` on both axes) and lies inside a
    /// `width x height` image.
    pub fn check_within(&self, width: u32, height: u32) -> Result<()> {
        let ordered = self.min_x <= self.max_x && self.min_y <= self.max_y;
        if !ordered || self.max_x >= width || self.max_y >= height {
            return Err(NormalizeError::RegionOutOfBounds {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
                width,
                height,
            });
        }
        Ok(())
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x as f64 + self.max_x as f64) / 2.0,
            (self.min_y as f64 + self.max_y as f64) / 2.0,
        )
    }
}

/// Tunables for foreground separation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Lower bound for the adaptive intensity cut.
    pub min_threshold: f64,
    /// Pixels with alpha at or below this value are never foreground.
    pub alpha_cutoff: u8,
    /// How many standard deviations below the mean the cut sits.
    pub std_dev_weight: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_threshold: 5.0,
            alpha_cutoff: 10,
            std_dev_weight: 1.0,
        }
    }
}

/// Intensity statistics of the non-transparent pixels of one canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    /// The adaptive foreground cut derived from `mean` and `std_dev`.
    pub threshold: f64,
}

/// Per-pixel foreground classification, row-major.
#[derive(Debug, Clone)]
pub struct ForegroundMask {
    pub width: u32,
    pub height: u32,
    pub stats: IntensityStats,
    mask: Vec<bool>,
}

impl ForegroundMask {
    #[inline]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.mask[y as usize * self.width as usize + x as usize]
    }

    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&lit| lit).count()
    }
}

/// Stateless foreground/background separator.
#[derive(Debug, Clone, Default)]
pub struct ContentBoundsDetector {
    config: DetectionConfig,
}

impl ContentBoundsDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// First pass: Welford mean/variance over the intensity of every pixel with alpha > 0.
    pub fn intensity_stats(&self, image: &PixelBufferView<'_>) -> IntensityStats {
        let mut count = 0u64;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;

        for (_, _, pixel) in image.enumerate_pixels() {
            if pixel.is_transparent() {
                continue;
            }
            count += 1;
            let value = pixel.intensity() as f64;
            let delta = value - mean;
            mean += delta / count as f64;
            m2 += delta * (value - mean);
        }

        let std_dev = if count > 0 { (m2 / count as f64).sqrt() } else { 0.0 };
        let threshold = self
            .config
            .min_threshold
            .max(mean - self.config.std_dev_weight * std_dev);

        IntensityStats {
            count,
            mean,
            std_dev,
            threshold,
        }
    }

    #[inline]
    pub fn is_foreground(&self, pixel: Pixel, stats: &IntensityStats) -> bool {
        pixel.alpha > self.config.alpha_cutoff && pixel.intensity() as f64 > stats.threshold
    }

    pub fn foreground_mask(&self, image: &PixelBufferView<'_>) -> ForegroundMask {
        let stats = self.intensity_stats(image);
        let mask = image
            .enumerate_pixels()
            .map(|(_, _, pixel)| self.is_foreground(pixel, &stats))
            .collect();
        ForegroundMask {
            width: image.width(),
            height: image.height(),
            stats,
            mask,
        }
    }

    /// Smallest box enclosing every foreground pixel, or `None` for an empty canvas.
    pub fn detect(&self, image: &PixelBufferView<'_>) -> Option<BoundingBox> {
        let stats = self.intensity_stats(image);
        if stats.count == 0 {
            return None;
        }

        let mut bounds: Option<BoundingBox> = None;
        for (x, y, pixel) in image.enumerate_pixels() {
            if !self.is_foreground(pixel, &stats) {
                continue;
            }
            match bounds.as_mut() {
                Some(b) => b.include(x, y),
                None => bounds = Some(BoundingBox::point(x, y)),
            }
        }

        tracing::trace!(
            mean = stats.mean,
            std_dev = stats.std_dev,
            threshold = stats.threshold,
            ?bounds,
            "content bounds"
        );
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::RawImage;

    const WHITE: Pixel = Pixel {
        red: 255,
        green: 255,
        blue: 255,
        alpha: 255,
    };
    const OPAQUE_BLACK: Pixel = Pixel {
        red: 0,
        green: 0,
        blue: 0,
        alpha: 255,
    };

    #[test]
    fn transparent_canvas_has_no_content() {
        let image = RawImage::filled(400, 400, Pixel::default());
        assert_eq!(ContentBoundsDetector::default().detect(&image.view()), None);
    }

    #[test]
    fn opaque_black_canvas_has_no_content() {
        let image = RawImage::filled(64, 64, OPAQUE_BLACK);
        let detector = ContentBoundsDetector::default();
        let stats = detector.intensity_stats(&image.view());
        assert_eq!(stats.count, 64 * 64);
        assert_eq!(stats.threshold, 5.0);
        assert_eq!(detector.detect(&image.view()), None);
    }

    #[test]
    fn finds_vertical_bar() {
        let mut image = RawImage::filled(400, 400, OPAQUE_BLACK);
        image.fill_rect(190, 100, 20, 200, WHITE);
        let bounds = ContentBoundsDetector::default().detect(&image.view());
        assert_eq!(bounds, Some(BoundingBox::new(190, 100, 209, 299)));
    }

    #[test]
    fn single_pixel_collapses_to_point() {
        let mut image = RawImage::filled(400, 400, Pixel::default());
        image.set_pixel(50, 50, WHITE);
        let bounds = ContentBoundsDetector::default()
            .detect(&image.view())
            .expect("one lit pixel");
        assert_eq!(bounds, BoundingBox::point(50, 50));
        assert_eq!((bounds.width(), bounds.height()), (1, 1));
    }

    #[test]
    fn faint_alpha_is_ignored() {
        let mut image = RawImage::filled(10, 10, OPAQUE_BLACK);
        image.set_pixel(3, 3, Pixel::new(255, 255, 255, 10));
        image.set_pixel(7, 8, WHITE);
        let bounds = ContentBoundsDetector::default().detect(&image.view());
        assert_eq!(bounds, Some(BoundingBox::point(7, 8)));
    }

    #[test]
    fn coloured_strokes_count_as_foreground() {
        let mut image = RawImage::filled(10, 10, OPAQUE_BLACK);
        image.set_pixel(1, 2, Pixel::new(0, 0, 200, 255));
        image.set_pixel(8, 4, Pixel::new(180, 0, 0, 255));
        let bounds = ContentBoundsDetector::default().detect(&image.view());
        assert_eq!(bounds, Some(BoundingBox::new(1, 2, 8, 4)));
    }

    #[test]
    fn threshold_follows_mean_minus_std_dev_above_floor() {
        let mut image = RawImage::filled(20, 20, Pixel::new(100, 100, 100, 255));
        image.fill_rect(5, 5, 2, 10, WHITE);
        let detector = ContentBoundsDetector::default();
        let stats = detector.intensity_stats(&image.view());
        assert!((stats.mean - 107.75).abs() < 1e-9);
        assert!((stats.threshold - (stats.mean - stats.std_dev)).abs() < 1e-9);
        assert!(stats.threshold > 5.0);

        let mask = detector.foreground_mask(&image.view());
        assert!(mask.is_foreground(5, 5));
        assert_eq!(mask.stats, stats);
    }

    #[test]
    fn floor_is_configurable() {
        let mut image = RawImage::filled(10, 10, OPAQUE_BLACK);
        image.set_pixel(4, 4, Pixel::new(40, 40, 40, 255));
        let strict = ContentBoundsDetector::new(DetectionConfig {
            min_threshold: 50.0,
            ..DetectionConfig::default()
        });
        assert_eq!(strict.detect(&image.view()), None);
        assert_eq!(
            ContentBoundsDetector::default().detect(&image.view()),
            Some(BoundingBox::point(4, 4))
        );
    }

    #[test]
    fn welford_matches_two_pass() {
        let mut image = RawImage::filled(4, 1, OPAQUE_BLACK);
        image.set_pixel(0, 0, Pixel::new(10, 0, 0, 255));
        image.set_pixel(1, 0, Pixel::new(0, 20, 0, 255));
        image.set_pixel(2, 0, Pixel::new(0, 0, 30, 255));
        image.set_pixel(3, 0, Pixel::new(40, 40, 40, 255));
        let stats = ContentBoundsDetector::default().intensity_stats(&image.view());
        assert!((stats.mean - 25.0).abs() < 1e-9);
        assert!((stats.std_dev - 125.0f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_geometry() {
        let mut b = BoundingBox::point(5, 5);
        b.include(2, 9);
        assert_eq!(b, BoundingBox::new(2, 5, 5, 9));
        assert_eq!((b.width(), b.height()), (4, 5));
        assert!(b.contains(3, 6));
        assert!(!b.contains(6, 6));
        assert_eq!(b.area(), 20);
    }

    #[test]
    fn check_within_rejects_inverted_and_outside_boxes() {
        assert!(BoundingBox::new(0, 0, 9, 9).check_within(10, 10).is_ok());
        assert!(BoundingBox::point(0, 0).check_within(1, 1).is_ok());

        let inverted_x = BoundingBox {
            min_x: 30,
            min_y: 10,
            max_x: 5,
            max_y: 20,
        };
        assert!(matches!(
            inverted_x.check_within(50, 50),
            Err(NormalizeError::RegionOutOfBounds { min_x: 30, max_x: 5, .. })
        ));
        let inverted_y = BoundingBox {
            min_x: 1,
            min_y: 8,
            max_x: 2,
            max_y: 3,
        };
        assert!(inverted_y.check_within(50, 50).is_err());
        assert!(BoundingBox::new(0, 0, 10, 3).check_within(10, 10).is_err());
        assert!(BoundingBox::point(0, 0).check_within(0, 0).is_err());
    }
}
