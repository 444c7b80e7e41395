// THEORY:
// The `DigitSegmenter` handles canvases that hold more than one digit. It works on
// the same adaptive foreground mask as the `ContentBoundsDetector`, so "what counts
// as ink" is decided in exactly one place.
//
// Algorithm:
// 1.  **Seeding**: scan the mask row by row; every unvisited foreground pixel starts
//     a new region.
// 2.  **Region growing**: expand from the seed over all 8 neighbours. Diagonal
//     neighbours matter here because a thin, slanted pen stroke is often only
//     corner-connected after rasterization.
// 3.  **Noise rejection**: regions whose bounding box is narrower or shorter than
//     `min_component_size` are stray marks, not digits.
// 4.  **Reading order**: the surviving regions are sorted left to right and
//     numbered in that order.
//
// Like the detector it is stateless: one mask in, one list of regions out.

use crate::core_modules::bounds_detector::{BoundingBox, ContentBoundsDetector, ForegroundMask};
use crate::core_modules::pixel::pixel::PixelBufferView;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Minimum width and height, in source pixels, of a region kept as a digit.
    pub min_component_size: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_component_size: 10,
        }
    }
}

/// One connected group of foreground pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitRegion {
    /// Position in left-to-right reading order, starting at 0.
    pub id: u64,
    pub bounding_box: BoundingBox,
    /// Number of foreground pixels in the region.
    pub pixel_count: usize,
    pub center_of_mass: (f64, f64),
}

pub mod digit_segmenter {
    use super::*;

    const NEIGHBOURS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    /// Connected foreground regions of `mask`, noise removed, in reading order.
    pub fn find_digits(mask: &ForegroundMask, config: &SegmentConfig) -> Vec<DigitRegion> {
        let width = mask.width as usize;
        let height = mask.height as usize;
        let mut visited = vec![false; width * height];
        let mut regions: Vec<DigitRegion> = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if visited[y * width + x] || !mask.is_foreground(x as u32, y as u32) {
                    continue;
                }
                let region = grow_region(mask, &mut visited, x, y);
                let bounds = region.bounding_box;
                if bounds.width() < config.min_component_size
                    || bounds.height() < config.min_component_size
                {
                    tracing::trace!(?bounds, "discarding small component");
                    continue;
                }
                regions.push(region);
            }
        }

        regions.sort_by_key(|r| (r.bounding_box.min_x, r.bounding_box.min_y));
        for (id, region) in regions.iter_mut().enumerate() {
            region.id = id as u64;
        }
        regions
    }

    /// Breadth-first fill of one 8-connected component starting at `(seed_x, seed_y)`.
    fn grow_region(
        mask: &ForegroundMask,
        visited: &mut [bool],
        seed_x: usize,
        seed_y: usize,
    ) -> DigitRegion {
        let width = mask.width as usize;
        let height = mask.height as i64;
        let width_i64 = width as i64;

        let mut bounds = BoundingBox::point(seed_x as u32, seed_y as u32);
        let mut pixel_count = 0usize;
        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;

        let mut queue: VecDeque<(usize, usize)> = VecDeque::from([(seed_x, seed_y)]);
        visited[seed_y * width + seed_x] = true;

        while let Some((x, y)) = queue.pop_front() {
            bounds.include(x as u32, y as u32);
            pixel_count += 1;
            sum_x += x as f64;
            sum_y += y as f64;

            for (dx, dy) in NEIGHBOURS {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || nx >= width_i64 || ny < 0 || ny >= height {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                let index = ny * width + nx;
                if !visited[index] && mask.is_foreground(nx as u32, ny as u32) {
                    visited[index] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        DigitRegion {
            id: 0,
            bounding_box: bounds,
            pixel_count,
            center_of_mass: (sum_x / pixel_count as f64, sum_y / pixel_count as f64),
        }
    }

    /// Builds the foreground mask with `detector` and segments it.
    pub fn segment(
        image: &PixelBufferView<'_>,
        detector: &ContentBoundsDetector,
        config: &SegmentConfig,
    ) -> Vec<DigitRegion> {
        let mask = detector.foreground_mask(image);
        find_digits(&mask, config)
    }
}

#[cfg(test)]
mod tests {
    use super::digit_segmenter::*;
    use super::*;
    use crate::core_modules::pixel::pixel::{Pixel, RawImage};

    const WHITE: Pixel = Pixel {
        red: 255,
        green: 255,
        blue: 255,
        alpha: 255,
    };

    fn canvas() -> RawImage {
        RawImage::filled(200, 100, Pixel::new(0, 0, 0, 255))
    }

    #[test]
    fn empty_canvas_has_no_digits() {
        let image = canvas();
        let regions = segment(&image.view(), &ContentBoundsDetector::default(), &SegmentConfig::default());
        assert!(regions.is_empty());
    }

    #[test]
    fn regions_are_sorted_left_to_right() {
        let mut image = canvas();
        image.fill_rect(120, 10, 15, 60, WHITE);
        image.fill_rect(20, 30, 30, 40, WHITE);
        let regions = segment(&image.view(), &ContentBoundsDetector::default(), &SegmentConfig::default());
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].bounding_box, BoundingBox::new(20, 30, 49, 69));
        assert_eq!(regions[0].pixel_count, 30 * 40);
        assert_eq!(regions[1].bounding_box, BoundingBox::new(120, 10, 134, 69));
        assert_eq!(regions[1].id, 1);
        let (cx, cy) = regions[1].center_of_mass;
        assert!((cx - 127.0).abs() < 1e-9);
        assert!((cy - 39.5).abs() < 1e-9);
    }

    #[test]
    fn specks_are_discarded() {
        let mut image = canvas();
        image.fill_rect(20, 30, 30, 40, WHITE);
        image.fill_rect(150, 5, 3, 3, WHITE);
        // Long but thin: 40 wide, 2 tall.
        image.fill_rect(100, 90, 40, 2, WHITE);
        let regions = segment(&image.view(), &ContentBoundsDetector::default(), &SegmentConfig::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounding_box.min_x, 20);
    }

    #[test]
    fn diagonal_strokes_stay_connected() {
        let mut image = RawImage::filled(20, 20, Pixel::new(0, 0, 0, 255));
        for i in 0..15 {
            image.set_pixel(2 + i, 2 + i, WHITE);
        }
        let detector = ContentBoundsDetector::default();
        let mask = detector.foreground_mask(&image.view());
        let regions = find_digits(&mask, &SegmentConfig { min_component_size: 1 });
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].pixel_count, 15);
        assert_eq!(regions[0].bounding_box, BoundingBox::new(2, 2, 16, 16));
    }
}
