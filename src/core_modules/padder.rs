// THEORY:
// The `AspectAwarePadder` adds breathing room around the detected content before it
// is scaled. The margin is asymmetric: the axis along which the glyph is
// narrow gets the larger relative margin. A "1" is tall and thin, so 20% of its
// width is added horizontally and only 10% of its height vertically; a wide glyph
// gets the mirror image. Symmetric padding would, after the aspect-preserving fit in
// the resampler, make thin digits even thinner relative to the canvas.
//
// The padded box always grows outward to whole pixels (floor on the leading edge,
// ceil on the trailing edge) and is clamped to the source image, so a zero-extent
// box from a single pixel still becomes a box with real area.

use crate::core_modules::bounds_detector::BoundingBox;
use serde::{Deserialize, Serialize};

/// Additive margin in source pixels, always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    /// Fraction of the content extent added along the glyph's long axis.
    pub minor_ratio: f64,
    /// Fraction of the content extent added along the glyph's short axis.
    pub major_ratio: f64,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            minor_ratio: 0.1,
            major_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AspectAwarePadder {
    config: PaddingConfig,
}

impl AspectAwarePadder {
    pub fn new(config: PaddingConfig) -> Self {
        Self { config }
    }

    /// Margin for a content box, chosen by its aspect ratio.
    pub fn padding_for(&self, content: &BoundingBox) -> Padding {
        let width = content.width() as f64;
        let height = content.height() as f64;

        let (x_ratio, y_ratio) = if content.aspect_ratio() > 1.0 {
            (self.config.minor_ratio, self.config.major_ratio)
        } else {
            (self.config.major_ratio, self.config.minor_ratio)
        };

        Padding {
            x: (width * x_ratio).max(0.0),
            y: (height * y_ratio).max(0.0),
        }
    }

    /// Expands `content` by its padding and clamps the result to `image_bounds`.
    pub fn pad(&self, content: &BoundingBox, image_bounds: (u32, u32)) -> BoundingBox {
        let padding = self.padding_for(content);
        let (image_width, image_height) = image_bounds;
        let max_x_limit = image_width.saturating_sub(1) as f64;
        let max_y_limit = image_height.saturating_sub(1) as f64;

        let min_x = (content.min_x as f64 - padding.x).floor().clamp(0.0, max_x_limit);
        let min_y = (content.min_y as f64 - padding.y).floor().clamp(0.0, max_y_limit);
        let max_x = (content.max_x as f64 + padding.x).ceil().clamp(0.0, max_x_limit);
        let max_y = (content.max_y as f64 + padding.y).ceil().clamp(0.0, max_y_limit);

        BoundingBox::new(min_x as u32, min_y as u32, max_x as u32, max_y as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tall_content_gets_wider_horizontal_margin() {
        let padder = AspectAwarePadder::default();
        let bar = BoundingBox::new(190, 100, 209, 299);
        let padding = padder.padding_for(&bar);
        assert!((padding.x - 4.0).abs() < 1e-9);
        assert!((padding.y - 20.0).abs() < 1e-9);
        assert_eq!(padder.pad(&bar, (400, 400)), BoundingBox::new(186, 80, 213, 319));
    }

    #[test]
    fn wide_content_gets_taller_vertical_margin() {
        let padder = AspectAwarePadder::default();
        let dash = BoundingBox::new(100, 195, 299, 204);
        let padding = padder.padding_for(&dash);
        assert!((padding.x - 20.0).abs() < 1e-9);
        assert!((padding.y - 2.0).abs() < 1e-9);
        assert_eq!(padder.pad(&dash, (400, 400)), BoundingBox::new(80, 193, 319, 206));
    }

    #[test]
    fn square_content_is_treated_as_tall() {
        let padder = AspectAwarePadder::default();
        let square = BoundingBox::new(10, 10, 19, 19);
        let padding = padder.padding_for(&square);
        assert!((padding.x - 2.0).abs() < 1e-9);
        assert!((padding.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_pixel_grows_to_real_area() {
        let padded = AspectAwarePadder::default().pad(&BoundingBox::point(50, 50), (400, 400));
        assert_eq!(padded, BoundingBox::new(49, 49, 51, 51));
    }

    #[test]
    fn clamps_to_image_bounds() {
        let padder = AspectAwarePadder::default();
        let full = BoundingBox::new(0, 0, 9, 4);
        assert_eq!(padder.pad(&full, (10, 5)), full);

        let corner = BoundingBox::new(0, 0, 0, 0);
        assert_eq!(padder.pad(&corner, (1, 1)), corner);
    }

    #[test]
    fn ratios_are_configurable() {
        let padder = AspectAwarePadder::new(PaddingConfig {
            minor_ratio: 0.0,
            major_ratio: 0.0,
        });
        let bar = BoundingBox::new(190, 100, 209, 299);
        assert_eq!(padder.pad(&bar, (400, 400)), bar);
    }
}
