// THEORY:
// Prediction-time augmentation. A classifier that sees a digit one pixel off-centre,
// slightly rotated or with a thinner stroke than its training data can flip its
// answer; averaging its output over a few perturbed copies smooths that out. This
// module only produces the copies. Each variant keeps the normalized-image
// invariants: same square size, values strictly 0 or 255.

use crate::core_modules::otsu::{BACKGROUND, DEFAULT_FALLBACK_THRESHOLD, FOREGROUND};
use crate::pipeline::NormalizedImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Translation, in output pixels, of the four shifted variants.
    pub shift_pixels: u32,
    /// Rotation of the rotated variant, in degrees.
    pub rotation_degrees: f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            shift_pixels: 1,
            rotation_degrees: 10.0,
        }
    }
}

fn with_values(source: &NormalizedImage, values: Vec<u8>) -> NormalizedImage {
    NormalizedImage {
        size: source.size,
        values,
        threshold: source.threshold,
        source_region: source.source_region,
    }
}

/// Translates the image by `(dx, dy)`; vacated pixels become background.
pub fn shift(image: &NormalizedImage, dx: i64, dy: i64) -> NormalizedImage {
    let size = image.size as i64;
    let mut values = vec![BACKGROUND; image.values.len()];
    for y in 0..size {
        for x in 0..size {
            let (sx, sy) = (x - dx, y - dy);
            if sx < 0 || sy < 0 || sx >= size || sy >= size {
                continue;
            }
            values[(y * size + x) as usize] = image.values[(sy * size + sx) as usize];
        }
    }
    with_values(image, values)
}

/// Rotates about the image centre with bilinear sampling, then re-binarizes.
pub fn rotate(image: &NormalizedImage, degrees: f64) -> NormalizedImage {
    let size = image.size as i64;
    let centre = image.size as f64 / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();

    let sample = |x: i64, y: i64| -> f64 {
        if x < 0 || y < 0 || x >= size || y >= size {
            return 0.0;
        }
        image.values[(y * size + x) as usize] as f64
    };

    let mut values = vec![BACKGROUND; image.values.len()];
    for y in 0..size {
        for x in 0..size {
            let dx = x as f64 + 0.5 - centre;
            let dy = y as f64 + 0.5 - centre;
            // Inverse mapping: where in the source does this output pixel come from.
            let sx = centre + dx * cos + dy * sin - 0.5;
            let sy = centre - dx * sin + dy * cos - 0.5;

            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let value = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            if value > DEFAULT_FALLBACK_THRESHOLD as f64 {
                values[(y * size + x) as usize] = FOREGROUND;
            }
        }
    }
    with_values(image, values)
}

/// 2x2 dilation: a pixel is lit if it or its left, upper or upper-left neighbour is.
pub fn thicken(image: &NormalizedImage) -> NormalizedImage {
    let size = image.size as usize;
    let mut values = vec![BACKGROUND; image.values.len()];
    for y in 0..size {
        for x in 0..size {
            let lit = [(0, 0), (1, 0), (0, 1), (1, 1)].iter().any(|&(ox, oy)| {
                x >= ox && y >= oy && image.values[(y - oy) * size + (x - ox)] == FOREGROUND
            });
            if lit {
                values[y * size + x] = FOREGROUND;
            }
        }
    }
    with_values(image, values)
}

/// The original followed by shifted left, right, up and down, rotated and thickened
/// copies.
pub fn augment(image: &NormalizedImage, config: &AugmentConfig) -> Vec<NormalizedImage> {
    let step = config.shift_pixels as i64;
    vec![
        image.clone(),
        shift(image, -step, 0),
        shift(image, step, 0),
        shift(image, 0, -step),
        shift(image, 0, step),
        rotate(image, config.rotation_degrees),
        thicken(image),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pixels(size: u32, lit: &[(u32, u32)]) -> NormalizedImage {
        let mut image = NormalizedImage::empty(size);
        for &(x, y) in lit {
            image.values[(y * size + x) as usize] = FOREGROUND;
        }
        image
    }

    fn lit_pixels(image: &NormalizedImage) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for y in 0..image.size {
            for x in 0..image.size {
                if image.value(x, y) == FOREGROUND {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn shifts_move_content_and_drop_edges() {
        let image = with_pixels(8, &[(0, 3), (5, 5)]);
        assert_eq!(lit_pixels(&shift(&image, -1, 0)), vec![(4, 5)]);
        assert_eq!(lit_pixels(&shift(&image, 1, 0)), vec![(1, 3), (6, 5)]);
        assert_eq!(lit_pixels(&shift(&image, 0, 1)), vec![(0, 4), (5, 6)]);
    }

    #[test]
    fn thicken_grows_down_and_right() {
        let image = with_pixels(8, &[(5, 5), (7, 7)]);
        assert_eq!(lit_pixels(&thicken(&image)), vec![(5, 5), (6, 5), (5, 6), (6, 6), (7, 7)]);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let image = with_pixels(28, &[(3, 4), (14, 14), (20, 2)]);
        assert_eq!(rotate(&image, 0.0), image);
    }

    #[test]
    fn centred_square_is_invariant_under_quarter_turn() {
        let mut lit = Vec::new();
        for y in 12..16 {
            for x in 12..16 {
                lit.push((x, y));
            }
        }
        let image = with_pixels(28, &lit);
        assert_eq!(rotate(&image, 90.0), image);
    }

    #[test]
    fn augment_yields_binary_variants() {
        let mut lit = Vec::new();
        for y in 5..23 {
            lit.push((13, y));
            lit.push((14, y));
        }
        let image = with_pixels(28, &lit);
        let variants = augment(&image, &AugmentConfig::default());
        assert_eq!(variants.len(), 7);
        assert_eq!(variants[0], image);
        for variant in &variants {
            assert_eq!(variant.size, 28);
            assert!(variant.is_binary());
            assert!(variant.foreground_count() > 0);
        }
    }
}
