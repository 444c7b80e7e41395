// THEORY:
// The `MultiStageResampler` shrinks an arbitrary crop down to the classifier's input
// size without losing thin strokes. A 300-pixel crop squeezed straight to 28x28
// aliases badly: a 15-pixel brush stroke can fall between sample points and vanish.
//
// Key architectural principles:
// 1.  **Stage chain**: content is first fitted onto a large square working canvas
//     (8x the target by default), then halved stage by stage until the target size
//     is reached. No single step shrinks linear resolution by more than 2x. Crops
//     much larger than the working canvas are pre-reduced by halvings as well.
// 2.  **Area averaging**: every destination pixel is the coverage-weighted mean of
//     the source pixels it overlaps. This is a box filter with fractional edges; it
//     never samples a single nearest pixel, so a stroke always leaves a trace.
// 3.  **Aspect-preserving fit**: each stage scales by `min(stage/w, stage/h)` and
//     centres the result on a uniform background with `(stage - scaled) / 2` offsets.
// 4.  **Opaque compositing**: source pixels are blended over the background colour by
//     their alpha once, up front. Every later canvas is fully opaque.
//
// All canvases are `image::RgbaImage`s owned by the current call.

use crate::core_modules::bounds_detector::BoundingBox;
use crate::core_modules::grayscale::{GrayscaleImage, to_grayscale};
use crate::core_modules::pixel::pixel::{CHANNELS, PixelBufferView};
use crate::error::{NormalizeError, Result};
use image::{Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};

/// Largest linear reduction allowed in one step.
const MAX_STEP_REDUCTION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// The first canvas is `target_size * working_scale` pixels square.
    pub working_scale: u32,
    /// Explicit square stage sizes, overriding the halving chain derived from
    /// `working_scale`. Must end at the target size.
    pub stage_sizes: Option<Vec<u32>>,
    /// RGB fill for letterboxing and for compositing translucent pixels.
    pub background: [u8; 3],
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            working_scale: 8,
            stage_sizes: None,
            background: [0, 0, 0],
        }
    }
}

/// Halving chain from `target * working_scale` down to `target`, e.g. 224, 112, 56, 28.
pub fn default_stage_chain(target_size: u32, working_scale: u32) -> Vec<u32> {
    let mut size = target_size.saturating_mul(working_scale.max(1));
    let mut chain = vec![size];
    while size > target_size {
        size = size.div_ceil(MAX_STEP_REDUCTION).max(target_size);
        chain.push(size);
    }
    chain
}

/// Checks that a chain is non-empty, never grows, never shrinks more than 2x per step
/// and lands on `target_size`.
pub fn validate_stage_chain(chain: &[u32], target_size: u32) -> Result<()> {
    let Some(&last) = chain.last() else {
        return Err(NormalizeError::InvalidConfig("stage chain is empty".into()));
    };
    if last != target_size {
        return Err(NormalizeError::InvalidConfig(format!(
            "stage chain ends at {last}, expected target size {target_size}"
        )));
    }
    if chain.contains(&0) {
        return Err(NormalizeError::InvalidConfig("stage sizes must be positive".into()));
    }
    for pair in chain.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next > prev {
            return Err(NormalizeError::InvalidConfig(format!(
                "stage chain grows from {prev} to {next}"
            )));
        }
        if next.saturating_mul(MAX_STEP_REDUCTION) < prev {
            return Err(NormalizeError::InvalidConfig(format!(
                "stage {prev} -> {next} shrinks by more than {MAX_STEP_REDUCTION}x"
            )));
        }
    }
    Ok(())
}

/// Source span and normalized coverage weights for one destination sample.
struct Tap {
    start: usize,
    weights: Vec<f64>,
}

/// Area-coverage weights mapping `src_len` samples onto `dst_len` samples.
fn axis_taps(src_len: usize, dst_len: usize) -> Vec<Tap> {
    let ratio = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| {
            let start = i as f64 * ratio;
            let end = start + ratio;
            let first = (start.floor() as usize).min(src_len - 1);
            let last = (end.ceil() as usize).clamp(first + 1, src_len);

            let mut weights: Vec<f64> = (first..last)
                .map(|j| {
                    let overlap = end.min(j as f64 + 1.0) - start.max(j as f64);
                    overlap.max(0.0)
                })
                .collect();
            let total: f64 = weights.iter().sum();
            if total > 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            } else {
                weights.iter_mut().for_each(|w| *w = 1.0 / (last - first) as f64);
            }
            Tap { start: first, weights }
        })
        .collect()
}

/// Separable area-averaging resize. Works for both reduction and enlargement.
pub fn area_resize(source: &RgbaImage, dst_width: u32, dst_height: u32) -> RgbaImage {
    let (src_width, src_height) = source.dimensions();
    if (src_width, src_height) == (dst_width, dst_height) {
        return source.clone();
    }
    let (sw, sh) = (src_width as usize, src_height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    let x_taps = axis_taps(sw, dw);
    let y_taps = axis_taps(sh, dh);
    let raw = source.as_raw();

    // Horizontal pass: sh rows of dw samples.
    let mut horizontal = vec![0.0f64; sh * dw * CHANNELS];
    for y in 0..sh {
        let row = &raw[y * sw * CHANNELS..(y + 1) * sw * CHANNELS];
        for (dx, tap) in x_taps.iter().enumerate() {
            let out = &mut horizontal[(y * dw + dx) * CHANNELS..(y * dw + dx + 1) * CHANNELS];
            for (k, weight) in tap.weights.iter().enumerate() {
                let sx = (tap.start + k) * CHANNELS;
                for c in 0..CHANNELS {
                    out[c] += weight * row[sx + c] as f64;
                }
            }
        }
    }

    // Vertical pass.
    let mut out = vec![0u8; dw * dh * CHANNELS];
    for (dy, tap) in y_taps.iter().enumerate() {
        for dx in 0..dw {
            let mut acc = [0.0f64; CHANNELS];
            for (k, weight) in tap.weights.iter().enumerate() {
                let index = ((tap.start + k) * dw + dx) * CHANNELS;
                for c in 0..CHANNELS {
                    acc[c] += weight * horizontal[index + c];
                }
            }
            let index = (dy * dw + dx) * CHANNELS;
            for c in 0..CHANNELS {
                out[index + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    RgbaImage::from_raw(dst_width, dst_height, out)
        .unwrap_or_else(|| RgbaImage::new(dst_width, dst_height))
}

#[derive(Debug, Clone, Default)]
pub struct MultiStageResampler {
    config: ResampleConfig,
}

impl MultiStageResampler {
    pub fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    /// The square stage sizes used for `target_size`.
    pub fn stage_chain(&self, target_size: u32) -> Result<Vec<u32>> {
        if target_size == 0 {
            return Err(NormalizeError::InvalidConfig("target size must be positive".into()));
        }
        let chain = match &self.config.stage_sizes {
            Some(custom) => custom.clone(),
            None => default_stage_chain(target_size, self.config.working_scale),
        };
        validate_stage_chain(&chain, target_size)?;
        Ok(chain)
    }

    fn background(&self) -> Rgba<u8> {
        let [r, g, b] = self.config.background;
        Rgba([r, g, b, 255])
    }

    /// Copies `region` out of the source, blending every pixel over the background.
    fn composite_region(&self, image: &PixelBufferView<'_>, region: &BoundingBox) -> RgbaImage {
        let [bg_r, bg_g, bg_b] = self.config.background;
        RgbaImage::from_fn(region.width(), region.height(), |x, y| {
            let pixel = image.pixel(region.min_x + x, region.min_y + y);
            let alpha = pixel.alpha as f64 / 255.0;
            let blend = |channel: u8, background: u8| {
                (channel as f64 * alpha + background as f64 * (1.0 - alpha))
                    .round()
                    .clamp(0.0, 255.0) as u8
            };
            Rgba([
                blend(pixel.red, bg_r),
                blend(pixel.green, bg_g),
                blend(pixel.blue, bg_b),
                255,
            ])
        })
    }

    /// Fits `source` into a `stage x stage` canvas, centred, aspect preserved.
    fn render_stage(&self, source: &RgbaImage, stage: u32) -> RgbaImage {
        let (width, height) = source.dimensions();
        let scale = (stage as f64 / width as f64).min(stage as f64 / height as f64);
        let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, stage);
        let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, stage);

        let scaled = area_resize(source, scaled_width, scaled_height);
        let mut canvas = RgbaImage::from_pixel(stage, stage, self.background());
        let offset_x = (stage - scaled_width) / 2;
        let offset_y = (stage - scaled_height) / 2;
        imageops::replace(&mut canvas, &scaled, offset_x as i64, offset_y as i64);
        canvas
    }

    /// Runs the full stage chain and returns every canvas, largest first. The last
    /// entry is `target_size x target_size`.
    pub fn resample_stages(
        &self,
        image: &PixelBufferView<'_>,
        region: &BoundingBox,
        target_size: u32,
    ) -> Result<Vec<RgbaImage>> {
        let (width, height) = image.dimensions();
        region.check_within(width, height)?;
        let chain = self.stage_chain(target_size)?;
        let first_stage = chain[0];

        let mut source = self.composite_region(image, region);
        while source.width().max(source.height()) > first_stage.saturating_mul(MAX_STEP_REDUCTION) {
            let reduced_width = source.width().div_ceil(MAX_STEP_REDUCTION).max(1);
            let reduced_height = source.height().div_ceil(MAX_STEP_REDUCTION).max(1);
            tracing::trace!(reduced_width, reduced_height, "pre-reducing crop");
            source = area_resize(&source, reduced_width, reduced_height);
        }

        let mut stages = Vec::with_capacity(chain.len());
        for stage in chain {
            let canvas = match stages.last() {
                Some(previous) => self.render_stage(previous, stage),
                None => self.render_stage(&source, stage),
            };
            tracing::trace!(stage, "rendered resample stage");
            stages.push(canvas);
        }
        Ok(stages)
    }

    /// Final `target_size x target_size` RGBA canvas.
    pub fn resample_rgba(
        &self,
        image: &PixelBufferView<'_>,
        region: &BoundingBox,
        target_size: u32,
    ) -> Result<RgbaImage> {
        let mut stages = self.resample_stages(image, region, target_size)?;
        stages
            .pop()
            .ok_or_else(|| NormalizeError::InvalidConfig("stage chain is empty".into()))
    }

    /// Resamples `region` to a `target_size` square grayscale image.
    pub fn resample(
        &self,
        image: &PixelBufferView<'_>,
        region: &BoundingBox,
        target_size: u32,
    ) -> Result<GrayscaleImage> {
        let canvas = self.resample_rgba(image, region, target_size)?;
        Ok(GrayscaleImage::new(target_size, to_grayscale(canvas.as_raw())))
    }
}
