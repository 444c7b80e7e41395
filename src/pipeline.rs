// THEORY:
// The `pipeline` module is the top-level API of the crate. It wires the stateless
// stages into a single call:
//
//   raw RGBA -> bounds -> aspect-aware padding -> multi-stage resample -> luma
//            -> Otsu -> binary target x target image
//
// The pipeline holds configuration only. Every buffer it creates belongs to the
// current call and is dropped before it returns, so a `NormalizationPipeline` can be
// shared freely between threads and identical inputs always give identical outputs.
// An empty canvas is a defined result (all background), never an error.

use crate::core_modules::augment::{AugmentConfig, augment};
use crate::core_modules::bounds_detector::{ContentBoundsDetector, DetectionConfig};
use crate::core_modules::otsu::{BACKGROUND, DEFAULT_FALLBACK_THRESHOLD, FOREGROUND, OtsuBinarizer};
use crate::core_modules::padder::{AspectAwarePadder, PaddingConfig};
use crate::core_modules::pixel::pixel::{Pixel, PixelBufferView, RawImage};
use crate::core_modules::resampler::{MultiStageResampler, ResampleConfig};
use crate::core_modules::segmenter::{SegmentConfig, digit_segmenter};
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{NormalizeError, Result};
use image::{ExtendedColorType, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Re-export key data structures for the public API.
pub use crate::core_modules::bounds_detector::BoundingBox;
pub use crate::core_modules::grayscale::GrayscaleImage;
pub use crate::core_modules::segmenter::DigitRegion;

/// The MNIST convention.
pub const DEFAULT_TARGET_SIZE: u32 = 28;

/// Configuration for the NormalizationPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length of the square output image.
    pub target_size: u32,
    pub detection: DetectionConfig,
    pub padding: PaddingConfig,
    pub resample: ResampleConfig,
    /// Threshold used when Otsu finds no valid split (uniform image).
    pub fallback_threshold: u8,
    pub segment: SegmentConfig,
    pub augment: AugmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            detection: DetectionConfig::default(),
            padding: PaddingConfig::default(),
            resample: ResampleConfig::default(),
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
            segment: SegmentConfig::default(),
            augment: AugmentConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(NormalizeError::InvalidConfig("target_size must be positive".into()));
        }
        if self.resample.working_scale == 0 {
            return Err(NormalizeError::InvalidConfig("working_scale must be at least 1".into()));
        }
        let non_negative = [
            ("padding.minor_ratio", self.padding.minor_ratio),
            ("padding.major_ratio", self.padding.major_ratio),
            ("detection.min_threshold", self.detection.min_threshold),
            ("detection.std_dev_weight", self.detection.std_dev_weight),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(NormalizeError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number, got {value}"
                )));
            }
        }
        if !self.augment.rotation_degrees.is_finite() {
            return Err(NormalizeError::InvalidConfig(
                "augment.rotation_degrees must be finite".into(),
            ));
        }
        MultiStageResampler::new(self.resample.clone()).stage_chain(self.target_size)?;
        Ok(())
    }
}

/// The pipeline's terminal artifact: a square image holding only 0 and 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub size: u32,
    pub values: Vec<u8>,
    /// Threshold applied by the binarizer; `None` for the empty-canvas result.
    pub threshold: Option<u8>,
    /// Padded source region that was resampled; `None` for the empty-canvas result.
    pub source_region: Option<BoundingBox>,
}

impl NormalizedImage {
    /// The all-background image returned for an empty canvas.
    pub fn empty(size: u32) -> Self {
        Self {
            size,
            values: vec![BACKGROUND; size as usize * size as usize],
            threshold: None,
            source_region: None,
        }
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.values[y as usize * self.size as usize + x as usize]
    }

    pub fn is_binary(&self) -> bool {
        self.values.iter().all(|&v| v == BACKGROUND || v == FOREGROUND)
    }

    pub fn foreground_count(&self) -> usize {
        self.values.iter().filter(|&&v| v == FOREGROUND).count()
    }

    pub fn is_empty(&self) -> bool {
        self.foreground_count() == 0
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.size, self.size, |x, y| image::Luma([self.value(x, y)]))
    }

    /// Opaque RGBA copy, white strokes on black, suitable as pipeline input.
    pub fn to_raw_image(&self) -> RawImage {
        let mut raw = RawImage::filled(self.size, self.size, Pixel::new(0, 0, 0, 255));
        for y in 0..self.size {
            for x in 0..self.size {
                let v = self.value(x, y);
                raw.set_pixel(x, y, Pixel::new(v, v, v, 255));
            }
        }
        raw
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        image_helper::encode_png(self.size, self.size, &self.values, ExtendedColorType::L8)
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        image_helper::save_png(path, self.size, self.size, &self.values, ExtendedColorType::L8)
    }

    /// Row-major values scaled to `[0, 1]`.
    pub fn to_unit_tensor(&self) -> Vec<f32> {
        image_helper::to_unit_tensor(&self.values)
    }
}

/// One digit found by `normalize_digits`, with its normalized image.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedDigit {
    pub region: DigitRegion,
    pub image: NormalizedImage,
}

/// The main, top-level struct: a configured, stateless normalizer.
#[derive(Debug, Clone)]
pub struct NormalizationPipeline {
    config: PipelineConfig,
    detector: ContentBoundsDetector,
    padder: AspectAwarePadder,
    resampler: MultiStageResampler,
    binarizer: OtsuBinarizer,
}

impl Default for NormalizationPipeline {
    fn default() -> Self {
        Self::from_valid_config(PipelineConfig::default())
    }
}

impl NormalizationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PipelineConfig) -> Self {
        Self {
            detector: ContentBoundsDetector::new(config.detection.clone()),
            padder: AspectAwarePadder::new(config.padding.clone()),
            resampler: MultiStageResampler::new(config.resample.clone()),
            binarizer: OtsuBinarizer::new(config.fallback_threshold),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn target_size(&self) -> u32 {
        self.config.target_size
    }

    pub fn normalize(&self, image: &RawImage) -> Result<NormalizedImage> {
        self.normalize_view(&image.view())
    }

    /// Validates a borrowed buffer, then normalizes it. A length mismatch fails before
    /// any processing happens.
    pub fn normalize_buffer(&self, width: u32, height: u32, pixels: &[u8]) -> Result<NormalizedImage> {
        let view = PixelBufferView::new(width, height, pixels)?;
        self.normalize_view(&view)
    }

    pub fn normalize_view(&self, image: &PixelBufferView<'_>) -> Result<NormalizedImage> {
        // Stage 1: Content bounds
        let Some(content) = self.detector.detect(image) else {
            tracing::debug!(
                width = image.width(),
                height = image.height(),
                "no content detected, returning blank image"
            );
            return Ok(NormalizedImage::empty(self.config.target_size));
        };
        self.normalize_region(image, &content)
    }

    /// Pads, resamples and binarizes a caller-chosen content box.
    pub fn normalize_region(
        &self,
        image: &PixelBufferView<'_>,
        content: &BoundingBox,
    ) -> Result<NormalizedImage> {
        let target_size = self.config.target_size;
        let (width, height) = image.dimensions();
        content.check_within(width, height)?;

        // Stage 2: Aspect-aware padding
        let padded = self.padder.pad(content, image.dimensions());

        // Stage 3: Multi-stage resample + luma
        let gray = self.resampler.resample(image, &padded, target_size)?;

        // Stage 4: Otsu binarization
        let binarized = self.binarizer.binarize(&gray.values);
        tracing::debug!(
            ?content,
            ?padded,
            threshold = binarized.threshold,
            fallback = binarized.used_fallback,
            "normalized region"
        );

        Ok(NormalizedImage {
            size: target_size,
            values: binarized.values,
            threshold: Some(binarized.threshold),
            source_region: Some(padded),
        })
    }

    /// Splits the canvas into digits, left to right, and normalizes each one.
    pub fn normalize_digits(&self, image: &RawImage) -> Result<Vec<SegmentedDigit>> {
        let view = image.view();
        let regions = digit_segmenter::segment(&view, &self.detector, &self.config.segment);
        if regions.is_empty() {
            tracing::debug!("no digits detected");
        }
        regions
            .into_iter()
            .map(|region| {
                let normalized = self.normalize_region(&view, &region.bounding_box)?;
                Ok(SegmentedDigit {
                    region,
                    image: normalized,
                })
            })
            .collect()
    }

    /// Prediction-time variants of a normalized image, original first.
    pub fn augment(&self, image: &NormalizedImage) -> Vec<NormalizedImage> {
        augment(image, &self.config.augment)
    }
}

/// Normalizes with default settings and the given output size.
pub fn normalize(image: &RawImage, target_size: u32) -> Result<NormalizedImage> {
    let pipeline = NormalizationPipeline::new(PipelineConfig {
        target_size,
        ..PipelineConfig::default()
    })?;
    pipeline.normalize(image)
}
