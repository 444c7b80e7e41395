// THEORY:
// This file is the main entry point for the `digit_normalizer` library crate.
//
// The crate turns a freehand drawing on an RGBA canvas into the canonical, binary,
// fixed-size image a handwritten-digit classifier expects. The public surface is the
// `NormalizationPipeline` (one canvas at a time), the `ParallelPipeline` (batches on a
// tokio worker pool) and their configuration and output types. The individual stages
// live in `core_modules` and stay usable on their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::pixel::pixel::{Pixel, PixelBufferView, RawImage};
pub use error::{NormalizeError, Result};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{
    BoundingBox, NormalizationPipeline, NormalizedImage, PipelineConfig, SegmentedDigit, normalize,
};
