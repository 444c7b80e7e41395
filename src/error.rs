// THEORY:
// Every failure the pipeline can report is a caller-input problem: a pixel buffer
// whose length disagrees with its dimensions, or a configuration that cannot
// produce a valid stage chain. Degenerate statistics (empty canvas, uniform
// histogram) are NOT errors; they have explicit fallbacks in their modules.

use thiserror::Error;

/// Errors surfaced by the normalization pipeline and its helpers.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// The RGBA buffer does not hold exactly `width * height * 4` bytes.
    #[error("invalid pixel buffer for {width}x{height} RGBA image: expected {expected} bytes, got {actual}")]
    Validation {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("region ({min_x},{min_y})-({max_x},{max_y}) is inverted or lies outside the {width}x{height} image")]
    RegionOutOfBounds {
        min_x: u32,
        min_y: u32,
        max_x: u32,
        max_y: u32,
        width: u32,
        height: u32,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// The worker pool was shut down or a worker dropped its reply channel.
    #[error("worker pool unavailable: {0}")]
    WorkerUnavailable(String),
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
