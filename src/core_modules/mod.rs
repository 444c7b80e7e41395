pub mod augment;
pub mod bounds_detector;
pub mod grayscale;
pub mod otsu;
pub mod padder;
pub mod pixel;
pub mod resampler;
pub mod segmenter;
pub mod utils;
