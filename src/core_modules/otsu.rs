// THEORY:
// Otsu's method picks the global threshold that best separates the histogram into
// two classes, by maximizing the between-class variance
// `w_fg * w_bg * (mean_fg - mean_bg)^2`. Smoothing in the resampler leaves soft,
// grey stroke edges whose level depends on brush width and scale factor, so a fixed
// cut would keep too much or too little; Otsu adapts per image.
//
// Candidate thresholds run over [1, 254]. Background is `<= t`, foreground `> t`.
// Candidates that leave a class empty are skipped, and the first maximum wins. When
// nothing qualifies (a uniform image) the configured fallback applies.

use serde::{Deserialize, Serialize};

pub const DEFAULT_FALLBACK_THRESHOLD: u8 = 128;
pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

const MIN_CANDIDATE: usize = 1;
const MAX_CANDIDATE: usize = 254;

/// Otsu's optimal threshold, or `None` when no candidate splits the values into two
/// non-empty classes.
pub fn otsu_threshold(gray: &[u8]) -> Option<u8> {
    if gray.is_empty() {
        return None;
    }

    let mut histogram = [0u64; 256];
    for &value in gray {
        histogram[value as usize] += 1;
    }

    let total = gray.len() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    // Cumulative background class: every value <= t.
    let mut background_count: f64 = histogram[..MIN_CANDIDATE].iter().map(|&c| c as f64).sum();
    let mut background_sum: f64 = histogram[..MIN_CANDIDATE]
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut best: Option<(u8, f64)> = None;
    for t in MIN_CANDIDATE..=MAX_CANDIDATE {
        background_count += histogram[t] as f64;
        background_sum += t as f64 * histogram[t] as f64;
        let foreground_count = total - background_count;
        if background_count == 0.0 || foreground_count == 0.0 {
            continue;
        }

        let weight_background = background_count / total;
        let weight_foreground = foreground_count / total;
        let mean_background = background_sum / background_count;
        let mean_foreground = (sum_total - background_sum) / foreground_count;
        let between = weight_foreground
            * weight_background
            * (mean_foreground - mean_background).powi(2);

        if best.is_none_or(|(_, best_between)| between > best_between) {
            best = Some((t as u8, between));
        }
    }

    best.map(|(t, _)| t)
}

/// Maps every value `> threshold` to 255 and everything else to 0.
pub fn apply_threshold(gray: &[u8], threshold: u8) -> Vec<u8> {
    gray.iter()
        .map(|&v| if v > threshold { FOREGROUND } else { BACKGROUND })
        .collect()
}

/// Otsu binarization with the default fallback.
pub fn binarize(gray: &[u8]) -> Vec<u8> {
    OtsuBinarizer::default().binarize(gray).values
}

/// Output of one binarization, with the threshold that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binarized {
    /// The threshold actually applied.
    pub threshold: u8,
    /// `true` when Otsu found no valid split and the fallback was used.
    pub used_fallback: bool,
    pub values: Vec<u8>,
}

/// Otsu binarizer with a fixed cut for histograms that cannot be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtsuBinarizer {
    pub fallback_threshold: u8,
}

impl Default for OtsuBinarizer {
    fn default() -> Self {
        Self {
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

impl OtsuBinarizer {
    pub fn new(fallback_threshold: u8) -> Self {
        Self { fallback_threshold }
    }

    pub fn binarize(&self, gray: &[u8]) -> Binarized {
        let (threshold, used_fallback) = match otsu_threshold(gray) {
            Some(t) => (t, false),
            None => {
                tracing::debug!(
                    fallback = self.fallback_threshold,
                    "degenerate histogram, using fallback threshold"
                );
                (self.fallback_threshold, true)
            }
        };
        Binarized {
            threshold,
            used_fallback,
            values: apply_threshold(gray, threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_levels_pick_first_maximum() {
        let gray = [0, 0, 255, 255, 0, 255];
        assert_eq!(otsu_threshold(&gray), Some(1));
        assert_eq!(binarize(&gray), vec![0, 0, 255, 255, 0, 255]);
    }

    #[test]
    fn separates_clusters() {
        let gray = [10, 10, 10, 10, 200, 210, 220, 230];
        assert_eq!(otsu_threshold(&gray), Some(10));
        assert_eq!(binarize(&gray), vec![0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn mid_grey_pair_splits_at_lower_value() {
        let gray = [50, 200, 50, 200];
        assert_eq!(otsu_threshold(&gray), Some(50));
    }

    #[test]
    fn uniform_image_falls_back() {
        let gray = vec![200u8; 16];
        assert_eq!(otsu_threshold(&gray), None);
        let result = OtsuBinarizer::default().binarize(&gray);
        assert!(result.used_fallback);
        assert_eq!(result.threshold, 128);
        assert!(result.values.iter().all(|&v| v == 255));

        let dark = OtsuBinarizer::default().binarize(&[40u8; 4]);
        assert!(dark.values.iter().all(|&v| v == 0));
    }

    #[test]
    fn values_at_histogram_edges_fall_back() {
        // No candidate in [1, 254] separates 0 from 1, or 255 from nothing.
        assert_eq!(otsu_threshold(&[0, 1, 0, 1]), None);
        assert_eq!(otsu_threshold(&[254, 255]), Some(254));
        assert_eq!(otsu_threshold(&[]), None);
    }

    #[test]
    fn threshold_stays_in_candidate_range() {
        let gray: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        let t = otsu_threshold(&gray).expect("two or more distinct values");
        assert!((1..=254).contains(&t));
        let out = binarize(&gray);
        assert_eq!(out.len(), gray.len());
        assert!(out.iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn fallback_is_configurable() {
        let result = OtsuBinarizer::new(250).binarize(&[200u8; 4]);
        assert_eq!(result.threshold, 250);
        assert!(result.values.iter().all(|&v| v == 0));
    }
}
