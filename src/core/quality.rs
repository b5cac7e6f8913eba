//! Capture quality assessment for single-shot samples.

use crate::core::normalize::KeypointSet;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Limits below/above which a capture is flagged.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    /// Mean luma below this is too dark
    pub min_brightness: f64,
    /// Mean luma above this is too bright
    pub max_brightness: f64,
    /// Laplacian variance below this is too blurry
    pub min_sharpness: f64,
    /// Hand bounding box as a fraction of the frame area
    pub min_hand_coverage: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_brightness: 40.0,
            max_brightness: 220.0,
            min_sharpness: 60.0,
            min_hand_coverage: 0.025,
        }
    }
}

/// A single quality problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    TooDark { brightness: f64 },
    TooBright { brightness: f64 },
    TooBlurry { sharpness: f64 },
    HandTooSmall { coverage: f64 },
    NoHand,
}

impl QualityIssue {
    /// What the user should do about it.
    pub fn message(&self) -> &'static str {
        match self {
            QualityIssue::TooDark { .. } => "Image is too dark. Add light or face a light source.",
            QualityIssue::TooBright { .. } => "Image is overexposed. Move away from direct light.",
            QualityIssue::TooBlurry { .. } => {
                "Image is blurry. Hold your hand still for the capture."
            }
            QualityIssue::HandTooSmall { .. } => {
                "Hand is too small in the frame. Move closer to the camera."
            }
            QualityIssue::NoHand => "No hand detected. Keep your whole hand inside the frame.",
        }
    }
}

/// Measurements and issues for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Mean luma, 0-255
    pub brightness: f64,
    /// Variance of the Laplacian response
    pub sharpness: f64,
    /// Hand bounding box area over frame area, when a hand is present
    pub hand_coverage: Option<f64>,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn is_acceptable(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message().to_string()).collect()
    }
}

/// Assess a captured frame and the keypoints extracted from it.
///
/// Keypoints are expected in image-normalized coordinates.
pub fn assess_capture(
    image: &RgbImage,
    keypoints: Option<&KeypointSet>,
    thresholds: &QualityThresholds,
) -> QualityReport {
    let luma = luma_plane(image);
    let width = image.width() as usize;
    let height = image.height() as usize;

    let brightness = if luma.is_empty() { 0.0 } else { luma.iter().mean() };
    let sharpness = laplacian_variance(&luma, width, height);
    let hand_coverage = keypoints
        .and_then(KeypointSet::bounding_box)
        .map(|(min_x, min_y, max_x, max_y)| {
            let w = (max_x.min(1.0) - min_x.max(0.0)).max(0.0);
            let h = (max_y.min(1.0) - min_y.max(0.0)).max(0.0);
            w * h
        });

    let mut issues = Vec::new();
    if brightness < thresholds.min_brightness {
        issues.push(QualityIssue::TooDark { brightness });
    } else if brightness > thresholds.max_brightness {
        issues.push(QualityIssue::TooBright { brightness });
    }
    if sharpness < thresholds.min_sharpness {
        issues.push(QualityIssue::TooBlurry { sharpness });
    }
    match hand_coverage {
        None => issues.push(QualityIssue::NoHand),
        Some(coverage) if coverage < thresholds.min_hand_coverage => {
            issues.push(QualityIssue::HandTooSmall { coverage })
        }
        Some(_) => {}
    }

    QualityReport {
        brightness,
        sharpness,
        hand_coverage,
        issues,
    }
}

fn luma_plane(image: &RgbImage) -> Vec<f64> {
    image
        .pixels()
        .map(|p| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
        .collect()
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(luma: &[f64], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut response = Vec::with_capacity((width - 2) * (height - 2));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = y * width + x;
            response.push(
                luma[i - width] + luma[i + width] + luma[i - 1] + luma[i + 1] - 4.0 * luma[i],
            );
        }
    }
    let variance = response.iter().variance();
    if variance.is_finite() {
        variance
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::tests::sample_hand;
    use image::Rgb;

    fn checkerboard(level_a: u8, level_b: u8) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([level_a; 3])
            } else {
                Rgb([level_b; 3])
            }
        })
    }

    #[test]
    fn test_sharp_well_lit_capture_passes() {
        let hand = sample_hand((0.5, 0.6), 1.0);
        let report = assess_capture(
            &checkerboard(60, 200),
            Some(&hand),
            &QualityThresholds::default(),
        );
        assert!(report.is_acceptable(), "issues: {:?}", report.issues);
        assert!((report.brightness - 130.0).abs() < 1.0);
    }

    #[test]
    fn test_flat_dark_frame_is_dark_and_blurry() {
        let image = RgbImage::from_pixel(32, 32, Rgb([10, 10, 10]));
        let hand = sample_hand((0.5, 0.6), 1.0);
        let report = assess_capture(&image, Some(&hand), &QualityThresholds::default());

        assert!(matches!(report.issues[0], QualityIssue::TooDark { .. }));
        assert!(matches!(report.issues[1], QualityIssue::TooBlurry { .. }));
        assert_eq!(report.sharpness, 0.0);
        assert_eq!(report.messages().len(), 2);
    }

    #[test]
    fn test_overexposed_frame() {
        let report = assess_capture(&checkerboard(200, 255), None, &QualityThresholds::default());
        assert!(report.issues.contains(&QualityIssue::NoHand));
        assert!(matches!(report.issues[0], QualityIssue::TooBright { .. }));
    }

    #[test]
    fn test_small_hand_flagged() {
        let tiny = KeypointSet::new(
            (0..21)
                .map(|i| [0.5 + 0.001 * i as f64, 0.5 + 0.001 * i as f64, 0.0])
                .collect(),
        );
        let report = assess_capture(
            &checkerboard(60, 200),
            Some(&tiny),
            &QualityThresholds::default(),
        );
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0], QualityIssue::HandTooSmall { .. }));
    }
}
