//! Landmark normalization.
//!
//! Maps a raw per-hand keypoint set to a translation- and scale-invariant
//! feature vector. The first keypoint is always the wrist.

use serde::{Deserialize, Serialize};

/// Number of keypoints reported per detected hand.
pub const KEYPOINT_COUNT: usize = 21;

/// Length of a flattened feature vector (x, y, z per keypoint).
pub const FEATURE_LEN: usize = KEYPOINT_COUNT * 3;

/// Scales below this are treated as collapsed and left undivided.
const SCALE_EPSILON: f64 = 1e-6;

/// A normalized feature vector.
pub type FeatureVector = Vec<f64>;

/// Raw keypoints for one detected hand, in image-normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet {
    pub points: Vec<[f64; 3]>,
}

impl KeypointSet {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Build a keypoint set from a flat `[x0, y0, z0, x1, ...]` slice.
    ///
    /// Trailing values that do not form a full keypoint are ignored.
    pub fn from_flat(values: &[f64]) -> Self {
        Self {
            points: values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        }
    }

    /// Flatten to `[x0, y0, z0, x1, ...]`.
    pub fn flatten(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| p.iter().copied()).collect()
    }

    /// Whether this set has the expected number of keypoints.
    pub fn is_complete(&self) -> bool {
        self.points.len() == KEYPOINT_COUNT
    }

    /// Normalized feature vector for this hand.
    pub fn feature_vector(&self) -> FeatureVector {
        normalize_landmarks(&self.flatten())
    }

    /// Axis-aligned bounding box `(min_x, min_y, max_x, max_y)` in the x/y plane.
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        let first = self.points.first()?;
        let mut bbox = (first[0], first[1], first[0], first[1]);
        for p in &self.points[1..] {
            bbox.0 = bbox.0.min(p[0]);
            bbox.1 = bbox.1.min(p[1]);
            bbox.2 = bbox.2.max(p[0]);
            bbox.3 = bbox.3.max(p[1]);
        }
        Some(bbox)
    }
}

/// Normalize a flat keypoint sequence.
///
/// Every keypoint is made wrist-relative, then divided by the largest
/// keypoint-to-wrist distance. When that distance collapses below
/// [`SCALE_EPSILON`] the wrist-relative values are returned as they are.
pub fn normalize_landmarks(raw: &[f64]) -> FeatureVector {
    if raw.len() < 3 {
        return raw.to_vec();
    }

    let (wx, wy, wz) = (raw[0], raw[1], raw[2]);
    let mut out: Vec<f64> = raw
        .chunks_exact(3)
        .flat_map(|c| [c[0] - wx, c[1] - wy, c[2] - wz])
        .collect();

    let scale = out
        .chunks_exact(3)
        .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
        .fold(0.0_f64, f64::max);

    if scale >= SCALE_EPSILON {
        for v in &mut out {
            *v /= scale;
        }
    }

    out
}

/// Euclidean distance between two vectors of equal length.
///
/// Returns `None` when the lengths differ or the result is not finite.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let d = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt();
    d.is_finite().then_some(d)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A spread-finger pose with keypoints fanned out around the wrist.
    pub(crate) fn sample_hand(offset: (f64, f64), spread: f64) -> KeypointSet {
        let mut points = vec![[offset.0, offset.1, 0.0]];
        for finger in 0..5 {
            let angle = -0.9 + finger as f64 * 0.45 * spread;
            for joint in 1..=4 {
                let r = 0.04 * joint as f64 + 0.02 * finger as f64;
                points.push([
                    offset.0 + r * angle.sin(),
                    offset.1 - r * angle.cos(),
                    0.005 * joint as f64,
                ]);
            }
        }
        KeypointSet::new(points)
    }

    fn max_norm(v: &[f64]) -> f64 {
        v.chunks_exact(3)
            .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_wrist_is_origin_and_max_norm_is_one() {
        let hand = sample_hand((0.4, 0.6), 1.0);
        assert!(hand.is_complete());

        let v = hand.feature_vector();
        assert_eq!(v.len(), FEATURE_LEN);
        assert_eq!(&v[..3], &[0.0, 0.0, 0.0]);
        assert!((max_norm(&v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_translation_and_scale_invariance() {
        let a = sample_hand((0.2, 0.3), 1.0).flatten();
        let b: Vec<f64> = a
            .chunks_exact(3)
            .flat_map(|c| [c[0] * 2.5 + 0.1, c[1] * 2.5 - 0.3, c[2] * 2.5])
            .collect();

        let na = normalize_landmarks(&a);
        let nb = normalize_landmarks(&b);
        let d = euclidean_distance(&na, &nb).unwrap();
        assert!(d < 1e-9, "distance was {d}");
    }

    #[test]
    fn test_collapsed_scale_left_wrist_relative() {
        let raw = vec![0.5; FEATURE_LEN];
        let v = normalize_landmarks(&raw);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_distance_length_mismatch() {
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(euclidean_distance(&[3.0, 0.0], &[0.0, 4.0]), Some(5.0));
    }
}
