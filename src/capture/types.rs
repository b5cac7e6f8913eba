//! Frame and collaborator types for the capture loop.

use crate::core::normalize::KeypointSet;
use chrono::{DateTime, Utc};
use image::RgbImage;

/// One captured video frame.
///
/// Replayed recordings carry landmarks that were extracted ahead of time
/// and no image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the source stream
    pub index: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Option<RgbImage>,
    pub landmarks: Option<KeypointSet>,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self {
            index: 0,
            captured_at: Utc::now(),
            image: Some(image),
            landmarks: None,
        }
    }

    pub fn from_landmarks(landmarks: Option<KeypointSet>) -> Self {
        Self {
            index: 0,
            captured_at: Utc::now(),
            image: None,
            landmarks,
        }
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

/// Hand-landmark extraction, consumed as a black box.
pub trait HandPoseExtractor: Send + Sync {
    /// Keypoints of the most prominent hand, or `None` when no hand is visible.
    fn extract(&self, frame: &Frame) -> Option<KeypointSet>;
}

/// Uses landmarks already attached to the frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedLandmarks;

impl HandPoseExtractor for PrecomputedLandmarks {
    fn extract(&self, frame: &Frame) -> Option<KeypointSet> {
        frame.landmarks.clone().filter(KeypointSet::is_complete)
    }
}

/// A stream of frames.
pub trait FrameSource: Send {
    /// Next frame; `Ok(None)` when no frame is available yet.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// Errors raised by frame sources.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Recoverable; the loop backs off and retries
    Transient(String),
    /// The source has ended
    Closed,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Transient(e) => write!(f, "Transient capture failure: {e}"),
            CaptureError::Closed => write!(f, "Frame source closed"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::tests::sample_hand;

    #[test]
    fn test_precomputed_requires_complete_hand() {
        let frame = Frame::from_landmarks(Some(sample_hand((0.5, 0.5), 1.0)));
        assert!(PrecomputedLandmarks.extract(&frame).is_some());

        let partial = Frame::from_landmarks(Some(KeypointSet::new(vec![[0.0, 0.0, 0.0]; 5])));
        assert!(PrecomputedLandmarks.extract(&partial).is_none());

        let image_only = Frame::from_image(RgbImage::new(4, 4));
        assert!(PrecomputedLandmarks.extract(&image_only).is_none());
    }
}
