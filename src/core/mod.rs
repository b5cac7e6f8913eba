//! Core recognition pipeline.
//!
//! This module contains:
//! - Landmark normalization into feature vectors
//! - Sample augmentation and capture quality checks
//! - The nearest-neighbor gesture classifier
//! - The decision engine turning predictions into triggers

pub mod augment;
pub mod classifier;
pub mod decision;
pub mod normalize;
pub mod quality;

// Re-export commonly used types
pub use augment::{jitter_features, AugmentReport, Augmentor};
pub use classifier::{
    ClassifierError, GestureClassifier, ModelFile, ModelMetadata, Prediction, TrainingReport,
    MODEL_FORMAT_VERSION, NONE_LABEL, UNCALIBRATED_LABEL,
};
pub use decision::{Decision, DecisionConfig, DecisionEngine, Rejection, Trigger};
pub use normalize::{normalize_landmarks, FeatureVector, KeypointSet, FEATURE_LEN, KEYPOINT_COUNT};
pub use quality::{assess_capture, QualityIssue, QualityReport, QualityThresholds};
