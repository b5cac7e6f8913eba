//! Instance-based gesture classifier.
//!
//! A k-nearest-neighbor model over normalized feature vectors. Besides the
//! voted label and its confidence, every prediction reports the mean
//! distance to the closest stored samples so callers can reject poses that
//! look nothing like the training set.

use crate::registry::dataset::dataset_signature;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Current on-disk bundle version.
pub const MODEL_FORMAT_VERSION: u32 = 2;

/// Label returned by [`GestureClassifier::predict`] before any successful fit.
pub const UNCALIBRATED_LABEL: &str = "uncalibrated";

/// Label used when no gesture should be reported.
pub const NONE_LABEL: &str = "none";

/// Seed for the stratified holdout split.
pub const SPLIT_SEED: u64 = 42;

const DEFAULT_NEIGHBORS: usize = 5;
const DISTANCE_NEIGHBORS: usize = 3;
const HOLDOUT_MIN_SAMPLES: usize = 12;
const HOLDOUT_FRACTION: f64 = 0.2;

/// Classifier errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// Training was requested with no samples.
    InsufficientData,
    /// Samples and labels have different lengths.
    LengthMismatch { samples: usize, labels: usize },
    /// A vector does not have the dimension the model was fit with.
    DimensionMismatch { expected: usize, got: usize },
    /// The persisted bundle could not be encoded or decoded.
    Serialization(String),
    /// Filesystem failure while saving or loading.
    Io(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::InsufficientData => write!(f, "No data to train"),
            ClassifierError::LengthMismatch { samples, labels } => {
                write!(f, "Sample/label count mismatch: {samples} samples, {labels} labels")
            }
            ClassifierError::DimensionMismatch { expected, got } => {
                write!(f, "Feature dimension mismatch: expected {expected}, got {got}")
            }
            ClassifierError::Serialization(e) => write!(f, "Model serialization error: {e}"),
            ClassifierError::Io(e) => write!(f, "Model IO error: {e}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Fitted k-NN parameters: the neighbor count and the stored training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    #[serde(alias = "n_neighbors")]
    pub k: usize,
    pub samples: Vec<Vec<f64>>,
    pub labels: Vec<String>,
}

impl KnnModel {
    fn fit(samples: Vec<Vec<f64>>, labels: Vec<String>) -> Self {
        let k = DEFAULT_NEIGHBORS.clamp(1, samples.len().max(1));
        Self { k, samples, labels }
    }

    fn dimension(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    /// Distances to every stored sample, nearest first.
    fn ranked(&self, query: &[f64]) -> Result<Vec<(f64, usize)>, ClassifierError> {
        let expected = self.dimension();
        if query.len() != expected {
            return Err(ClassifierError::DimensionMismatch {
                expected,
                got: query.len(),
            });
        }

        let mut ranked: Vec<(f64, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let d = s
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (d, i)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(ranked)
    }

    fn predict(&self, query: &[f64]) -> Result<Prediction, ClassifierError> {
        let ranked = self.ranked(query)?;
        let k = self.k.clamp(1, ranked.len().max(1));
        let nearest = &ranked[..k.min(ranked.len())];

        // label -> (votes, summed distance)
        let mut votes: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for &(d, i) in nearest {
            let entry = votes.entry(self.labels[i].as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += d;
        }

        let (label, (count, _)) = votes
            .iter()
            .max_by(|a, b| {
                a.1 .0
                    .cmp(&b.1 .0)
                    .then_with(|| b.1 .1.total_cmp(&a.1 .1))
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(l, v)| (*l, *v))
            .ok_or(ClassifierError::InsufficientData)?;

        let few = &nearest[..DISTANCE_NEIGHBORS.min(nearest.len())];
        let neighbor_distance = if few.iter().all(|(d, _)| d.is_finite()) {
            Some(few.iter().map(|(d, _)| d).sum::<f64>() / few.len() as f64)
        } else {
            None
        };

        Ok(Prediction {
            label: label.to_string(),
            confidence: count as f64 / nearest.len() as f64,
            neighbor_distance,
        })
    }
}

/// Metadata recorded at fit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Sorted distinct classes seen at fit time
    pub classes: Vec<String>,
    /// Held-out accuracy, when a holdout split was possible
    pub validation_accuracy: Option<f64>,
    /// Number of samples used for the final fit
    pub training_samples: usize,
    /// When the model was fit
    pub trained_at: Option<DateTime<Utc>>,
    /// Signature of the exact dataset the model was fit on
    pub dataset_signature: Option<String>,
}

/// Output of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Vote proportion in [0, 1]
    pub confidence: f64,
    /// Mean distance to the nearest few training samples
    pub neighbor_distance: Option<f64>,
}

impl Prediction {
    pub fn uncalibrated() -> Self {
        Self {
            label: UNCALIBRATED_LABEL.to_string(),
            confidence: 0.0,
            neighbor_distance: None,
        }
    }

    pub fn none() -> Self {
        Self {
            label: NONE_LABEL.to_string(),
            confidence: 0.0,
            neighbor_distance: None,
        }
    }

    pub fn is_uncalibrated(&self) -> bool {
        self.label == UNCALIBRATED_LABEL
    }
}

/// Summary of a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub classes: Vec<String>,
    pub neighbors: usize,
    pub validation_accuracy: Option<f64>,
}

impl std::fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trained on {} samples across {} classes (k={})",
            self.samples,
            self.classes.len(),
            self.neighbors
        )?;
        if let Some(acc) = self.validation_accuracy {
            write!(f, ", validation accuracy {:.1}%", acc * 100.0)?;
        }
        Ok(())
    }
}

/// Versioned bundle written by [`GestureClassifier::save`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub model: KnnModel,
    pub metadata: ModelMetadata,
}

/// Older wrapper shape: the model plus a bare class list and epoch timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyWrapper {
    pub model: KnnModel,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub trained_at: Option<f64>,
}

/// Every shape a persisted model file may take.
#[derive(Debug, Clone)]
pub enum ModelFile {
    VersionedBundle(ModelBundle),
    LegacyWrapper(LegacyWrapper),
    LegacyEstimator(KnnModel),
    Invalid(String),
}

impl ModelFile {
    /// Decode file content, trying the current format first and then each
    /// legacy shape in a fixed order.
    pub fn decode(content: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(e) => return ModelFile::Invalid(e.to_string()),
        };

        let mut bundle_error = None;
        if value.get("format_version").is_some() {
            match serde_json::from_value::<ModelBundle>(value.clone()) {
                Ok(bundle) if bundle.format_version <= MODEL_FORMAT_VERSION => {
                    return ModelFile::VersionedBundle(bundle);
                }
                Ok(bundle) => {
                    return ModelFile::Invalid(format!(
                        "unsupported model format version {}",
                        bundle.format_version
                    ));
                }
                Err(e) => bundle_error = Some(e.to_string()),
            }
        }

        if let Ok(wrapper) = serde_json::from_value::<LegacyWrapper>(value.clone()) {
            return ModelFile::LegacyWrapper(wrapper);
        }

        match serde_json::from_value::<KnnModel>(value) {
            Ok(model) => ModelFile::LegacyEstimator(model),
            Err(e) => ModelFile::Invalid(bundle_error.unwrap_or_else(|| e.to_string())),
        }
    }

    /// Turn the decoded file into a classifier, upgrading legacy shapes.
    pub fn into_classifier(self) -> Result<GestureClassifier, ClassifierError> {
        let (model, metadata) = match self {
            ModelFile::VersionedBundle(bundle) => (bundle.model, bundle.metadata),
            ModelFile::LegacyWrapper(wrapper) => {
                let trained_at = wrapper
                    .trained_at
                    .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));
                let metadata = upgraded_metadata(&wrapper.model, trained_at);
                (wrapper.model, metadata)
            }
            ModelFile::LegacyEstimator(model) => {
                let metadata = upgraded_metadata(&model, None);
                (model, metadata)
            }
            ModelFile::Invalid(reason) => return Err(ClassifierError::Serialization(reason)),
        };

        validate_model(&model)?;
        Ok(GestureClassifier {
            model: Some(model),
            metadata,
        })
    }
}

/// The stored training set is the model, so legacy files can recover the
/// signature and class list they were fit on.
fn upgraded_metadata(model: &KnnModel, trained_at: Option<DateTime<Utc>>) -> ModelMetadata {
    ModelMetadata {
        classes: sorted_classes(&model.labels),
        validation_accuracy: None,
        training_samples: model.samples.len(),
        trained_at,
        dataset_signature: Some(dataset_signature(&model.samples, &model.labels)),
    }
}

fn validate_model(model: &KnnModel) -> Result<(), ClassifierError> {
    if model.samples.is_empty() {
        return Err(ClassifierError::Serialization("model holds no samples".into()));
    }
    if model.samples.len() != model.labels.len() {
        return Err(ClassifierError::LengthMismatch {
            samples: model.samples.len(),
            labels: model.labels.len(),
        });
    }
    let dim = model.samples[0].len();
    if let Some(bad) = model.samples.iter().find(|s| s.len() != dim) {
        return Err(ClassifierError::DimensionMismatch {
            expected: dim,
            got: bad.len(),
        });
    }
    Ok(())
}

fn sorted_classes(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Split indices into (train, test), stratified by label.
///
/// Classes with a single sample stay entirely in the training split.
fn stratified_split(labels: &[String], fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut indices) in by_class {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * fraction).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// The gesture classifier and its fit-time metadata.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    model: Option<KnnModel>,
    metadata: ModelMetadata,
}

impl GestureClassifier {
    /// Create an untrained classifier.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn classes(&self) -> &[String] {
        &self.metadata.classes
    }

    /// Neighbor count of the fitted model, if any.
    pub fn neighbors(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.k)
    }

    /// Fit on the given samples.
    ///
    /// With at least two classes and enough samples a stratified holdout is
    /// scored first; the final model is always fit on the full set.
    pub fn train(
        &mut self,
        samples: &[Vec<f64>],
        labels: &[String],
    ) -> Result<TrainingReport, ClassifierError> {
        if samples.is_empty() {
            return Err(ClassifierError::InsufficientData);
        }
        if samples.len() != labels.len() {
            return Err(ClassifierError::LengthMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }
        let dim = samples[0].len();
        if let Some(bad) = samples.iter().find(|s| s.len() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }

        let classes = sorted_classes(labels);
        let validation_accuracy = if classes.len() >= 2 && samples.len() >= HOLDOUT_MIN_SAMPLES {
            holdout_accuracy(samples, labels)?
        } else {
            None
        };

        let model = KnnModel::fit(samples.to_vec(), labels.to_vec());
        let neighbors = model.k;
        self.metadata = ModelMetadata {
            classes: classes.clone(),
            validation_accuracy,
            training_samples: samples.len(),
            trained_at: Some(Utc::now()),
            dataset_signature: Some(dataset_signature(samples, labels)),
        };
        self.model = Some(model);

        Ok(TrainingReport {
            samples: samples.len(),
            classes,
            neighbors,
            validation_accuracy,
        })
    }

    /// Predict the label of a normalized feature vector.
    ///
    /// An untrained classifier answers with the uncalibrated sentinel
    /// rather than an error.
    pub fn predict(&self, vector: &[f64]) -> Result<Prediction, ClassifierError> {
        match &self.model {
            Some(model) => model.predict(vector),
            None => Ok(Prediction::uncalibrated()),
        }
    }

    /// Drop the fitted model and its metadata.
    pub fn reset(&mut self) {
        self.model = None;
        self.metadata = ModelMetadata::default();
    }

    /// Write the versioned bundle to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        let model = self
            .model
            .as_ref()
            .ok_or(ClassifierError::InsufficientData)?;
        let bundle = ModelBundle {
            format_version: MODEL_FORMAT_VERSION,
            model: model.clone(),
            metadata: self.metadata.clone(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClassifierError::Io(e.to_string()))?;
        }
        let json = serde_json::to_string(&bundle)
            .map_err(|e| ClassifierError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ClassifierError::Io(e.to_string()))
    }

    /// Load a classifier from `path`, accepting legacy file shapes.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ClassifierError::Io(e.to_string()))?;
        ModelFile::decode(&content).into_classifier()
    }
}

fn holdout_accuracy(
    samples: &[Vec<f64>],
    labels: &[String],
) -> Result<Option<f64>, ClassifierError> {
    let (train, test) = stratified_split(labels, HOLDOUT_FRACTION, SPLIT_SEED);
    if train.is_empty() || test.is_empty() {
        return Ok(None);
    }

    let model = KnnModel::fit(
        train.iter().map(|&i| samples[i].clone()).collect(),
        train.iter().map(|&i| labels[i].clone()).collect(),
    );
    let mut correct = 0usize;
    for &i in &test {
        if model.predict(&samples[i])?.label == labels[i] {
            correct += 1;
        }
    }
    Ok(Some(correct as f64 / test.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(center: &[f64], n: usize, label: &str) -> (Vec<Vec<f64>>, Vec<String>) {
        let samples = (0..n)
            .map(|i| {
                center
                    .iter()
                    .enumerate()
                    .map(|(j, c)| c + 0.01 * ((i + j) % 5) as f64)
                    .collect()
            })
            .collect();
        (samples, vec![label.to_string(); n])
    }

    fn two_class_data() -> (Vec<Vec<f64>>, Vec<String>) {
        let (mut s, mut l) = cluster(&[0.0, 0.0, 0.0], 10, "fist");
        let (s2, l2) = cluster(&[1.0, 1.0, 1.0], 10, "open_palm");
        s.extend(s2);
        l.extend(l2);
        (s, l)
    }

    #[test]
    fn test_untrained_returns_sentinel() {
        let clf = GestureClassifier::new();
        let p = clf.predict(&[0.0, 0.0, 0.0]).unwrap();
        assert!(p.is_uncalibrated());
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_empty_training_is_insufficient() {
        let mut clf = GestureClassifier::new();
        assert_eq!(clf.train(&[], &[]), Err(ClassifierError::InsufficientData));
        assert!(!clf.is_trained());
    }

    #[test]
    fn test_single_sample_training() {
        let mut clf = GestureClassifier::new();
        let report = clf.train(&[vec![0.1, 0.2, 0.3]], &["fist".to_string()]).unwrap();
        assert!(clf.is_trained());
        assert_eq!(report.neighbors, 1);
        assert_eq!(report.validation_accuracy, None);

        let p = clf.predict(&[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(p.label, "fist");
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.neighbor_distance, Some(0.0));
    }

    #[test]
    fn test_validation_accuracy_with_holdout() {
        let (samples, labels) = two_class_data();
        let mut clf = GestureClassifier::new();
        let report = clf.train(&samples, &labels).unwrap();

        let acc = report.validation_accuracy.expect("holdout should run");
        assert!((0.0..=1.0).contains(&acc));
        assert_eq!(acc, 1.0);
        assert_eq!(clf.classes(), &["fist".to_string(), "open_palm".to_string()]);
        assert_eq!(clf.metadata().training_samples, 20);
        assert!(clf.metadata().dataset_signature.is_some());
    }

    #[test]
    fn test_training_is_reproducible() {
        let (samples, labels) = two_class_data();
        let mut a = GestureClassifier::new();
        let mut b = GestureClassifier::new();
        let ra = a.train(&samples, &labels).unwrap();
        let rb = b.train(&samples, &labels).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a.metadata().dataset_signature, b.metadata().dataset_signature);
    }

    #[test]
    fn test_stratified_split_keeps_every_class_in_train() {
        let labels: Vec<String> = ["a", "a", "a", "a", "a", "b", "b", "c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (train, test) = stratified_split(&labels, 0.2, SPLIT_SEED);
        assert_eq!(train.len() + test.len(), labels.len());
        for class in ["a", "b", "c"] {
            assert!(train.iter().any(|&i| labels[i] == class));
        }
        assert!(!test.iter().any(|&i| labels[i] == "c"));
    }

    #[test]
    fn test_prediction_confidence_and_distance() {
        let (samples, labels) = two_class_data();
        let mut clf = GestureClassifier::new();
        clf.train(&samples, &labels).unwrap();

        let p = clf.predict(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(p.label, "open_palm");
        assert_eq!(p.confidence, 1.0);
        assert!(p.neighbor_distance.unwrap() < 0.1);

        let far = clf.predict(&[10.0, 10.0, 10.0]).unwrap();
        assert!(far.neighbor_distance.unwrap() > 10.0);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let mut clf = GestureClassifier::new();
        clf.train(&[vec![0.0, 0.0]], &["a".to_string()]).unwrap();
        assert!(matches!(
            clf.predict(&[0.0]),
            Err(ClassifierError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_nan_query_drops_neighbor_distance() {
        let mut clf = GestureClassifier::new();
        clf.train(&[vec![0.0, 0.0]], &["a".to_string()]).unwrap();
        let p = clf.predict(&[f64::NAN, 0.0]).unwrap();
        assert_eq!(p.neighbor_distance, None);
    }

    #[test]
    fn test_decode_legacy_estimator() {
        let json =
            r#"{"n_neighbors": 3, "samples": [[0.0, 1.0], [1.0, 0.0]], "labels": ["a", "b"]}"#;
        let file = ModelFile::decode(json);
        assert!(matches!(file, ModelFile::LegacyEstimator(_)));

        let clf = file.into_classifier().unwrap();
        assert!(clf.is_trained());
        assert_eq!(clf.classes(), &["a".to_string(), "b".to_string()]);
        assert_eq!(
            clf.metadata().dataset_signature.as_deref(),
            Some(
                dataset_signature(&[vec![0.0, 1.0], vec![1.0, 0.0]], &["a".into(), "b".into()])
                    .as_str()
            )
        );
    }

    #[test]
    fn test_decode_legacy_wrapper() {
        let json = r#"{"model": {"k": 1, "samples": [[0.5]], "labels": ["fist"]},
                       "classes": ["fist"], "trained_at": 1700000000.0}"#;
        let file = ModelFile::decode(json);
        assert!(matches!(file, ModelFile::LegacyWrapper(_)));

        let clf = file.into_classifier().unwrap();
        assert_eq!(clf.metadata().trained_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(ModelFile::decode("not json"), ModelFile::Invalid(_)));
        assert!(matches!(ModelFile::decode(r#"{"foo": 1}"#), ModelFile::Invalid(_)));
        let future = r#"{"format_version": 99,
            "model": {"k": 1, "samples": [[0.0]], "labels": ["a"]},
            "metadata": {"classes": [], "validation_accuracy": null, "training_samples": 1,
                         "trained_at": null, "dataset_signature": null}}"#;
        assert!(matches!(ModelFile::decode(future), ModelFile::Invalid(_)));
    }

    #[test]
    fn test_broken_versioned_file_falls_back_to_legacy_shapes() {
        let wrapper =
            r#"{"format_version": 2, "model": {"k": 1, "samples": [[0.5]], "labels": ["fist"]}}"#;
        assert!(matches!(ModelFile::decode(wrapper), ModelFile::LegacyWrapper(_)));

        let estimator = r#"{"format_version": 1, "k": 1, "samples": [[0.5]], "labels": ["fist"]}"#;
        let file = ModelFile::decode(estimator);
        assert!(matches!(file, ModelFile::LegacyEstimator(_)));
        assert!(file.into_classifier().unwrap().is_trained());

        let garbage = r#"{"format_version": 2, "model": "truncated"}"#;
        assert!(matches!(ModelFile::decode(garbage), ModelFile::Invalid(_)));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (samples, labels) = two_class_data();
        let mut clf = GestureClassifier::new();
        clf.train(&samples, &labels).unwrap();

        let path = std::env::temp_dir()
            .join(format!("gesture-model-{}", uuid::Uuid::new_v4()))
            .join("model.json");
        clf.save(&path).unwrap();
        let loaded = GestureClassifier::load(&path).unwrap();

        for query in [[0.02, 0.0, 0.01], [0.9, 1.1, 1.0], [0.5, 0.5, 0.5]] {
            assert_eq!(clf.predict(&query).unwrap(), loaded.predict(&query).unwrap());
        }
        assert_eq!(loaded.metadata(), clf.metadata());
        assert_eq!(
            loaded.metadata().dataset_signature.as_deref(),
            Some(dataset_signature(&samples, &labels).as_str())
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
