//! Keeps the registry, the stored samples and the trained classifier
//! mutually consistent across edits and restarts.

use crate::config::{DataPaths, TuningConfig};
use crate::core::classifier::{ClassifierError, GestureClassifier, Prediction, TrainingReport};
use crate::core::normalize::FeatureVector;
use crate::registry::dataset::TrainingDataset;
use crate::registry::types::{GestureEntry, GestureRegistry, RegistryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Message reported when an edit did not touch the dataset.
pub const NO_RETRAIN_MESSAGE: &str = "No retraining needed.";

/// Relationship between the trained model and the current dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    /// No model has been trained
    Untrained,
    /// Samples changed since the model was fit
    DatasetChanged,
    /// The model knows a different class set than the dataset holds
    ClassesChanged,
}

impl SyncStatus {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncStatus::Synced)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "model is up to date"),
            SyncStatus::Untrained => write!(f, "model is not trained"),
            SyncStatus::DatasetChanged => write!(f, "samples changed since the last training"),
            SyncStatus::ClassesChanged => {
                write!(f, "gesture classes changed since the last training")
            }
        }
    }
}

/// Result of committing a recorded gesture.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub entry: GestureEntry,
    pub added: usize,
    /// Entry previously bound to the same action
    pub replaced: Option<GestureEntry>,
    /// Samples removed because their label lost its last entry
    pub purged: usize,
    /// Training is reported rather than rolled back on failure
    pub training: Result<TrainingReport, ClassifierError>,
}

/// Result of replacing the whole registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEditOutcome {
    pub pruned_samples: usize,
    pub relabeled_samples: usize,
    pub auto_retrained: bool,
    pub retrain_message: String,
}

/// Result of startup reconciliation.
#[derive(Debug, Clone)]
pub struct BootReport {
    pub pruned: usize,
    pub retrained: Option<Result<TrainingReport, ClassifierError>>,
    pub status: SyncStatus,
}

/// Snapshot of the model state for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub trained: bool,
    pub synced: bool,
    pub status: SyncStatus,
    pub classes: Vec<String>,
    pub training_samples: usize,
    pub dataset_samples: usize,
    pub sample_counts: BTreeMap<String, usize>,
    pub validation_accuracy: Option<f64>,
    pub trained_at: Option<DateTime<Utc>>,
    pub gestures: usize,
}

/// Owner of the registry, dataset and classifier.
#[derive(Debug)]
pub struct RegistrySync {
    paths: DataPaths,
    registry: GestureRegistry,
    dataset: TrainingDataset,
    classifier: GestureClassifier,
    auto_retrain: bool,
}

impl RegistrySync {
    /// Load persisted state and reconcile it.
    ///
    /// An unreadable model file is treated as untrained.
    pub fn open(
        paths: DataPaths,
        tuning: &TuningConfig,
    ) -> Result<(Self, BootReport), RegistryError> {
        let registry = GestureRegistry::load(&paths.gestures())?;
        let dataset = TrainingDataset::load(&paths.dataset())?;

        let model_path = paths.model();
        let classifier = if model_path.exists() {
            match GestureClassifier::load(&model_path) {
                Ok(classifier) => classifier,
                Err(e) => {
                    tracing::warn!(
                        path = %model_path.display(),
                        error = %e,
                        "Ignoring unreadable model file"
                    );
                    GestureClassifier::new()
                }
            }
        } else {
            GestureClassifier::new()
        };

        let mut sync = Self {
            paths,
            registry,
            dataset,
            classifier,
            auto_retrain: tuning.auto_retrain,
        };
        let report = sync.boot_recover()?;
        Ok((sync, report))
    }

    /// In-memory synchronizer with no persisted state yet.
    pub fn empty(paths: DataPaths, tuning: &TuningConfig) -> Self {
        Self {
            paths,
            registry: GestureRegistry::new(),
            dataset: TrainingDataset::new(),
            classifier: GestureClassifier::new(),
            auto_retrain: tuning.auto_retrain,
        }
    }

    pub fn registry(&self) -> &GestureRegistry {
        &self.registry
    }

    pub fn dataset(&self) -> &TrainingDataset {
        &self.dataset
    }

    pub fn classifier(&self) -> &GestureClassifier {
        &self.classifier
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn predict(&self, vector: &[f64]) -> Result<Prediction, ClassifierError> {
        self.classifier.predict(vector)
    }

    pub fn sync_status(&self) -> SyncStatus {
        if !self.classifier.is_trained() {
            return SyncStatus::Untrained;
        }
        let metadata = self.classifier.metadata();
        if metadata.dataset_signature.as_deref() != Some(self.dataset.signature().as_str()) {
            return SyncStatus::DatasetChanged;
        }
        if metadata.classes != self.dataset.distinct_labels() {
            return SyncStatus::ClassesChanged;
        }
        SyncStatus::Synced
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status().is_synced()
    }

    pub fn model_status(&self) -> ModelStatus {
        let status = self.sync_status();
        let metadata = self.classifier.metadata();
        ModelStatus {
            trained: self.classifier.is_trained(),
            synced: status.is_synced(),
            status,
            classes: metadata.classes.clone(),
            training_samples: metadata.training_samples,
            dataset_samples: self.dataset.len(),
            sample_counts: self.dataset.counts().into_iter().collect(),
            validation_accuracy: metadata.validation_accuracy,
            trained_at: metadata.trained_at,
            gestures: self.registry.len(),
        }
    }

    /// Store a recorded gesture: append samples, upsert the entry, purge
    /// samples of a replaced label nothing uses any more, persist, retrain.
    pub fn commit_gesture(
        &mut self,
        entry: GestureEntry,
        samples: Vec<FeatureVector>,
    ) -> Result<CommitOutcome, RegistryError> {
        if samples.is_empty() {
            return Err(RegistryError::InvalidSample("no samples to commit".into()));
        }

        let added = self.dataset.extend(samples, &entry.label)?;
        let replaced = self.registry.upsert(entry.clone());
        let purged = match &replaced {
            Some(old) if self.registry.find_by_label(&old.label).is_none() => {
                self.dataset.remove_label(&old.label)
            }
            _ => 0,
        };
        self.persist()?;

        tracing::info!(
            label = %entry.label,
            action = %entry.action,
            added,
            purged,
            "Committed gesture"
        );

        let training = self.retrain();
        Ok(CommitOutcome {
            entry,
            added,
            replaced,
            purged,
            training,
        })
    }

    /// Replace the registry wholesale.
    ///
    /// Samples follow their action to its new label, samples with no
    /// remaining entry are pruned, and the model is retrained when anything
    /// changed (or cleared when no data remains).
    pub fn replace_registry(
        &mut self,
        entries: Vec<GestureEntry>,
    ) -> Result<BulkEditOutcome, RegistryError> {
        let new_registry = GestureRegistry::from_entries(entries);
        let map = relabel_map(&self.registry, &new_registry);

        let mut pruned = 0;
        for label in displaced_labels(&self.registry, &new_registry, &map) {
            pruned += self.dataset.remove_label(&label);
        }
        let relabeled = self.dataset.relabel(&map);
        pruned += self.dataset.retain_labels(&new_registry.labels());
        self.registry = new_registry;
        self.persist()?;

        tracing::info!(
            gestures = self.registry.len(),
            relabeled,
            pruned,
            "Replaced gesture registry"
        );

        let mut outcome = BulkEditOutcome {
            pruned_samples: pruned,
            relabeled_samples: relabeled,
            auto_retrained: false,
            retrain_message: NO_RETRAIN_MESSAGE.to_string(),
        };

        if self.dataset.is_empty() {
            if self.classifier.is_trained() || self.paths.model().exists() {
                self.invalidate_model();
                outcome.retrain_message = "No training data remains; model cleared.".to_string();
            }
            return Ok(outcome);
        }

        if relabeled == 0 && pruned == 0 {
            return Ok(outcome);
        }

        if !self.auto_retrain {
            outcome.retrain_message = "Samples changed; retrain to update the model.".to_string();
            return Ok(outcome);
        }

        match self.retrain() {
            Ok(report) => {
                outcome.auto_retrained = true;
                outcome.retrain_message = report.to_string();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retraining after registry edit failed");
                outcome.retrain_message = format!("Retraining failed: {e}");
            }
        }
        Ok(outcome)
    }

    /// Fit the classifier on the current dataset and persist it.
    ///
    /// With no samples the model is invalidated instead.
    pub fn retrain(&mut self) -> Result<TrainingReport, ClassifierError> {
        if self.dataset.is_empty() {
            self.invalidate_model();
            return Err(ClassifierError::InsufficientData);
        }

        let report = self
            .classifier
            .train(self.dataset.samples(), self.dataset.labels())?;
        self.classifier.save(&self.paths.model())?;

        tracing::info!(
            samples = report.samples,
            classes = report.classes.len(),
            validation_accuracy = ?report.validation_accuracy,
            "Trained gesture model"
        );
        Ok(report)
    }

    /// Empty the dataset and invalidate the model. Returns how many samples
    /// were removed.
    pub fn clear_samples(&mut self) -> Result<usize, RegistryError> {
        let removed = self.dataset.len();
        self.dataset.clear();
        self.dataset.save(&self.paths.dataset())?;
        self.invalidate_model();
        tracing::info!(removed, "Cleared training samples");
        Ok(removed)
    }

    /// Prune samples whose label has no entry, retraining when that removed
    /// anything and data remains.
    pub fn boot_recover(&mut self) -> Result<BootReport, RegistryError> {
        let pruned = self.dataset.retain_labels(&self.registry.labels());
        let mut retrained = None;

        if pruned > 0 {
            self.dataset.save(&self.paths.dataset())?;
            tracing::info!(pruned, "Pruned samples without a registered gesture");
            if self.dataset.is_empty() {
                self.invalidate_model();
            } else {
                retrained = Some(self.retrain());
            }
        } else if self.dataset.is_empty() && self.classifier.is_trained() {
            self.invalidate_model();
        }

        let status = self.sync_status();
        if !status.is_synced() && !self.dataset.is_empty() {
            tracing::warn!(%status, "Gesture model is out of date");
        }
        Ok(BootReport {
            pruned,
            retrained,
            status,
        })
    }

    /// Drop the fitted model and delete its file.
    fn invalidate_model(&mut self) {
        self.classifier.reset();
        let path = self.paths.model();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not delete model file");
            }
        }
    }

    fn persist(&self) -> Result<(), RegistryError> {
        self.dataset.save(&self.paths.dataset())?;
        self.registry.save(&self.paths.gestures())
    }
}

/// Old label to new label for every action whose label changed.
///
/// An old label that would map to more than one new label is left alone.
fn relabel_map(old: &GestureRegistry, new: &GestureRegistry) -> HashMap<String, String> {
    let mut targets: HashMap<String, BTreeSet<String>> = HashMap::new();
    for old_entry in old.entries() {
        if let Some(new_entry) = new.find_by_action(old_entry.action) {
            targets
                .entry(old_entry.label.clone())
                .or_default()
                .insert(new_entry.label.clone());
        }
    }

    targets
        .into_iter()
        .filter_map(|(from, to)| {
            if to.len() > 1 {
                tracing::warn!(label = %from, "Ambiguous relabel, leaving samples unchanged");
                return None;
            }
            let to = to.into_iter().next()?;
            (to != from).then_some((from, to))
        })
        .collect()
}

/// Labels of removed actions that another action is being renamed onto.
///
/// Their samples belong to the removed pose and must go before the rename,
/// or they would merge with the renamed action's samples.
fn displaced_labels(
    old: &GestureRegistry,
    new: &GestureRegistry,
    map: &HashMap<String, String>,
) -> BTreeSet<String> {
    let targets: BTreeSet<&String> = map.values().collect();
    old.entries()
        .iter()
        .filter(|e| new.find_by_action(e.action).is_none())
        .map(|e| &e.label)
        .filter(|label| targets.contains(label) && !map.contains_key(label.as_str()))
        .cloned()
        .collect()
}
