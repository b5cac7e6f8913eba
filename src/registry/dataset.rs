//! Persisted training dataset and its content signature.

use crate::registry::types::RegistryError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Content hash of a dataset.
///
/// Each (sample, label) pair is hashed on its own and the pair digests are
/// sorted before being combined, so the signature depends on exact content
/// but not on sample order.
pub fn dataset_signature(samples: &[Vec<f64>], labels: &[String]) -> String {
    let mut digests: Vec<[u8; 32]> = samples
        .iter()
        .zip(labels)
        .map(|(sample, label)| {
            let mut hasher = Sha256::new();
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
            hasher.update((sample.len() as u64).to_le_bytes());
            for v in sample {
                hasher.update(v.to_le_bytes());
            }
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&hasher.finalize());
            digest
        })
        .collect();
    digests.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update((digests.len() as u64).to_le_bytes());
    for digest in &digests {
        hasher.update(digest);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Labeled training samples stored as parallel sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    samples: Vec<Vec<f64>>,
    labels: Vec<String>,
}

impl TrainingDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Feature dimension of the stored samples, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.samples.first().map(Vec::len)
    }

    /// Append samples under one label.
    ///
    /// Every sample must match the dimension already in the dataset.
    pub fn extend(&mut self, samples: Vec<Vec<f64>>, label: &str) -> Result<usize, RegistryError> {
        let expected = self
            .dimension()
            .or_else(|| samples.first().map(Vec::len))
            .unwrap_or(0);
        if let Some(bad) = samples.iter().find(|s| s.len() != expected) {
            return Err(RegistryError::InvalidSample(format!(
                "expected {expected} values, got {}",
                bad.len()
            )));
        }

        let label = label.trim().to_lowercase();
        let added = samples.len();
        self.labels.extend(std::iter::repeat(label).take(added));
        self.samples.extend(samples);
        Ok(added)
    }

    /// Sorted distinct labels.
    pub fn distinct_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of samples carrying `label`.
    pub fn count_for(&self, label: &str) -> usize {
        self.labels.iter().filter(|l| *l == label).count()
    }

    /// Per-label sample counts.
    pub fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Remove every sample carrying `label`. Returns how many were removed.
    pub fn remove_label(&mut self, label: &str) -> usize {
        self.retain(|l| l != label)
    }

    /// Keep only samples whose label is in `allowed`. Returns how many were removed.
    pub fn retain_labels(&mut self, allowed: &BTreeSet<String>) -> usize {
        self.retain(|l| allowed.contains(l))
    }

    /// Rewrite labels in place according to `map`. Returns how many changed.
    pub fn relabel(&mut self, map: &HashMap<String, String>) -> usize {
        let mut changed = 0;
        for label in &mut self.labels {
            if let Some(new_label) = map.get(label.as_str()) {
                if new_label != label {
                    *label = new_label.clone();
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.labels.clear();
    }

    pub fn signature(&self) -> String {
        dataset_signature(&self.samples, &self.labels)
    }

    fn retain(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.samples.len();
        let (samples, labels): (Vec<_>, Vec<_>) = std::mem::take(&mut self.samples)
            .into_iter()
            .zip(std::mem::take(&mut self.labels))
            .filter(|(_, label)| keep(label))
            .unzip();
        self.samples = samples;
        self.labels = labels;
        before - self.samples.len()
    }

    /// Load a dataset; a missing file yields an empty dataset.
    ///
    /// Mismatched sample/label counts are truncated to the shorter side.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| RegistryError::Storage(e.to_string()))?;
        let mut dataset: TrainingDataset =
            serde_json::from_str(&content).map_err(|e| RegistryError::Storage(e.to_string()))?;

        if dataset.samples.len() != dataset.labels.len() {
            tracing::warn!(
                samples = dataset.samples.len(),
                labels = dataset.labels.len(),
                "Dataset sample/label counts differ, truncating"
            );
            let n = dataset.samples.len().min(dataset.labels.len());
            dataset.samples.truncate(n);
            dataset.labels.truncate(n);
        }
        for label in &mut dataset.labels {
            *label = label.trim().to_lowercase();
        }
        Ok(dataset)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string(self).map_err(|e| RegistryError::Storage(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RegistryError::Storage(e.to_string()))
    }
}
