//! Gesture registry, training dataset and their synchronization with the
//! trained classifier.

pub mod dataset;
pub mod sync;
pub mod types;

pub use dataset::{dataset_signature, TrainingDataset};
pub use sync::{BootReport, BulkEditOutcome, CommitOutcome, ModelStatus, RegistrySync, SyncStatus};
pub use types::{
    clamp_threshold, normalize_label, validate_entries, GestureAction, GestureEntry,
    GestureEntryInput, GestureRegistry, RegistryError, MAX_THRESHOLD, MIN_THRESHOLD,
};
