//! Persistent activity counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current and previous sessions.
#[derive(Debug)]
pub struct ActivityLog {
    /// Frames handed to the session controller
    frames_processed: AtomicU64,
    /// Frames in which a hand was detected
    hands_detected: AtomicU64,
    /// Predictions made while monitoring
    predictions: AtomicU64,
    /// Actions actually performed
    actions_dispatched: AtomicU64,
    /// Samples committed to the dataset
    samples_recorded: AtomicU64,
    /// Successful model fits
    trainings: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            hands_detected: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            actions_dispatched: AtomicU64::new(0),
            samples_recorded: AtomicU64::new(0),
            trainings: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an activity log that resumes from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "Could not load previous activity stats");
        }

        log
    }

    pub fn record_frame(&self, hand_detected: bool) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        if hand_detected {
            self.hands_detected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action(&self) {
        self.actions_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: u64) {
        self.samples_recorded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_training(&self) {
        self.trainings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            hands_detected: self.hands_detected.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            actions_dispatched: self.actions_dispatched.load(Ordering::Relaxed),
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
            trainings: self.trainings.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Activity:\n\
             - Frames processed: {}\n\
             - Hands detected: {}\n\
             - Predictions: {}\n\
             - Actions dispatched: {}\n\
             - Samples recorded: {}\n\
             - Trainings: {}\n\
             - Session duration: {} seconds",
            stats.frames_processed,
            stats.hands_detected,
            stats.predictions,
            stats.actions_dispatched,
            stats.samples_recorded,
            stats.trainings,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_processed: stats.frames_processed,
                hands_detected: stats.hands_detected,
                predictions: stats.predictions,
                actions_dispatched: stats.actions_dispatched,
                samples_recorded: stats.samples_recorded,
                trainings: stats.trainings,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_processed
                    .store(persisted.frames_processed, Ordering::Relaxed);
                self.hands_detected
                    .store(persisted.hands_detected, Ordering::Relaxed);
                self.predictions.store(persisted.predictions, Ordering::Relaxed);
                self.actions_dispatched
                    .store(persisted.actions_dispatched, Ordering::Relaxed);
                self.samples_recorded
                    .store(persisted.samples_recorded, Ordering::Relaxed);
                self.trainings.store(persisted.trainings, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.frames_processed.store(0, Ordering::Relaxed);
        self.hands_detected.store(0, Ordering::Relaxed);
        self.predictions.store(0, Ordering::Relaxed);
        self.actions_dispatched.store(0, Ordering::Relaxed);
        self.samples_recorded.store(0, Ordering::Relaxed);
        self.trainings.store(0, Ordering::Relaxed);
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub frames_processed: u64,
    pub hands_detected: u64,
    pub predictions: u64,
    pub actions_dispatched: u64,
    pub samples_recorded: u64,
    pub trainings: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    frames_processed: u64,
    #[serde(default)]
    hands_detected: u64,
    #[serde(default)]
    predictions: u64,
    #[serde(default)]
    actions_dispatched: u64,
    #[serde(default)]
    samples_recorded: u64,
    #[serde(default)]
    trainings: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}
