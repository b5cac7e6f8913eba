//! Session control: recording, single-shot capture, monitoring.
//!
//! [`SessionController`] owns the registry synchronizer, the decision
//! engine and the dispatcher. Its [`ControlState`] makes the three modes
//! mutually exclusive.

use crate::activity::SharedActivityLog;
use crate::capture::types::{Frame, HandPoseExtractor};
use crate::config::{Config, TuningConfig};
use crate::core::augment::{AugmentReport, Augmentor};
use crate::core::classifier::{ClassifierError, Prediction, TrainingReport};
use crate::core::decision::{Decision, DecisionConfig, DecisionEngine, Rejection};
use crate::core::normalize::{euclidean_distance, FeatureVector, KeypointSet};
use crate::core::quality::{assess_capture, QualityReport, QualityThresholds};
use crate::dispatch::{ActionDispatcher, DispatchOutcome, RateLimitedDispatcher};
use crate::registry::{
    validate_entries, BootReport, BulkEditOutcome, CommitOutcome, GestureAction, GestureEntry,
    GestureEntryInput, ModelStatus, RegistryError, RegistrySync, SyncStatus,
};
use chrono::{DateTime, Utc};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Smallest number of samples a recording may target.
pub const MIN_RECORDING_TARGET: usize = 20;

/// Largest number of samples a recording may target.
pub const MAX_RECORDING_TARGET: usize = 120;

/// Request to record (or single-shot capture) a gesture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRequest {
    pub label: String,
    pub action: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub target: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl RecordingRequest {
    pub fn new(label: &str, action: GestureAction) -> Self {
        Self {
            label: label.to_string(),
            action: action.as_str().to_string(),
            emoji: None,
            target: None,
            threshold: None,
        }
    }

    pub fn with_emoji(mut self, emoji: &str) -> Self {
        self.emoji = Some(emoji.to_string());
        self
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }
}

/// An in-progress recording.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub entry: GestureEntry,
    pub target: usize,
    pub samples: Vec<FeatureVector>,
    pub started_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.target
    }

    /// Whether `vector` is at least `min_distance` from every kept sample.
    fn is_novel(&self, vector: &[f64], min_distance: f64) -> bool {
        self.samples.iter().all(|s| {
            euclidean_distance(s, vector)
                .map(|d| d >= min_distance)
                .unwrap_or(false)
        })
    }

    pub fn progress(&self) -> RecordingProgress {
        RecordingProgress {
            active: true,
            label: self.entry.label.clone(),
            action: self.entry.action,
            target: self.target,
            count: self.count(),
        }
    }
}

/// Controller mode.
#[derive(Debug, Clone)]
pub enum ControlState {
    Idle,
    Recording(RecordingSession),
    Monitoring,
}

impl ControlState {
    pub fn mode(&self) -> ControlMode {
        match self {
            ControlState::Idle => ControlMode::Idle,
            ControlState::Recording(_) => ControlMode::Recording,
            ControlState::Monitoring => ControlMode::Monitoring,
        }
    }
}

/// Mode without its payload, for status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Idle,
    Recording,
    Monitoring,
}

/// Recording progress as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingProgress {
    pub active: bool,
    pub label: String,
    pub action: GestureAction,
    pub target: usize,
    pub count: usize,
}

/// Per-frame result broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStatus {
    pub mode: ControlMode,
    pub hand_detected: bool,
    pub gesture: String,
    pub emoji: String,
    pub confidence: f64,
    pub rejection: Option<Rejection>,
    pub effective_threshold: Option<f64>,
    pub streak: u32,
    /// Action performed on this frame
    pub action: Option<GestureAction>,
    pub recording: Option<RecordingProgress>,
    pub message: Option<String>,
}

impl FrameStatus {
    fn new(mode: ControlMode, hand_detected: bool) -> Self {
        Self {
            mode,
            hand_detected,
            gesture: crate::core::classifier::NONE_LABEL.to_string(),
            emoji: String::new(),
            confidence: 0.0,
            rejection: None,
            effective_threshold: None,
            streak: 0,
            action: None,
            recording: None,
            message: None,
        }
    }

    fn apply(&mut self, decision: Decision) {
        self.gesture = decision.label;
        self.emoji = decision.emoji;
        self.confidence = decision.confidence;
        self.rejection = decision.rejection;
        self.effective_threshold = decision.effective_threshold;
        self.streak = decision.streak;
    }
}

/// Result of a single-shot capture.
#[derive(Debug, Clone)]
pub struct SingleCapture {
    pub commit: CommitOutcome,
    pub augment: AugmentReport,
    pub quality: Option<QualityReport>,
}

/// Overall controller status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub mode: ControlMode,
    pub recording: Option<RecordingProgress>,
    pub model: ModelStatus,
    pub gestures: Vec<GestureEntry>,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Monitoring needs a trained model matching the dataset
    NotSynced(SyncStatus),
    /// A recording is in progress
    RecordingActive,
    /// No recording is in progress
    NotRecording,
    /// No hand in the captured image; carries quality hints
    NoHand(Vec<String>),
    Registry(RegistryError),
    Training(ClassifierError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotSynced(status) => {
                write!(f, "Model is not ready for monitoring: {status}. Train the model first.")
            }
            SessionError::RecordingActive => write!(f, "A recording is already in progress"),
            SessionError::NotRecording => write!(f, "No recording is in progress"),
            SessionError::NoHand(hints) if hints.is_empty() => write!(f, "No hand detected"),
            SessionError::NoHand(hints) => write!(f, "No hand detected: {}", hints.join(" ")),
            SessionError::Registry(e) => write!(f, "{e}"),
            SessionError::Training(e) => write!(f, "Training failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        SessionError::Registry(e)
    }
}

impl From<ClassifierError> for SessionError {
    fn from(e: ClassifierError) -> Self {
        SessionError::Training(e)
    }
}

/// Owner of the recognition session.
pub struct SessionController<D> {
    sync: RegistrySync,
    engine: DecisionEngine,
    dispatcher: RateLimitedDispatcher<D>,
    state: ControlState,
    tuning: TuningConfig,
    augmentor: Augmentor,
    quality: QualityThresholds,
    rng: StdRng,
    activity: Option<SharedActivityLog>,
}

impl<D: ActionDispatcher> SessionController<D> {
    pub fn new(sync: RegistrySync, tuning: TuningConfig, dispatcher: D) -> Self {
        let mut engine = DecisionEngine::new(DecisionConfig::from(&tuning));
        engine.rebuild(sync.registry().entries());
        Self {
            sync,
            engine,
            dispatcher: RateLimitedDispatcher::new(dispatcher),
            state: ControlState::Idle,
            tuning,
            augmentor: Augmentor::new(),
            quality: QualityThresholds::default(),
            rng: StdRng::from_entropy(),
            activity: None,
        }
    }

    /// Load persisted state from the configured data directory.
    pub fn open(config: &Config, dispatcher: D) -> Result<(Self, BootReport), SessionError> {
        let (sync, report) = RegistrySync::open(config.data_paths(), &config.tuning)?;
        Ok((Self::new(sync, config.tuning.clone(), dispatcher), report))
    }

    pub fn with_activity(mut self, activity: SharedActivityLog) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Seed augmentation randomness.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.state.mode()
    }

    pub fn sync(&self) -> &RegistrySync {
        &self.sync
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn dispatcher(&self) -> &RateLimitedDispatcher<D> {
        &self.dispatcher
    }

    pub fn tuning(&self) -> &TuningConfig {
        &self.tuning
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            mode: self.mode(),
            recording: self.recording_progress(),
            model: self.sync.model_status(),
            gestures: self.sync.registry().entries().to_vec(),
        }
    }

    pub fn model_status(&self) -> ModelStatus {
        self.sync.model_status()
    }

    pub fn recording_progress(&self) -> Option<RecordingProgress> {
        match &self.state {
            ControlState::Recording(session) => Some(session.progress()),
            _ => None,
        }
    }

    /// Begin recording a gesture. Monitoring is switched off.
    pub fn start_recording(
        &mut self,
        request: RecordingRequest,
    ) -> Result<RecordingProgress, SessionError> {
        if matches!(self.state, ControlState::Recording(_)) {
            return Err(SessionError::RecordingActive);
        }
        let entry = self.entry_for(&request)?;
        let target = request
            .target
            .unwrap_or(self.tuning.recording_target)
            .clamp(MIN_RECORDING_TARGET, MAX_RECORDING_TARGET);

        self.stop_monitoring();
        let session = RecordingSession {
            entry,
            target,
            samples: Vec::with_capacity(target),
            started_at: Utc::now(),
        };
        let progress = session.progress();
        tracing::info!(
            label = %progress.label,
            action = %progress.action,
            target,
            "Recording started"
        );
        self.state = ControlState::Recording(session);
        Ok(progress)
    }

    /// Abandon the recording and discard its samples.
    pub fn cancel_recording(&mut self) -> Result<RecordingSession, SessionError> {
        match std::mem::replace(&mut self.state, ControlState::Idle) {
            ControlState::Recording(session) => {
                tracing::info!(
                    label = %session.entry.label,
                    discarded = session.count(),
                    "Recording cancelled"
                );
                Ok(session)
            }
            other => {
                self.state = other;
                Err(SessionError::NotRecording)
            }
        }
    }

    /// End the recording early, committing whatever was captured.
    ///
    /// Returns `None` when the recording held no samples.
    pub fn stop_recording(&mut self) -> Result<Option<CommitOutcome>, SessionError> {
        match std::mem::replace(&mut self.state, ControlState::Idle) {
            ControlState::Recording(session) if session.samples.is_empty() => {
                tracing::info!(label = %session.entry.label, "Recording stopped with no samples");
                Ok(None)
            }
            ControlState::Recording(session) => self.commit_session(session).map(Some),
            other => {
                self.state = other;
                Err(SessionError::NotRecording)
            }
        }
    }

    /// Commit one captured hand pose, expanded by feature jitter.
    pub fn capture_single(
        &mut self,
        request: RecordingRequest,
        keypoints: &KeypointSet,
    ) -> Result<SingleCapture, SessionError> {
        let entry = self.prepare_capture(&request)?;
        let n = self.capture_count(&request);
        let augment = self
            .augmentor
            .augment_vector(&keypoints.feature_vector(), n, &mut self.rng);
        let commit = self.commit_samples(entry, augment.vectors.clone())?;
        Ok(SingleCapture {
            commit,
            augment,
            quality: None,
        })
    }

    /// Commit one captured image, expanded by image-space augmentation.
    ///
    /// Quality issues are reported alongside the result; only a missing
    /// hand fails the capture.
    pub fn capture_single_image(
        &mut self,
        request: RecordingRequest,
        image: &RgbImage,
        extractor: &dyn HandPoseExtractor,
    ) -> Result<SingleCapture, SessionError> {
        let entry = self.prepare_capture(&request)?;
        let keypoints = extractor
            .extract(&Frame::from_image(image.clone()))
            .filter(KeypointSet::is_complete);
        let quality = assess_capture(image, keypoints.as_ref(), &self.quality);
        let Some(keypoints) = keypoints else {
            return Err(SessionError::NoHand(quality.messages()));
        };
        if !quality.is_acceptable() {
            tracing::warn!(issues = ?quality.messages(), "Capture quality issues");
        }

        let n = self.capture_count(&request);
        let augment = self.augmentor.augment_from_image(
            image,
            &keypoints.feature_vector(),
            n,
            extractor,
            &mut self.rng,
        );
        tracing::debug!(
            from_image = augment.from_image,
            from_jitter = augment.from_jitter,
            rejected_similar = augment.rejected_similar,
            rejected_outlier = augment.rejected_outlier,
            rejected_duplicate = augment.rejected_duplicate,
            "Augmented capture"
        );
        let commit = self.commit_samples(entry, augment.vectors.clone())?;
        Ok(SingleCapture {
            commit,
            augment,
            quality: Some(quality),
        })
    }

    /// Switch monitoring on or off. Returns whether monitoring is now active.
    pub fn set_monitoring(&mut self, enabled: bool) -> Result<bool, SessionError> {
        if !enabled {
            self.stop_monitoring();
            return Ok(false);
        }
        match self.state {
            ControlState::Monitoring => return Ok(true),
            ControlState::Recording(_) => return Err(SessionError::RecordingActive),
            ControlState::Idle => {}
        }
        let status = self.sync.sync_status();
        if !status.is_synced() {
            return Err(SessionError::NotSynced(status));
        }
        self.engine.reset();
        self.state = ControlState::Monitoring;
        tracing::info!("Monitoring enabled");
        Ok(true)
    }

    pub fn toggle_monitoring(&mut self) -> Result<bool, SessionError> {
        let enable = !matches!(self.state, ControlState::Monitoring);
        self.set_monitoring(enable)
    }

    /// Retrain on the current dataset.
    pub fn train(&mut self) -> Result<TrainingReport, SessionError> {
        let result = self.sync.retrain();
        self.after_model_change();
        let report = result?;
        if let Some(log) = &self.activity {
            log.record_training();
        }
        Ok(report)
    }

    /// Replace the registry from unvalidated input; nothing changes unless
    /// every entry is valid.
    pub fn replace_registry(
        &mut self,
        inputs: Vec<GestureEntryInput>,
    ) -> Result<BulkEditOutcome, SessionError> {
        let entries = validate_entries(inputs, self.tuning.default_threshold)?;
        let outcome = self.sync.replace_registry(entries)?;
        if outcome.auto_retrained {
            if let Some(log) = &self.activity {
                log.record_training();
            }
        }
        self.after_model_change();
        Ok(outcome)
    }

    /// Delete every stored sample and the model.
    pub fn clear_samples(&mut self) -> Result<usize, SessionError> {
        let removed = self.sync.clear_samples()?;
        self.after_model_change();
        Ok(removed)
    }

    /// Process one frame's landmarks.
    ///
    /// Never fails: per-frame problems are logged and reported as no detection.
    pub fn process_frame(&mut self, landmarks: Option<&KeypointSet>, now: Instant) -> FrameStatus {
        let hand = landmarks.filter(|k| k.is_complete());
        if let Some(log) = &self.activity {
            log.record_frame(hand.is_some());
        }

        let mut status = FrameStatus::new(self.mode(), hand.is_some());
        match self.state.mode() {
            ControlMode::Recording => self.record_frame(hand, &mut status),
            ControlMode::Monitoring => {
                let decision = match hand {
                    None => self.engine.observe_no_hand(),
                    Some(keypoints) => match self.sync.predict(&keypoints.feature_vector()) {
                        Ok(prediction) => return self.process_prediction(&prediction, now),
                        Err(e) => {
                            tracing::warn!(error = %e, "Prediction failed");
                            self.engine.observe_no_hand()
                        }
                    },
                };
                status.apply(decision);
            }
            ControlMode::Idle => {}
        }
        status
    }

    /// Run one prediction through the decision engine and dispatcher.
    ///
    /// Only acts while monitoring.
    pub fn process_prediction(&mut self, prediction: &Prediction, now: Instant) -> FrameStatus {
        let mut status = FrameStatus::new(self.mode(), true);
        if !matches!(self.state, ControlState::Monitoring) {
            return status;
        }
        if let Some(log) = &self.activity {
            log.record_prediction();
        }

        let class_count = self.sync.classifier().classes().len();
        let decision = self.engine.process(prediction, class_count);
        if let Some(trigger) = &decision.trigger {
            match self.dispatcher.dispatch(trigger, now) {
                DispatchOutcome::Performed(action) => {
                    status.action = Some(action);
                    if let Some(log) = &self.activity {
                        log.record_action();
                    }
                }
                DispatchOutcome::CoolingDown { remaining } => {
                    tracing::debug!(
                        label = %trigger.label,
                        ?remaining,
                        "Action suppressed by cooldown"
                    );
                }
                DispatchOutcome::Failed(action) => {
                    tracing::warn!(
                        label = %trigger.label,
                        action = %action,
                        "Action was not performed"
                    );
                }
            }
        }
        status.apply(decision);
        status
    }

    fn record_frame(&mut self, hand: Option<&KeypointSet>, status: &mut FrameStatus) {
        let ControlState::Recording(session) = &mut self.state else {
            return;
        };
        if let Some(keypoints) = hand {
            let vector = keypoints.feature_vector();
            if session.is_novel(&vector, self.tuning.novelty_distance) {
                session.samples.push(vector);
            }
        }
        status.recording = Some(session.progress());
        if !session.is_complete() {
            return;
        }

        let ControlState::Recording(session) =
            std::mem::replace(&mut self.state, ControlState::Idle)
        else {
            return;
        };
        status.mode = ControlMode::Idle;
        if let Some(progress) = status.recording.as_mut() {
            progress.active = false;
        }
        status.message = Some(match self.commit_session(session) {
            Ok(outcome) => commit_message(&outcome),
            Err(e) => {
                tracing::warn!(error = %e, "Committing recording failed");
                format!("Recording could not be saved: {e}")
            }
        });
    }

    fn commit_session(&mut self, session: RecordingSession) -> Result<CommitOutcome, SessionError> {
        self.state = ControlState::Idle;
        self.commit_samples(session.entry, session.samples)
    }

    /// Append, upsert, purge, persist, retrain; mappings are rebuilt even
    /// when training fails.
    fn commit_samples(
        &mut self,
        entry: GestureEntry,
        samples: Vec<FeatureVector>,
    ) -> Result<CommitOutcome, SessionError> {
        let outcome = self.sync.commit_gesture(entry, samples)?;
        self.engine.rebuild(self.sync.registry().entries());
        if let Some(log) = &self.activity {
            log.record_samples(outcome.added as u64);
            if outcome.training.is_ok() {
                log.record_training();
            }
        }
        if let Err(e) = &outcome.training {
            tracing::warn!(
                label = %outcome.entry.label,
                error = %e,
                "Training after commit failed"
            );
        }
        Ok(outcome)
    }

    fn prepare_capture(
        &mut self,
        request: &RecordingRequest,
    ) -> Result<GestureEntry, SessionError> {
        if matches!(self.state, ControlState::Recording(_)) {
            return Err(SessionError::RecordingActive);
        }
        let entry = self.entry_for(request)?;
        self.stop_monitoring();
        Ok(entry)
    }

    fn capture_count(&self, request: &RecordingRequest) -> usize {
        request
            .target
            .unwrap_or(self.tuning.recording_target)
            .clamp(MIN_RECORDING_TARGET, MAX_RECORDING_TARGET)
    }

    fn entry_for(&self, request: &RecordingRequest) -> Result<GestureEntry, SessionError> {
        let action: GestureAction = request.action.parse()?;
        let entry = GestureEntry::new(
            &request.label,
            action,
            request.emoji.clone().unwrap_or_default(),
            request.threshold.unwrap_or(self.tuning.default_threshold),
        )?;
        Ok(entry)
    }

    fn stop_monitoring(&mut self) {
        if matches!(self.state, ControlState::Monitoring) {
            self.state = ControlState::Idle;
            tracing::info!("Monitoring disabled");
        }
        self.engine.reset();
    }

    /// Rebuild mappings and leave monitoring if the model no longer matches.
    fn after_model_change(&mut self) {
        self.engine.rebuild(self.sync.registry().entries());
        if matches!(self.state, ControlState::Monitoring) && !self.sync.is_synced() {
            tracing::warn!(
                status = %self.sync.sync_status(),
                "Model out of date, monitoring disabled"
            );
            self.state = ControlState::Idle;
        }
    }
}

fn commit_message(outcome: &CommitOutcome) -> String {
    match &outcome.training {
        Ok(report) => format!(
            "Saved {} samples for '{}'. {report}",
            outcome.added, outcome.entry.label
        ),
        Err(e) => format!(
            "Saved {} samples for '{}', but training failed: {e}",
            outcome.added, outcome.entry.label
        ),
    }
}
