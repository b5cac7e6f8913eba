//! Decision layer between per-frame predictions and action dispatch.
//!
//! Each frame's (label, confidence, neighbor distance) passes through
//! unknown-pose rejection, stale-label rejection, a per-gesture adaptive
//! threshold and a consecutive-frame streak before a [`Trigger`] is emitted.

use crate::core::classifier::{Prediction, NONE_LABEL};
use crate::registry::types::{
    clamp_threshold, GestureAction, GestureEntry, MAX_THRESHOLD, MIN_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Weight of the previous dynamic threshold in the moving average.
const DYNAMIC_DECAY: f64 = 0.90;

/// Margin subtracted from the observed confidence before it feeds the average.
const CONFIDENCE_MARGIN: f64 = 0.08;

/// Weight of the static base threshold in the effective threshold.
const BASE_WEIGHT: f64 = 0.70;

/// Decision parameters.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub default_threshold: f64,
    pub required_streak: u32,
    pub rejection_enabled: bool,
    pub rejection_distance: f64,
    pub cooldown: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self::from(&crate::config::TuningConfig::default())
    }
}

impl From<&crate::config::TuningConfig> for DecisionConfig {
    fn from(tuning: &crate::config::TuningConfig) -> Self {
        Self {
            default_threshold: tuning.default_threshold,
            required_streak: tuning.required_streak.max(1),
            rejection_enabled: tuning.rejection_enabled,
            rejection_distance: tuning.rejection_distance,
            cooldown: tuning.action_cooldown,
        }
    }
}

/// What the registry says about one active gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMapping {
    pub action: GestureAction,
    pub emoji: String,
    pub threshold: f64,
}

/// Why a prediction was turned into "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Too far from every training sample
    Unknown,
    /// Label no longer present in the registry
    Stale,
}

/// A request to perform the action bound to a gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub label: String,
    pub action: GestureAction,
    /// Minimum spacing the dispatcher must keep between performed actions
    pub cooldown: Duration,
}

/// Outcome of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub label: String,
    pub confidence: f64,
    pub emoji: String,
    pub rejection: Option<Rejection>,
    pub effective_threshold: Option<f64>,
    pub streak: u32,
    pub trigger: Option<Trigger>,
}

/// Converts noisy per-frame predictions into debounced triggers.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    mappings: HashMap<String, ActiveMapping>,
    dynamic: HashMap<String, f64>,
    last_label: Option<String>,
    streak: u32,
    last_effective_threshold: Option<f64>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            mappings: HashMap::new(),
            dynamic: HashMap::new(),
            last_label: None,
            streak: 0,
            last_effective_threshold: None,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Replace the active mappings with the registry's current entries.
    ///
    /// Smoothing state is reset since thresholds may have changed.
    pub fn rebuild(&mut self, entries: &[GestureEntry]) {
        self.mappings = entries
            .iter()
            .map(|e| {
                (
                    e.label.clone(),
                    ActiveMapping {
                        action: e.action,
                        emoji: e.emoji.clone(),
                        threshold: clamp_threshold(e.threshold),
                    },
                )
            })
            .collect();
        self.reset();
    }

    pub fn mapping(&self, label: &str) -> Option<&ActiveMapping> {
        self.mappings.get(label)
    }

    /// Clear streak and adaptive threshold state.
    pub fn reset(&mut self) {
        self.dynamic.clear();
        self.last_label = None;
        self.streak = 0;
        self.last_effective_threshold = None;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_effective_threshold(&self) -> Option<f64> {
        self.last_effective_threshold
    }

    pub fn dynamic_threshold(&self, label: &str) -> Option<f64> {
        self.dynamic.get(label).copied()
    }

    /// Feed a frame with no detected hand.
    pub fn observe_no_hand(&mut self) -> Decision {
        self.last_label = None;
        self.streak = 0;
        Decision {
            label: NONE_LABEL.to_string(),
            confidence: 0.0,
            emoji: String::new(),
            rejection: None,
            effective_threshold: None,
            streak: 0,
            trigger: None,
        }
    }

    /// Feed one frame's prediction.
    ///
    /// `class_count` is the number of classes the model knows; rejection of
    /// unknown poses only applies when there is more than one.
    pub fn process(&mut self, prediction: &Prediction, class_count: usize) -> Decision {
        let mut label = prediction.label.clone();
        let mut confidence = prediction.confidence;
        let mut rejection = None;

        if self.config.rejection_enabled && class_count > 1 {
            if let Some(distance) = prediction.neighbor_distance {
                if distance > self.config.rejection_distance {
                    label = NONE_LABEL.to_string();
                    confidence = 0.0;
                    rejection = Some(Rejection::Unknown);
                }
            }
        }

        let mapping = self.mappings.get(&label).cloned();
        if rejection.is_none() && mapping.is_none() {
            if label != NONE_LABEL {
                rejection = Some(Rejection::Stale);
            }
            label = NONE_LABEL.to_string();
            confidence = 0.0;
        }

        let Some(mapping) = mapping.filter(|_| rejection.is_none()) else {
            self.last_label = Some(label.clone());
            self.streak = 0;
            self.last_effective_threshold = None;
            return Decision {
                label,
                confidence,
                emoji: String::new(),
                rejection,
                effective_threshold: None,
                streak: 0,
                trigger: None,
            };
        };

        let effective = self.update_threshold(&label, mapping.threshold, confidence);
        let cleared = confidence >= effective;

        self.streak = match (&self.last_label, cleared) {
            (Some(last), true) if *last == label => self.streak + 1,
            (_, true) => 1,
            (_, false) => 0,
        };
        self.last_label = Some(label.clone());
        self.last_effective_threshold = Some(effective);

        let trigger = (self.streak >= self.config.required_streak).then(|| Trigger {
            label: label.clone(),
            action: mapping.action,
            cooldown: self.config.cooldown,
        });

        tracing::debug!(
            label = %label,
            confidence,
            effective_threshold = effective,
            streak = self.streak,
            triggered = trigger.is_some(),
            "Gesture decision"
        );

        Decision {
            label,
            confidence,
            emoji: mapping.emoji,
            rejection: None,
            effective_threshold: Some(effective),
            streak: self.streak,
            trigger,
        }
    }

    /// Update the label's dynamic threshold and return the effective one.
    fn update_threshold(&mut self, label: &str, base: f64, confidence: f64) -> f64 {
        let observed = (confidence - CONFIDENCE_MARGIN).clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        let dynamic = self.dynamic.entry(label.to_string()).or_insert(base);
        *dynamic = DYNAMIC_DECAY * *dynamic + (1.0 - DYNAMIC_DECAY) * observed;
        (BASE_WEIGHT * base + (1.0 - BASE_WEIGHT) * *dynamic).clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(required_streak: u32) -> DecisionEngine {
        let mut engine = DecisionEngine::new(DecisionConfig {
            required_streak,
            ..DecisionConfig::default()
        });
        engine.rebuild(&[
            GestureEntry::new("open_palm", GestureAction::PlayPause, "✋", 0.82).unwrap(),
            GestureEntry::new("fist", GestureAction::Mute, "✊", 0.82).unwrap(),
        ]);
        engine
    }

    fn prediction(label: &str, confidence: f64, distance: f64) -> Prediction {
        Prediction {
            label: label.to_string(),
            confidence,
            neighbor_distance: Some(distance),
        }
    }

    #[test]
    fn test_streak_increases_and_triggers_at_required() {
        let mut engine = engine(3);
        let p = prediction("open_palm", 1.0, 0.05);

        let d1 = engine.process(&p, 2);
        let d2 = engine.process(&p, 2);
        let d3 = engine.process(&p, 2);
        assert_eq!((d1.streak, d2.streak, d3.streak), (1, 2, 3));
        assert!(d1.trigger.is_none());
        assert!(d2.trigger.is_none());

        let trigger = d3.trigger.expect("third frame should trigger");
        assert_eq!(trigger.action, GestureAction::PlayPause);
        assert_eq!(trigger.cooldown, Duration::from_millis(1500));
        assert_eq!(d3.emoji, "✋");
    }

    #[test]
    fn test_label_change_restarts_streak() {
        let mut engine = engine(2);
        engine.process(&prediction("open_palm", 1.0, 0.05), 2);
        let d = engine.process(&prediction("fist", 1.0, 0.05), 2);
        assert_eq!(d.streak, 1);
        assert!(d.trigger.is_none());
    }

    #[test]
    fn test_below_threshold_resets_streak() {
        let mut engine = engine(2);
        engine.process(&prediction("open_palm", 1.0, 0.05), 2);
        let d = engine.process(&prediction("open_palm", 0.6, 0.05), 2);
        assert_eq!(d.streak, 0);
        assert_eq!(d.label, "open_palm");
    }

    #[test]
    fn test_unknown_rejection() {
        let mut engine = engine(1);
        let d = engine.process(&prediction("open_palm", 1.0, 0.9), 2);
        assert_eq!(d.label, NONE_LABEL);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.rejection, Some(Rejection::Unknown));
        assert!(d.trigger.is_none());
    }

    #[test]
    fn test_unknown_rejection_needs_two_classes() {
        let mut engine = engine(1);
        let d = engine.process(&prediction("open_palm", 1.0, 0.9), 1);
        assert_eq!(d.label, "open_palm");
        assert!(d.trigger.is_some());
    }

    #[test]
    fn test_stale_label_rejection() {
        let mut engine = engine(1);
        let d = engine.process(&prediction("peace", 1.0, 0.05), 3);
        assert_eq!(d.label, NONE_LABEL);
        assert_eq!(d.rejection, Some(Rejection::Stale));
    }

    #[test]
    fn test_adaptive_threshold_blend() {
        let mut engine = engine(2);
        engine.process(&prediction("open_palm", 1.0, 0.05), 2);

        // dynamic = 0.9 * 0.82 + 0.1 * 0.92 = 0.83
        let dynamic = engine.dynamic_threshold("open_palm").unwrap();
        assert!((dynamic - 0.83).abs() < 1e-9);
        // effective = 0.7 * 0.82 + 0.3 * 0.83 = 0.823
        let effective = engine.last_effective_threshold().unwrap();
        assert!((effective - 0.823).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_bounds_hold() {
        let mut engine = engine(2);
        for _ in 0..200 {
            engine.process(&prediction("fist", 0.0, 0.05), 2);
        }
        let effective = engine.last_effective_threshold().unwrap();
        assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&effective));
    }

    #[test]
    fn test_reset_and_no_hand() {
        let mut engine = engine(2);
        engine.process(&prediction("fist", 1.0, 0.05), 2);
        assert_eq!(engine.streak(), 1);

        engine.observe_no_hand();
        assert_eq!(engine.streak(), 0);

        engine.process(&prediction("fist", 1.0, 0.05), 2);
        engine.reset();
        assert_eq!(engine.streak(), 0);
        assert!(engine.dynamic_threshold("fist").is_none());
    }
}
